//! Wallet ledger
//!
//! Owns the wallet's transactions and derives everything else from them:
//! the UTXO set, the balance and its history, and the invalid and pending
//! classifications. Derived state is never patched in place; every insert,
//! removal or height change rebuilds it with one pass over the
//! transactions in insertion order.
//!
//! All state sits behind a single lock. Listener callbacks run only after
//! the lock has been released.

use super::address::AddressSource;
use super::error::WalletError;
use super::listener::{ListenerRef, WalletListener};
use crate::config::{CoinConfig, SubWalletType};
use crate::core::fee::{fee_for_size, MIN_FEE_PER_KB};
use crate::core::{
    OutPoint, Transaction, TxHash, TxInput, TxOutput, MAX_FEE_PER_KB,
    TX_MAX_SIZE, TX_MIN_OUTPUT_AMOUNT, TX_UNCONFIRMED,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unspent output owned by the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Utxo {
    pub hash: TxHash,
    pub index: u32,
    pub amount: u64,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.hash, self.index)
    }
}

pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Whether an unconfirmed transaction is held back, along with anything spending it
fn is_pending(tx: &Transaction, pending: &HashSet<TxHash>, block_height: u32, now: u64) -> bool {
    tx.size() > TX_MAX_SIZE
        || tx.has_dust_output(TX_MIN_OUTPUT_AMOUNT)
        || tx.signals_rbf()
        || tx.lock_time_in_future(block_height, now)
        || tx.inputs.iter().any(|i| pending.contains(&i.prev_hash))
}

// =============================================================================
// Wallet State
// =============================================================================

pub(super) struct WalletState {
    /// Insertion order
    pub(super) tx_order: Vec<TxHash>,
    pub(super) transactions: HashMap<TxHash, Transaction>,
    /// Running balance after each transaction, parallel to `tx_order`
    pub(super) balance_hist: Vec<u64>,
    pub(super) utxos: Vec<Utxo>,
    pub(super) spent: HashSet<OutPoint>,
    pub(super) invalid: HashSet<TxHash>,
    pub(super) pending: HashSet<TxHash>,
    pub(super) used_addrs: HashSet<String>,
    pub(super) listening_addrs: HashSet<String>,
    pub(super) address_source: Box<dyn AddressSource>,
    pub(super) remarks: HashMap<TxHash, String>,
    pub(super) balance: u64,
    pub(super) total_sent: u64,
    pub(super) total_received: u64,
    pub(super) fee_per_kb: u64,
    pub(super) block_height: u32,
    pub(super) gap_limit_external: u32,
    pub(super) gap_limit_internal: u32,
}

impl WalletState {
    fn is_tracked(&self, address: &str) -> bool {
        self.address_source.contains_address(address)
    }

    fn output_of(&self, input: &TxInput) -> Option<&TxOutput> {
        self.transactions
            .get(&input.prev_hash)?
            .outputs
            .get(input.index as usize)
    }

    /// Rebuild all derived state from the transaction list
    pub(super) fn recompute(&mut self, now: u64) {
        self.utxos.clear();
        self.spent.clear();
        self.invalid.clear();
        self.pending.clear();
        self.used_addrs.clear();
        self.balance_hist.clear();
        self.total_sent = 0;
        self.total_received = 0;

        let mut balance = 0u64;
        let mut prev_balance = 0u64;

        for hash in &self.tx_order {
            let tx = match self.transactions.get(hash) {
                Some(tx) => tx,
                None => {
                    log::error!("Transaction {} missing from ledger, skipped", hash);
                    self.balance_hist.push(balance);
                    continue;
                }
            };

            for output in &tx.outputs {
                if self.address_source.contains_address(&output.address) {
                    self.used_addrs.insert(output.address.clone());
                }
            }
            for input in &tx.inputs {
                if !input.address.is_empty() && self.address_source.contains_address(&input.address) {
                    self.used_addrs.insert(input.address.clone());
                }
            }

            // Conflicts with an earlier spend or descends from an invalid tx
            if !tx.is_confirmed()
                && tx.inputs.iter().any(|i| {
                    self.invalid.contains(&i.prev_hash) || self.spent.contains(&i.outpoint())
                })
            {
                self.invalid.insert(*hash);
                self.balance_hist.push(balance);
                continue;
            }

            for input in &tx.inputs {
                self.spent.insert(input.outpoint());
            }

            // Unconfirmed transactions consume their inputs but add no outputs
            if tx.is_confirmed() {
                for (index, output) in tx.outputs.iter().enumerate() {
                    if self.address_source.contains_address(&output.address) {
                        self.utxos.push(Utxo {
                            hash: *hash,
                            index: index as u32,
                            amount: output.amount,
                        });
                        balance = balance.saturating_add(output.amount);
                    }
                }
            } else if is_pending(tx, &self.pending, self.block_height, now) {
                self.pending.insert(*hash);
            }

            // Arrival order is not guaranteed, so sweep the whole UTXO set
            let spent = &self.spent;
            self.utxos.retain(|utxo| {
                if spent.contains(&utxo.outpoint()) {
                    balance = balance.saturating_sub(utxo.amount);
                    false
                } else {
                    true
                }
            });

            if balance > prev_balance {
                self.total_received += balance - prev_balance;
            }
            if balance < prev_balance {
                self.total_sent += prev_balance - balance;
            }
            self.balance_hist.push(balance);
            prev_balance = balance;
        }

        self.balance = balance;
    }

    /// Keep a gap limit of unused addresses on both chains
    ///
    /// Returns true when new addresses were generated.
    pub(super) fn advance_chains(&mut self) -> bool {
        let before = self.address_source.all_addresses().len();
        self.address_source
            .unused_addresses(self.gap_limit_external, false, &self.used_addrs);
        self.address_source
            .unused_addresses(self.gap_limit_internal, true, &self.used_addrs);
        self.address_source.all_addresses().len() != before
    }

    /// Recompute, growing the address chains until they cover every use
    fn refresh(&mut self, now: u64) {
        self.recompute(now);
        while self.advance_chains() {
            self.recompute(now);
        }
    }

    fn insert(&mut self, tx: Transaction) -> bool {
        if !tx.is_signed() {
            return false;
        }
        let hash = tx.hash();
        if self.transactions.contains_key(&hash) {
            return false;
        }
        self.tx_order.push(hash);
        self.transactions.insert(hash, tx);
        true
    }

    fn contains_transaction(&self, tx: &Transaction) -> bool {
        let watched = |address: &str| self.is_tracked(address) || self.listening_addrs.contains(address);

        tx.outputs.iter().any(|o| watched(&o.address))
            || tx
                .inputs
                .iter()
                .any(|i| self.output_of(i).map_or(false, |o| watched(&o.address)))
    }

    fn is_valid(&self, tx: &Transaction) -> bool {
        if tx.is_confirmed() {
            return true;
        }

        if self.transactions.contains_key(&tx.hash()) {
            if self.invalid.contains(&tx.hash()) {
                return false;
            }
        } else if tx.inputs.iter().any(|i| self.spent.contains(&i.outpoint())) {
            return false;
        }

        tx.inputs.iter().all(|input| {
            self.transactions
                .get(&input.prev_hash)
                .map_or(true, |parent| self.is_valid(parent))
        })
    }

    fn amount_sent_by(&self, tx: &Transaction) -> u64 {
        tx.inputs
            .iter()
            .filter_map(|i| self.output_of(i))
            .filter(|o| self.is_tracked(&o.address))
            .map(|o| o.amount)
            .sum()
    }

    fn amount_received_from(&self, tx: &Transaction) -> u64 {
        tx.outputs
            .iter()
            .filter(|o| self.is_tracked(&o.address))
            .map(|o| o.amount)
            .sum()
    }
}

// =============================================================================
// Wallet
// =============================================================================

enum Notice {
    Balance(u64),
    Added(Transaction),
    Updated(TxHash, u32, u32),
    Deleted(TxHash, bool, bool),
}

/// SPV wallet ledger shared between network and application threads
pub struct Wallet {
    chain_id: String,
    kind: SubWalletType,
    state: Mutex<WalletState>,
    listener: Mutex<ListenerRef>,
}

impl Wallet {
    /// Create a wallet over `address_source`, loading previously stored transactions
    pub fn new(
        config: &CoinConfig,
        address_source: Box<dyn AddressSource>,
        transactions: Vec<Transaction>,
    ) -> Result<Self, WalletError> {
        config
            .validate()
            .map_err(|e| WalletError::InvalidArgument(e.to_string()))?;

        let mut state = WalletState {
            tx_order: Vec::new(),
            transactions: HashMap::new(),
            balance_hist: Vec::new(),
            utxos: Vec::new(),
            spent: HashSet::new(),
            invalid: HashSet::new(),
            pending: HashSet::new(),
            used_addrs: HashSet::new(),
            listening_addrs: HashSet::new(),
            address_source,
            remarks: HashMap::new(),
            balance: 0,
            total_sent: 0,
            total_received: 0,
            fee_per_kb: config.min_fee,
            block_height: 0,
            gap_limit_external: config.gap_limit_external,
            gap_limit_internal: config.gap_limit_internal,
        };

        for tx in transactions {
            if tx.is_confirmed() && tx.block_height > state.block_height {
                state.block_height = tx.block_height;
            }
            let hash = tx.hash();
            if !state.insert(tx) {
                log::warn!("Skipping unsigned or duplicate stored transaction {}", hash);
            }
        }

        state.advance_chains();
        state.refresh(unix_now());

        log::info!(
            "{} wallet loaded: {} transactions, balance {}",
            config.chain_id,
            state.tx_order.len(),
            state.balance
        );

        Ok(Self {
            chain_id: config.chain_id.clone(),
            kind: config.kind,
            state: Mutex::new(state),
            listener: Mutex::new(ListenerRef::none()),
        })
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, WalletState> {
        // Derived state is rebuilt wholesale, so a panicked holder leaves nothing half-applied
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_listener(&self, listener: &Arc<dyn WalletListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = ListenerRef::new(listener);
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for notice in notices {
            match notice {
                Notice::Balance(balance) => listener.balance_changed(balance),
                Notice::Added(tx) => listener.tx_added(&tx),
                Notice::Updated(hash, height, timestamp) => listener.tx_updated(&hash, height, timestamp),
                Notice::Deleted(hash, notify_user, recommend_rescan) => {
                    listener.tx_deleted(&hash, notify_user, recommend_rescan)
                }
            }
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Which chain this wallet belongs to
    pub fn kind(&self) -> SubWalletType {
        self.kind
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a signed transaction the wallet does not hold yet
    pub fn insert_transaction(&self, tx: Transaction) -> bool {
        let balance = {
            let mut state = self.lock();
            if !state.insert(tx.clone()) {
                return false;
            }
            state.refresh(unix_now());
            state.balance
        };

        self.dispatch(vec![Notice::Balance(balance), Notice::Added(tx)]);
        true
    }

    /// Ingest a transaction from the network
    ///
    /// Returns false for unsigned transactions and ones that do not touch
    /// the wallet. A transaction already held counts as registered.
    pub fn register_transaction(&self, tx: Transaction) -> bool {
        if !tx.is_signed() {
            return false;
        }

        let balance = {
            let mut state = self.lock();
            if state.transactions.contains_key(&tx.hash()) {
                return true;
            }
            if !state.contains_transaction(&tx) {
                return false;
            }
            state.insert(tx.clone());
            state.refresh(unix_now());
            state.balance
        };

        log::debug!("Registered transaction {}", tx.hash());
        self.dispatch(vec![Notice::Balance(balance), Notice::Added(tx)]);
        true
    }

    /// Remove a transaction and every transaction that spends from it
    pub fn remove_transaction(&self, hash: &TxHash) {
        let notices = {
            let mut state = self.lock();
            if !state.transactions.contains_key(hash) {
                return;
            }

            let mut doomed = vec![*hash];
            let mut doomed_set: HashSet<TxHash> = doomed.iter().copied().collect();
            let mut i = 0;
            while i < doomed.len() {
                let parent = doomed[i];
                for child in &state.tx_order {
                    if doomed_set.contains(child) {
                        continue;
                    }
                    let spends_parent = state
                        .transactions
                        .get(child)
                        .map_or(false, |t| t.inputs.iter().any(|input| input.prev_hash == parent));
                    if spends_parent {
                        doomed.push(*child);
                        doomed_set.insert(*child);
                    }
                }
                i += 1;
            }

            // Descendants go first
            let removed: Vec<Transaction> = doomed
                .iter()
                .rev()
                .filter_map(|h| state.transactions.remove(h))
                .collect();
            state.tx_order.retain(|h| !doomed_set.contains(h));
            state.refresh(unix_now());

            let mut notices = vec![Notice::Balance(state.balance)];
            for tx in &removed {
                let notify_user = state.amount_sent_by(tx) > 0 && state.is_valid(tx);
                // Only worth a rescan when every spent parent is confirmed
                let recommend_rescan = notify_user
                    && tx.inputs.iter().all(|input| {
                        state
                            .transactions
                            .get(&input.prev_hash)
                            .map_or(false, |parent| parent.is_confirmed())
                    });
                log::info!("Removed transaction {}", tx.hash());
                notices.push(Notice::Deleted(tx.hash(), notify_user, recommend_rescan));
            }
            notices
        };

        self.dispatch(notices);
    }

    /// Set height and timestamp of the given transactions
    ///
    /// A confirmed height above the wallet's own raises the wallet height.
    pub fn update_transactions(&self, hashes: &[TxHash], block_height: u32, timestamp: u32) {
        let notices = {
            let mut state = self.lock();
            let mut height_changed = false;
            if block_height != TX_UNCONFIRMED && block_height > state.block_height {
                state.block_height = block_height;
                height_changed = true;
            }

            let mut updated = Vec::new();
            for hash in hashes {
                if let Some(tx) = state.transactions.get_mut(hash) {
                    if tx.block_height == block_height && tx.timestamp == timestamp {
                        continue;
                    }
                    tx.block_height = block_height;
                    tx.timestamp = timestamp;
                    updated.push(*hash);
                }
            }

            if updated.is_empty() && !height_changed {
                return;
            }

            let before = state.balance;
            state.refresh(unix_now());

            let mut notices: Vec<Notice> = updated
                .into_iter()
                .map(|hash| Notice::Updated(hash, block_height, timestamp))
                .collect();
            if state.balance != before {
                notices.push(Notice::Balance(state.balance));
            }
            notices
        };

        self.dispatch(notices);
    }

    /// Mark every transaction above `block_height` unconfirmed (chain reorg)
    pub fn set_tx_unconfirmed_after(&self, block_height: u32) {
        let notices = {
            let mut state = self.lock();
            state.block_height = block_height;

            let mut updated = Vec::new();
            for (hash, tx) in state.transactions.iter_mut() {
                if tx.is_confirmed() && tx.block_height > block_height {
                    tx.block_height = TX_UNCONFIRMED;
                    tx.timestamp = 0;
                    updated.push(*hash);
                }
            }

            state.refresh(unix_now());

            let mut notices: Vec<Notice> = updated
                .into_iter()
                .map(|hash| Notice::Updated(hash, TX_UNCONFIRMED, 0))
                .collect();
            notices.push(Notice::Balance(state.balance));
            notices
        };

        self.dispatch(notices);
    }

    /// Move the wallet to a new chain height
    pub fn set_block_height(&self, block_height: u32) {
        let balance = {
            let mut state = self.lock();
            if state.block_height == block_height {
                return;
            }
            let before = state.balance;
            state.block_height = block_height;
            state.refresh(unix_now());
            if state.balance == before {
                return;
            }
            state.balance
        };

        self.dispatch(vec![Notice::Balance(balance)]);
    }

    /// Rebuild derived state without any change to the transaction set
    pub fn recompute(&self) {
        self.lock().recompute(unix_now());
    }

    pub fn set_listening_addresses(&self, addresses: &[String]) {
        self.lock().listening_addrs = addresses.iter().cloned().collect();
    }

    pub fn set_fee_per_kb(&self, fee_per_kb: u64) -> Result<(), WalletError> {
        if fee_per_kb > MAX_FEE_PER_KB {
            return Err(WalletError::InvalidArgument(format!(
                "fee per kB {} exceeds {}",
                fee_per_kb, MAX_FEE_PER_KB
            )));
        }
        self.lock().fee_per_kb = fee_per_kb;
        Ok(())
    }

    pub fn register_remark(&self, hash: &TxHash, remark: &str) {
        self.lock().remarks.insert(*hash, remark.to_string());
    }

    /// First `gap_limit` unused addresses of a chain, generating as needed
    pub fn unused_addresses(&self, gap_limit: u32, internal: bool) -> Vec<String> {
        let mut state = self.lock();
        let state = &mut *state;
        state
            .address_source
            .unused_addresses(gap_limit, internal, &state.used_addrs)
    }

    /// Next address to hand out for receiving funds
    pub fn receive_address(&self) -> Option<String> {
        self.unused_addresses(1, false).into_iter().next()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn balance(&self) -> u64 {
        self.lock().balance
    }

    /// Wallet balance right after `hash` was applied
    pub fn balance_after_tx(&self, hash: &TxHash) -> u64 {
        let state = self.lock();
        state
            .tx_order
            .iter()
            .rposition(|h| h == hash)
            .and_then(|i| state.balance_hist.get(i).copied())
            .unwrap_or(state.balance)
    }

    pub fn balance_history(&self) -> Vec<u64> {
        self.lock().balance_hist.clone()
    }

    pub fn total_sent(&self) -> u64 {
        self.lock().total_sent
    }

    pub fn total_received(&self) -> u64 {
        self.lock().total_received
    }

    pub fn fee_per_kb(&self) -> u64 {
        self.lock().fee_per_kb
    }

    /// Smallest output worth creating at the current fee rate
    pub fn min_output_amount(&self) -> u64 {
        let fee_per_kb = self.fee_per_kb();
        let amount = (TX_MIN_OUTPUT_AMOUNT * fee_per_kb + MIN_FEE_PER_KB - 1) / MIN_FEE_PER_KB;
        amount.max(TX_MIN_OUTPUT_AMOUNT)
    }

    pub fn block_height(&self) -> u32 {
        self.lock().block_height
    }

    pub fn utxos(&self) -> Vec<Utxo> {
        self.lock().utxos.clone()
    }

    pub fn all_addresses(&self) -> Vec<String> {
        self.lock().address_source.all_addresses()
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.lock().is_tracked(address)
    }

    pub fn address_is_used(&self, address: &str) -> bool {
        self.lock().used_addrs.contains(address)
    }

    pub fn is_single_address(&self) -> bool {
        self.lock().address_source.is_single_address()
    }

    /// Whether the transaction pays to or spends from the wallet
    pub fn contains_transaction(&self, tx: &Transaction) -> bool {
        self.lock().contains_transaction(tx)
    }

    /// All transactions in insertion order
    pub fn transactions(&self) -> Vec<Transaction> {
        let state = self.lock();
        state
            .tx_order
            .iter()
            .filter_map(|h| state.transactions.get(h).cloned())
            .collect()
    }

    /// Transactions confirmed in a block below `block_height`
    pub fn transactions_confirmed_before(&self, block_height: u32) -> Vec<Transaction> {
        let state = self.lock();
        state
            .tx_order
            .iter()
            .filter_map(|h| state.transactions.get(h))
            .filter(|tx| tx.is_confirmed() && tx.block_height < block_height)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().tx_order.len()
    }

    pub fn has_transaction(&self, hash: &TxHash) -> bool {
        self.lock().transactions.contains_key(hash)
    }

    pub fn transaction_for_hash(&self, hash: &TxHash) -> Option<Transaction> {
        self.lock().transactions.get(hash).cloned()
    }

    /// False if the transaction, or any unconfirmed ancestor, conflicts
    pub fn transaction_is_valid(&self, tx: &Transaction) -> bool {
        self.lock().is_valid(tx)
    }

    pub fn transaction_is_pending(&self, tx: &Transaction) -> bool {
        let state = self.lock();
        if tx.is_confirmed() {
            return false;
        }
        if state.transactions.contains_key(&tx.hash()) {
            return state.pending.contains(&tx.hash());
        }
        is_pending(tx, &state.pending, state.block_height, unix_now())
    }

    pub fn amount_sent_by_tx(&self, tx: &Transaction) -> u64 {
        self.lock().amount_sent_by(tx)
    }

    pub fn amount_received_from_tx(&self, tx: &Transaction) -> u64 {
        self.lock().amount_received_from(tx)
    }

    /// Fee paid by `tx`, or `None` if some input is not in the wallet
    pub fn fee_for_tx(&self, tx: &Transaction) -> Option<u64> {
        let state = self.lock();
        let mut inputs = 0u64;
        for input in &tx.inputs {
            inputs = inputs.checked_add(state.output_of(input)?.amount)?;
        }
        inputs.checked_sub(tx.total_output())
    }

    /// Largest amount a single payment could send after fees
    pub fn max_output_amount(&self) -> u64 {
        let state = self.lock();
        let mut tx = Transaction::default();
        let mut amount = 0u64;
        for utxo in &state.utxos {
            tx.inputs.push(TxInput::new(utxo.hash, utxo.index));
            amount += utxo.amount;
        }

        let address = state
            .address_source
            .all_addresses()
            .into_iter()
            .next()
            .unwrap_or_default();
        let asset_id = Default::default();
        tx.outputs.push(TxOutput::new(&address, 0, asset_id));
        tx.outputs.push(TxOutput::new(&address, 0, asset_id));

        amount.saturating_sub(fee_for_size(tx.size(), state.fee_per_kb))
    }

    /// Sum of UTXOs paid to `address`
    pub fn balance_with_address(&self, address: &str) -> u64 {
        self.balance_info().get(address).copied().unwrap_or(0)
    }

    /// Spendable balance per address
    pub fn balance_info(&self) -> BTreeMap<String, u64> {
        let state = self.lock();
        let mut info = BTreeMap::new();
        for utxo in &state.utxos {
            let output = state
                .transactions
                .get(&utxo.hash)
                .and_then(|tx| tx.outputs.get(utxo.index as usize));
            match output {
                Some(output) => *info.entry(output.address.clone()).or_insert(0) += utxo.amount,
                None => log::error!("UTXO {} has no output", utxo.outpoint()),
            }
        }
        info
    }

    pub fn remark(&self, hash: &TxHash) -> Option<String> {
        self.lock().remarks.get(hash).cloned()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{AttributeUsage, Program, TransactionBuilder, OP_CHECKSIG, SEQUENCE_RBF_MAX};
    use crate::crypto::KeyPair;
    use crate::wallet::address::SingleAddress;
    use crate::wallet::listener::{Event, RecordingListener};
    use secp256k1::SecretKey;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    static NONCE: AtomicU64 = AtomicU64::new(0);

    /// Deterministic address for key `n`
    pub fn address_of(n: u8) -> String {
        let secret = SecretKey::from_slice(&[n; 32]).unwrap();
        KeyPair::from_secret_key(secret).address()
    }

    pub fn my_address() -> String {
        address_of(1)
    }

    pub fn other_address() -> String {
        address_of(2)
    }

    pub fn sign(mut tx: Transaction) -> Transaction {
        tx.programs.push(Program {
            code: vec![0x21, OP_CHECKSIG],
            parameter: vec![0x40; 65],
        });
        tx
    }

    fn with_nonce(mut tx: Transaction) -> Transaction {
        let nonce = NONCE.fetch_add(1, Ordering::SeqCst);
        tx.add_attribute(AttributeUsage::Nonce, nonce.to_le_bytes().to_vec());
        tx
    }

    /// Signed transaction paying `amounts` to the wallet
    pub fn funding_tx(amounts: &[u64], height: u32) -> Transaction {
        let mut builder = TransactionBuilder::new();
        for amount in amounts {
            builder = builder.add_output(&my_address(), *amount);
        }
        if height != TX_UNCONFIRMED {
            builder = builder.confirmed_at(height, 1_000 + height);
        }
        sign(with_nonce(builder.build()))
    }

    /// Signed transaction spending `inputs`, paying `outputs`
    pub fn spend_tx(inputs: &[(TxHash, u32)], outputs: &[(&str, u64)], height: u32) -> Transaction {
        let mut builder = TransactionBuilder::new();
        for (hash, index) in inputs {
            builder = builder.add_input(*hash, *index);
        }
        for (address, amount) in outputs {
            builder = builder.add_output(address, *amount);
        }
        if height != TX_UNCONFIRMED {
            builder = builder.confirmed_at(height, 1_000 + height);
        }
        sign(with_nonce(builder.build()))
    }

    pub fn test_config(fee_per_kb: u64) -> CoinConfig {
        let mut config = CoinConfig::new("ELA", SubWalletType::Mainchain);
        config.single_address = true;
        config.min_fee = fee_per_kb;
        config
    }

    pub fn test_wallet() -> Wallet {
        Wallet::new(
            &test_config(1),
            Box::new(SingleAddress::new(my_address())),
            Vec::new(),
        )
        .unwrap()
    }

    fn assert_consistent(wallet: &Wallet) {
        let state = wallet.lock();
        assert_eq!(state.balance_hist.len(), state.tx_order.len());
        assert_eq!(state.utxos.iter().map(|u| u.amount).sum::<u64>(), state.balance);
        assert!(state.utxos.iter().all(|u| !state.spent.contains(&u.outpoint())));
    }

    #[test]
    fn test_confirmed_funds_count() {
        let wallet = test_wallet();
        let tx = funding_tx(&[1_000, 2_000], 5);
        assert!(wallet.insert_transaction(tx.clone()));

        assert_eq!(wallet.balance(), 3_000);
        assert_eq!(wallet.utxos().len(), 2);
        assert_eq!(wallet.total_received(), 3_000);
        assert_eq!(wallet.balance_after_tx(&tx.hash()), 3_000);
        assert!(wallet.address_is_used(&my_address()));
        assert_consistent(&wallet);
    }

    #[test]
    fn test_unsigned_and_duplicate_rejected() {
        let wallet = test_wallet();
        let tx = funding_tx(&[1_000], 5);
        let mut unsigned = tx.clone();
        unsigned.programs.clear();

        assert!(!wallet.insert_transaction(unsigned));
        assert!(wallet.insert_transaction(tx.clone()));
        assert!(!wallet.insert_transaction(tx));
        assert_eq!(wallet.transaction_count(), 1);
    }

    #[test]
    fn test_spend_removes_utxo_regardless_of_order() {
        let funding = funding_tx(&[5_000], 5);
        let spend = spend_tx(
            &[(funding.hash(), 0)],
            &[(&other_address(), 3_000), (&my_address(), 1_900)],
            6,
        );

        // Child before parent
        let wallet = test_wallet();
        wallet.insert_transaction(spend.clone());
        wallet.insert_transaction(funding.clone());

        assert_eq!(wallet.balance(), 1_900);
        assert_eq!(wallet.balance_history(), vec![1_900, 1_900]);
        assert_eq!(wallet.total_sent(), 0);
        assert_consistent(&wallet);

        // Parent before child
        let wallet = test_wallet();
        wallet.insert_transaction(funding);
        wallet.insert_transaction(spend.clone());

        assert_eq!(wallet.balance(), 1_900);
        assert_eq!(wallet.balance_history(), vec![5_000, 1_900]);
        assert_eq!(wallet.total_sent(), 3_100);
        assert_eq!(wallet.amount_sent_by_tx(&spend), 5_000);
        assert_eq!(wallet.amount_received_from_tx(&spend), 1_900);
        assert_eq!(wallet.fee_for_tx(&spend), Some(100));
        assert_consistent(&wallet);
    }

    #[test]
    fn test_unconfirmed_double_spend_is_invalid() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000], 5);
        let first = spend_tx(&[(funding.hash(), 0)], &[(&my_address(), 4_000)], TX_UNCONFIRMED);
        let second = spend_tx(&[(funding.hash(), 0)], &[(&my_address(), 4_500)], TX_UNCONFIRMED);
        let grandchild = spend_tx(&[(second.hash(), 0)], &[(&my_address(), 4_400)], TX_UNCONFIRMED);

        wallet.insert_transaction(funding);
        wallet.insert_transaction(first.clone());
        wallet.insert_transaction(second.clone());
        wallet.insert_transaction(grandchild.clone());

        assert!(wallet.transaction_is_valid(&first));
        assert!(!wallet.transaction_is_valid(&second));
        assert!(!wallet.transaction_is_valid(&grandchild));
        // The valid spend consumes the funding output before it confirms
        assert_eq!(wallet.balance(), 0);
        assert_consistent(&wallet);

        wallet.update_transactions(&[first.hash()], 6, 1_006);
        assert!(!wallet.transaction_is_valid(&second));
        assert_eq!(wallet.balance(), 4_000);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_pending_outputs_excluded() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000], 5);
        wallet.insert_transaction(funding.clone());

        let mut rbf = TransactionBuilder::new()
            .with_rbf()
            .add_input(funding.hash(), 0)
            .add_output(&my_address(), 4_000)
            .build();
        rbf = sign(rbf);
        wallet.insert_transaction(rbf.clone());

        assert!(wallet.transaction_is_pending(&rbf));
        assert_eq!(wallet.balance(), 0);

        let child = spend_tx(&[(rbf.hash(), 0)], &[(&my_address(), 3_900)], TX_UNCONFIRMED);
        wallet.insert_transaction(child.clone());
        assert!(wallet.transaction_is_pending(&child));

        let dust = spend_tx(&[], &[(&my_address(), TX_MIN_OUTPUT_AMOUNT - 1)], TX_UNCONFIRMED);
        assert!(wallet.transaction_is_pending(&dust));
        assert_consistent(&wallet);
    }

    #[test]
    fn test_unconfirmed_outputs_wait_for_confirmation() {
        let wallet = test_wallet();
        let tx = funding_tx(&[5_000], TX_UNCONFIRMED);
        wallet.insert_transaction(tx.clone());

        assert!(wallet.transaction_is_valid(&tx));
        assert!(!wallet.transaction_is_pending(&tx));
        assert_eq!(wallet.balance(), 0);
        assert!(wallet.utxos().is_empty());
        assert_eq!(wallet.total_received(), 0);
        assert_eq!(wallet.balance_history(), vec![0]);

        wallet.update_transactions(&[tx.hash()], 3, 1_003);
        assert_eq!(wallet.balance(), 5_000);
        assert_eq!(wallet.utxos().len(), 1);
        assert_eq!(wallet.total_received(), 5_000);
        assert_eq!(wallet.balance_history(), vec![5_000]);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_future_lock_time_is_pending_until_height_reached() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000], 5);
        wallet.insert_transaction(funding.clone());
        wallet.set_block_height(5);

        // Non-final sequence enables the lock without signalling replace-by-fee
        let locked = sign(
            TransactionBuilder::new()
                .add_input_with_sequence(funding.hash(), 0, SEQUENCE_RBF_MAX)
                .add_output(&my_address(), 4_000)
                .lock_time(15)
                .build(),
        );
        let child = spend_tx(&[(locked.hash(), 0)], &[(&my_address(), 3_900)], TX_UNCONFIRMED);
        wallet.insert_transaction(locked.clone());
        wallet.insert_transaction(child.clone());

        assert!(wallet.transaction_is_pending(&locked));
        assert!(wallet.transaction_is_pending(&child));
        assert_eq!(wallet.balance(), 0);

        wallet.set_block_height(13);
        assert!(wallet.transaction_is_pending(&locked));

        wallet.set_block_height(14);
        assert!(!wallet.transaction_is_pending(&locked));
        assert!(!wallet.transaction_is_pending(&child));

        wallet.update_transactions(&[locked.hash(), child.hash()], 15, 1_015);
        assert_eq!(wallet.balance(), 3_900);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_future_timestamp_lock_is_pending() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000], 5);
        wallet.insert_transaction(funding.clone());

        let locked = sign(
            TransactionBuilder::new()
                .add_input_with_sequence(funding.hash(), 0, SEQUENCE_RBF_MAX)
                .add_output(&my_address(), 4_000)
                .lock_time(u32::MAX - 1)
                .build(),
        );
        wallet.insert_transaction(locked.clone());
        wallet.set_block_height(1_000_000);

        assert!(wallet.transaction_is_pending(&locked));
        assert_eq!(wallet.balance(), 0);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_oversized_transaction_is_pending() {
        let wallet = test_wallet();
        let mut big = TransactionBuilder::new()
            .add_output(&my_address(), 5_000)
            .build();
        big.add_attribute(AttributeUsage::Memo, vec![0u8; TX_MAX_SIZE]);
        let big = sign(big);
        assert!(big.size() > TX_MAX_SIZE);

        wallet.insert_transaction(big.clone());
        assert!(wallet.transaction_is_pending(&big));
        assert_eq!(wallet.balance(), 0);

        wallet.update_transactions(&[big.hash()], 2, 1_002);
        assert!(!wallet.transaction_is_pending(&wallet.transaction_for_hash(&big.hash()).unwrap()));
        assert_eq!(wallet.balance(), 5_000);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_remove_transaction_cascades() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000], 5);
        let child = spend_tx(&[(funding.hash(), 0)], &[(&my_address(), 4_000)], 6);
        let grandchild = spend_tx(&[(child.hash(), 0)], &[(&my_address(), 3_000)], 7);
        let unrelated = funding_tx(&[700], 8);

        for tx in [&funding, &child, &grandchild, &unrelated] {
            wallet.insert_transaction(tx.clone());
        }
        assert_eq!(wallet.balance(), 3_700);

        wallet.remove_transaction(&funding.hash());

        assert_eq!(wallet.transaction_count(), 1);
        assert!(!wallet.has_transaction(&child.hash()));
        assert!(!wallet.has_transaction(&grandchild.hash()));
        assert_eq!(wallet.balance(), 700);
        assert!(wallet.utxos().iter().all(|u| u.hash == unrelated.hash()));
        assert_consistent(&wallet);
    }

    #[test]
    fn test_remove_notifies_sent_transaction() {
        let wallet = test_wallet();
        let recorder = Arc::new(RecordingListener::default());
        let listener: Arc<dyn WalletListener> = recorder.clone();
        wallet.set_listener(&listener);

        let funding = funding_tx(&[5_000], 5);
        let spend = spend_tx(&[(funding.hash(), 0)], &[(&other_address(), 4_000)], TX_UNCONFIRMED);
        wallet.insert_transaction(funding);
        wallet.insert_transaction(spend.clone());
        wallet.remove_transaction(&spend.hash());

        let events = recorder.events();
        assert_eq!(events.last(), Some(&Event::Deleted(spend.hash(), true, true)));
        assert!(events.contains(&Event::Added(spend.hash())));
        assert_eq!(wallet.balance(), 5_000);
    }

    #[test]
    fn test_update_transactions_confirms() {
        let wallet = test_wallet();
        let recorder = Arc::new(RecordingListener::default());
        let listener: Arc<dyn WalletListener> = recorder.clone();
        wallet.set_listener(&listener);

        let tx = funding_tx(&[5_000], TX_UNCONFIRMED);
        wallet.insert_transaction(tx.clone());
        wallet.update_transactions(&[tx.hash(), TxHash([9; 32])], 42, 1_234);

        assert_eq!(wallet.block_height(), 42);
        assert_eq!(wallet.transaction_for_hash(&tx.hash()).unwrap().block_height, 42);
        assert_eq!(wallet.transactions_confirmed_before(43).len(), 1);
        assert!(wallet.transactions_confirmed_before(42).is_empty());
        assert!(recorder.events().contains(&Event::Updated(tx.hash(), 42, 1_234)));

        wallet.set_tx_unconfirmed_after(41);
        assert!(!wallet.transaction_for_hash(&tx.hash()).unwrap().is_confirmed());
        assert_eq!(wallet.block_height(), 41);
    }

    #[test]
    fn test_register_requires_relevance() {
        let wallet = test_wallet();
        let foreign = spend_tx(&[], &[(&other_address(), 1_000)], TX_UNCONFIRMED);
        assert!(!wallet.contains_transaction(&foreign));
        assert!(!wallet.register_transaction(foreign.clone()));

        wallet.set_listening_addresses(&[other_address()]);
        assert!(wallet.register_transaction(foreign.clone()));
        assert!(wallet.register_transaction(foreign));
        assert_eq!(wallet.balance(), 0);

        let funding = funding_tx(&[2_000], 3);
        let spend = spend_tx(&[(funding.hash(), 0)], &[(&address_of(9), 1_500)], 4);
        assert!(wallet.register_transaction(funding));
        assert!(wallet.register_transaction(spend));
        assert_eq!(wallet.balance(), 0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let wallet = test_wallet();
        let funding = funding_tx(&[5_000, 300], 5);
        wallet.insert_transaction(funding.clone());
        wallet.insert_transaction(spend_tx(&[(funding.hash(), 0)], &[(&my_address(), 4_000)], TX_UNCONFIRMED));

        let snapshot = (wallet.balance(), wallet.utxos(), wallet.balance_history());
        wallet.recompute();
        wallet.recompute();
        assert_eq!((wallet.balance(), wallet.utxos(), wallet.balance_history()), snapshot);
    }

    #[test]
    fn test_fee_settings_and_queries() {
        let wallet = test_wallet();
        assert!(wallet.set_fee_per_kb(MAX_FEE_PER_KB + 1).is_err());
        wallet.set_fee_per_kb(10_000).unwrap();
        assert_eq!(wallet.fee_per_kb(), 10_000);
        assert_eq!(wallet.min_output_amount(), TX_MIN_OUTPUT_AMOUNT * 10);

        let funding = funding_tx(&[50_000, 50_000], 5);
        wallet.insert_transaction(funding.clone());
        assert!(wallet.max_output_amount() < 100_000);
        assert!(wallet.max_output_amount() >= 90_000);
        assert_eq!(wallet.balance_with_address(&my_address()), 100_000);
        assert_eq!(wallet.balance_info().len(), 1);

        wallet.register_remark(&funding.hash(), "salary");
        assert_eq!(wallet.remark(&funding.hash()).as_deref(), Some("salary"));
        assert_eq!(wallet.receive_address(), Some(my_address()));
        assert_eq!(wallet.fee_for_tx(&spend_tx(&[(TxHash([3; 32]), 0)], &[], 1)), None);
    }

    #[test]
    fn test_concurrent_network_and_app_threads() {
        let wallet = Arc::new(test_wallet());
        let funding: Vec<Transaction> = (0..40).map(|i| funding_tx(&[1_000], 10 + i)).collect();

        let mut handles = Vec::new();
        for chunk in funding.chunks(10) {
            let wallet = Arc::clone(&wallet);
            let chunk = chunk.to_vec();
            handles.push(thread::spawn(move || {
                for tx in chunk {
                    wallet.register_transaction(tx);
                }
            }));
        }
        for _ in 0..4 {
            let wallet = Arc::clone(&wallet);
            handles.push(thread::spawn(move || {
                for _ in 0..20 {
                    let balance = wallet.balance();
                    assert!(balance <= 40_000);
                    assert_eq!(balance % 1_000, 0);
                    let _ = wallet.utxos();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wallet.balance(), 40_000);
        assert_eq!(wallet.transaction_count(), 40);
        assert_consistent(&wallet);
    }

    #[test]
    fn test_listener_may_reenter_wallet() {
        struct Reentrant(std::sync::Weak<Wallet>, std::sync::Mutex<Vec<u64>>);
        impl WalletListener for Reentrant {
            fn on_balance_changed(&self, balance: u64) {
                if let Some(wallet) = self.0.upgrade() {
                    assert_eq!(wallet.balance(), balance);
                    self.1.lock().unwrap().push(balance);
                }
            }
            fn on_tx_added(&self, _tx: &Transaction) {}
            fn on_tx_updated(&self, _hash: &TxHash, _height: u32, _timestamp: u32) {}
            fn on_tx_deleted(&self, _hash: &TxHash, _notify: bool, _rescan: bool) {}
        }

        let wallet = Arc::new(test_wallet());
        let reentrant = Arc::new(Reentrant(Arc::downgrade(&wallet), Default::default()));
        let listener: Arc<dyn WalletListener> = reentrant.clone();
        wallet.set_listener(&listener);

        wallet.insert_transaction(funding_tx(&[800], 2));
        assert_eq!(*reentrant.1.lock().unwrap(), vec![800]);
    }
}
