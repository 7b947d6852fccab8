//! Coin selection and transaction building
//!
//! Picks wallet UTXOs to cover a set of outputs plus the size-based fee,
//! bounded by the maximum transaction size, and returns the change to a
//! fresh internal address.

use super::error::WalletError;
use super::ledger::{Utxo, Wallet};
use crate::core::{
    fee_for_size, AssetId, AttributeUsage, Transaction, TxInput, TxOutput, TXIN_SEQUENCE,
    TX_MAX_SIZE, TX_RECHARGE_OUTPUT_SIZE,
};
use crate::crypto::is_valid_address;

/// Order UTXOs for selection
///
/// Ascending by amount, except that the run of UTXOs before the first one
/// worth more than `2 * amount + fee_per_kb` is flipped to descending.
pub fn sort_utxos_for_amount(utxos: &[Utxo], amount: u64, fee_per_kb: u64) -> Vec<Utxo> {
    let mut sorted = utxos.to_vec();
    sorted.sort_by_key(|u| u.amount);

    let threshold = amount.saturating_mul(2).saturating_add(fee_per_kb);
    let threshold_index = sorted
        .iter()
        .position(|u| u.amount > threshold)
        .unwrap_or(0);
    sorted[..threshold_index].sort_by(|a, b| b.amount.cmp(&a.amount));

    sorted
}

impl Wallet {
    /// Build an unsigned transaction paying `outputs`
    ///
    /// Only UTXOs confirmed below the wallet height are spent; with
    /// `from_address` set, only UTXOs paid to that address. Nothing in the
    /// wallet changes unless a change address has to be handed out.
    pub fn create_tx_for_outputs(
        &self,
        outputs: Vec<TxOutput>,
        fee_per_kb: u64,
        from_address: Option<&str>,
    ) -> Result<Transaction, WalletError> {
        if outputs.is_empty() {
            return Err(WalletError::CreateTransaction("Invalid outputs".to_string()));
        }

        let amount = outputs
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.amount))
            .ok_or_else(|| WalletError::InvalidArgument("output amounts overflow".to_string()))?;
        let last_amount = outputs[outputs.len() - 1].amount;

        let mut tx = Transaction::new(Vec::new(), outputs);

        let mut guard = self.lock();
        let state = &mut *guard;

        let mut fee = fee_for_size(tx.size(), fee_per_kb);
        let mut selected = 0u64;

        for utxo in sort_utxos_for_amount(&state.utxos, amount, fee_per_kb) {
            let parent = match state.transactions.get(&utxo.hash) {
                Some(parent) => parent,
                None => continue,
            };
            let output = match parent.outputs.get(utxo.index as usize) {
                Some(output) => output,
                None => continue,
            };
            if from_address.map_or(false, |from| output.address != from) {
                continue;
            }
            if parent.block_height >= state.block_height {
                log::warn!(
                    "utxo {} confirming, can't spend for now, tx height = {}, wallet height = {}",
                    utxo.outpoint(),
                    parent.block_height,
                    state.block_height
                );
                continue;
            }

            tx.inputs.push(TxInput {
                prev_hash: utxo.hash,
                index: utxo.index,
                sequence: TXIN_SEQUENCE,
                address: output.address.clone(),
            });

            if tx.size() + TX_RECHARGE_OUTPUT_SIZE > TX_MAX_SIZE {
                let fee = fee_for_size(tx.size(), fee_per_kb) + fee_per_kb;
                let required = amount.saturating_add(fee);

                if state.balance < required {
                    log::error!("Not enough total funds for building a smaller transaction");
                    return Err(WalletError::CreateTransaction(
                        "Available token is not enough".to_string(),
                    ));
                }

                let shortfall = required - selected;
                let others = amount - last_amount;
                let max_amount = if last_amount > shortfall {
                    others + last_amount - shortfall
                } else {
                    others
                };
                return Err(WalletError::CreateTransactionExceedSize { max_amount });
            }

            selected += output.amount;
            fee = fee_for_size(tx.size(), fee_per_kb);

            if selected >= amount.saturating_add(fee) {
                break;
            }
        }

        let required = amount.saturating_add(fee);
        if selected < required {
            return Err(WalletError::BalanceNotEnough {
                available: selected,
                required,
            });
        }

        let change = selected - required;
        if change > 0 {
            let change_address = state
                .address_source
                .unused_addresses(1, true, &state.used_addrs)
                .into_iter()
                .next()
                .ok_or_else(|| WalletError::Wallet("no change address available".to_string()))?;
            let asset_id = tx.outputs[0].asset_id;
            tx.outputs.push(TxOutput::new(&change_address, change, asset_id));
        }

        tx.fee = fee;
        Ok(tx)
    }

    /// Pay `amount` of the native asset to `to_address`
    pub fn create_transaction(
        &self,
        from_address: Option<&str>,
        amount: u64,
        to_address: &str,
        memo: &str,
        remark: &str,
    ) -> Result<Transaction, WalletError> {
        if let Some(from) = from_address {
            if !is_valid_address(from) {
                return Err(WalletError::InvalidArgument(format!(
                    "Invalid spender address {}",
                    from
                )));
            }
        }
        if !is_valid_address(to_address) {
            return Err(WalletError::InvalidArgument(format!(
                "Invalid receiver address {}",
                to_address
            )));
        }
        if amount == 0 {
            return Err(WalletError::InvalidArgument("amount must be positive".to_string()));
        }

        let outputs = vec![TxOutput::new(to_address, amount, AssetId::system())];
        let mut tx = self.create_tx_for_outputs(outputs, self.fee_per_kb(), from_address)?;

        tx.remark = remark.to_string();
        tx.add_attribute(AttributeUsage::Nonce, rand::random::<u32>().to_string().into_bytes());
        if !memo.is_empty() {
            tx.add_attribute(AttributeUsage::Memo, memo.as_bytes().to_vec());
        }
        Ok(tx)
    }
}
