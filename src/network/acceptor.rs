//! Merkle block acceptance
//!
//! Checks filtered blocks relayed by peers and turns them into wallet
//! confirmations. A block whose matched transactions are all known
//! confirms them at once; otherwise the missing transactions are
//! requested and the block waits on that peer until they arrive.
//!
//! Malformed or invalid input is logged and dropped. It never touches
//! wallet state.

use super::peer::{PeerContext, PeerId, PeerMessages};
use crate::core::{MerkleBlock, Transaction, TxHash};
use crate::wallet::Wallet;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Outcome of a relayed merkle block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAcceptance {
    /// Header or proof could not be parsed
    Malformed,
    /// Failed proof-of-work, timestamp or merkle checks, or arrived unfiltered
    Invalid,
    /// Buffered until the missing transactions arrive
    AcceptedPending { missing: usize },
    /// Every matched transaction is known; confirmations applied
    AcceptedComplete,
}

/// Accepts merkle blocks from peers on behalf of one wallet
pub struct MerkleBlockAcceptor {
    peers: Mutex<HashMap<PeerId, PeerContext>>,
    messages: Arc<dyn PeerMessages>,
    wallet: Option<Weak<Wallet>>,
}

impl MerkleBlockAcceptor {
    /// Acceptor with no wallet: completed blocks are discarded
    pub fn new(messages: Arc<dyn PeerMessages>) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            messages,
            wallet: None,
        }
    }

    /// Acceptor confirming transactions in `wallet`
    pub fn with_wallet(messages: Arc<dyn PeerMessages>, wallet: &Arc<Wallet>) -> Self {
        Self {
            wallet: Some(Arc::downgrade(wallet)),
            ..Self::new(messages)
        }
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<PeerId, PeerContext>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wallet(&self) -> Option<Arc<Wallet>> {
        self.wallet.as_ref().and_then(Weak::upgrade)
    }

    pub fn add_peer(&self, peer: PeerId) {
        self.peers().entry(peer).or_default();
    }

    /// Forget a peer, abandoning any block it was buffering
    pub fn drop_peer(&self, peer: &PeerId) {
        if let Some(ctx) = self.peers().remove(peer) {
            if let Some(block) = ctx.current_block {
                log::debug!(
                    "Abandoned block at height {} from {}, {} transactions missing",
                    block.height,
                    peer,
                    ctx.current_block_tx_hashes.len()
                );
            }
        }
    }

    pub fn mark_filter_sent(&self, peer: PeerId) {
        self.peers().entry(peer).or_default().sent_filter = true;
    }

    pub fn mark_getdata_sent(&self, peer: PeerId) {
        self.peers().entry(peer).or_default().sent_getdata = true;
    }

    /// Snapshot of a peer's state
    pub fn peer_context(&self, peer: &PeerId) -> Option<PeerContext> {
        self.peers().get(peer).cloned()
    }

    /// Decode and accept a `merkleblock` message body
    pub fn accept_merkle_block(&self, peer: PeerId, payload: &[u8], now: u64) -> BlockAcceptance {
        match MerkleBlock::decode(payload) {
            Ok(block) => self.accept_block(peer, block, now),
            Err(e) => {
                log::warn!(
                    "Malformed merkleblock message with length {} from {}: {}",
                    payload.len(),
                    peer,
                    e
                );
                BlockAcceptance::Malformed
            }
        }
    }

    /// Accept a decoded merkle block
    pub fn accept_block(&self, peer: PeerId, block: MerkleBlock, now: u64) -> BlockAcceptance {
        if let Err(e) = block.validate(now) {
            log::warn!("Invalid merkleblock {} from {}: {}", hex::encode(block.block_hash()), peer, e);
            return BlockAcceptance::Invalid;
        }

        let matched = block.tx_hashes();
        let wallet = self.wallet();
        let held: HashSet<TxHash> = match &wallet {
            Some(wallet) => matched
                .iter()
                .filter(|h| wallet.has_transaction(h))
                .copied()
                .collect(),
            None => HashSet::new(),
        };
        drop(wallet);

        // One guard from filtering to buffering, so a transaction relayed
        // meanwhile is either known here or removed from the buffer later
        let mut peers = self.peers();
        let ctx = match peers.get_mut(&peer) {
            Some(ctx) if ctx.can_relay_blocks() => ctx,
            _ => {
                log::warn!("Got merkleblock from {} before loading a filter", peer);
                return BlockAcceptance::Invalid;
            }
        };

        // Reverse order, so arriving transactions are removed from the tail
        let missing: Vec<TxHash> = matched
            .into_iter()
            .rev()
            .filter(|h| !ctx.known_tx_hashes.contains(h) && !held.contains(h))
            .collect();

        if missing.is_empty() {
            drop(peers);
            self.confirm(&block);
            return BlockAcceptance::AcceptedComplete;
        }

        let request: Vec<TxHash> = missing.iter().rev().copied().collect();
        let count = missing.len();
        ctx.sent_getdata = true;
        if let Some(previous) = ctx.current_block.take() {
            log::debug!("Replacing unfinished block at height {} from {}", previous.height, peer);
        }
        ctx.current_block_tx_hashes = missing;
        ctx.current_block = Some(block);
        drop(peers);

        self.messages.send_getdata(&peer, &request);
        BlockAcceptance::AcceptedPending { missing: count }
    }

    /// Handle a transaction relayed by `peer`
    ///
    /// The transaction is registered with the wallet first, then the peer's
    /// buffered block is confirmed if this was its last missing transaction.
    /// Returns whether the wallet took the transaction.
    pub fn accept_transaction(&self, peer: PeerId, tx: Transaction) -> bool {
        let hash = tx.hash();
        let registered = match self.wallet() {
            Some(wallet) => wallet.register_transaction(tx),
            None => false,
        };

        let completed = {
            let mut peers = self.peers();
            let ctx = peers.entry(peer).or_default();
            if ctx.mark_tx_received(hash) {
                ctx.take_completed_block()
            } else {
                None
            }
        };

        if let Some(block) = completed {
            self.confirm(&block);
        }
        registered
    }

    fn confirm(&self, block: &MerkleBlock) {
        match self.wallet() {
            Some(wallet) => {
                let hashes = block.tx_hashes();
                log::debug!(
                    "Block at height {} confirms {} transactions",
                    block.height,
                    hashes.len()
                );
                wallet.update_transactions(&hashes, block.height, block.timestamp);
            }
            None => log::debug!("No wallet wired, discarding block at height {}", block.height),
        }
    }
}
