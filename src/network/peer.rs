//! Per-peer SPV state
//!
//! What the wallet remembers about each connected peer while it relays
//! filtered blocks: whether a filter went out, which transactions the
//! peer already delivered, and the block waiting on missing transactions.

use crate::core::{MerkleBlock, TxHash};
use std::collections::HashSet;
use std::net::SocketAddr;

/// Peers are identified by their socket address
pub type PeerId = SocketAddr;

/// Outbound messages the acceptor needs from the connection layer
pub trait PeerMessages: Send + Sync {
    /// Ask `peer` for the given transactions
    fn send_getdata(&self, peer: &PeerId, tx_hashes: &[TxHash]);
}

/// Tracking state for one peer
#[derive(Debug, Clone, Default)]
pub struct PeerContext {
    /// A spend filter has been loaded on the peer
    pub sent_filter: bool,
    /// A getdata request went out to the peer
    pub sent_getdata: bool,
    /// Transactions the peer has already relayed
    pub known_tx_hashes: HashSet<TxHash>,
    /// Transactions the buffered block still waits for, in reverse block order
    pub current_block_tx_hashes: Vec<TxHash>,
    pub current_block: Option<MerkleBlock>,
}

impl PeerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the peer may relay filtered blocks yet
    pub fn can_relay_blocks(&self) -> bool {
        self.sent_filter || self.sent_getdata
    }

    /// Note a relayed transaction, returning true if the buffered block waited for it
    pub fn mark_tx_received(&mut self, hash: TxHash) -> bool {
        self.known_tx_hashes.insert(hash);
        // Transactions arrive in block order, so the match is usually last
        match self.current_block_tx_hashes.iter().rposition(|h| *h == hash) {
            Some(i) => {
                self.current_block_tx_hashes.remove(i);
                true
            }
            None => false,
        }
    }

    /// Take the buffered block once nothing is missing
    pub fn take_completed_block(&mut self) -> Option<MerkleBlock> {
        if self.current_block_tx_hashes.is_empty() {
            self.current_block.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> TxHash {
        TxHash([n; 32])
    }

    #[test]
    fn test_relay_requires_filter_or_getdata() {
        let mut ctx = PeerContext::new();
        assert!(!ctx.can_relay_blocks());

        ctx.sent_getdata = true;
        assert!(ctx.can_relay_blocks());
    }

    #[test]
    fn test_mark_tx_received() {
        let mut ctx = PeerContext::new();
        ctx.current_block_tx_hashes = vec![hash(3), hash(2), hash(1)];

        assert!(ctx.mark_tx_received(hash(1)));
        assert!(!ctx.mark_tx_received(hash(9)));
        assert_eq!(ctx.current_block_tx_hashes, vec![hash(3), hash(2)]);
        assert!(ctx.known_tx_hashes.contains(&hash(9)));
        assert!(ctx.take_completed_block().is_none());
    }
}
