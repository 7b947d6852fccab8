//! SPV networking boundary
//!
//! Per-peer bookkeeping and merkle block acceptance. The connection layer
//! itself lives outside this crate: it hands in decoded messages and
//! receives getdata requests through [`PeerMessages`].

pub mod acceptor;
pub mod peer;

pub use acceptor::{BlockAcceptance, MerkleBlockAcceptor};
pub use peer::{PeerContext, PeerId, PeerMessages};
