//! Wallet ledger, coin selection and address bookkeeping
//!
//! The ledger owns the transaction set and derives the UTXO set and balance
//! from it; the builder selects coins from that view to assemble new
//! transactions.

pub mod address;
pub mod builder;
pub mod error;
pub mod ledger;
pub mod listener;

pub use address::{AddressSource, HdAddressChain, SingleAddress};
pub use builder::sort_utxos_for_amount;
pub use error::WalletError;
pub use ledger::{Utxo, Wallet};
pub use listener::{ListenerRef, WalletListener};
