//! SPV Wallet: the core of a simplified-payment-verification wallet
//!
//! This crate provides the pieces of a light wallet that never holds the
//! full chain:
//! - UTXO ledger rebuilt from the wallet's transactions, with balance history
//! - Coin selection and transaction building under size and fee limits
//! - Deterministic M-of-N multisig addresses
//! - Merkle block acceptance feeding confirmations into the ledger
//! - Single-address, HD and multisig sub-accounts
//!
//! # Example
//!
//! ```rust
//! use spv_wallet::config::CoinConfig;
//! use spv_wallet::crypto::KeyPair;
//! use spv_wallet::wallet::{SingleAddress, Wallet};
//!
//! let key = KeyPair::generate();
//! let config = CoinConfig::default();
//!
//! let wallet = Wallet::new(&config, Box::new(SingleAddress::new(key.address())), Vec::new()).unwrap();
//! println!("Balance: {}", wallet.balance());
//! ```

pub mod account;
pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod multisig;
pub mod network;
pub mod wallet;

// Re-export commonly used types
pub use account::{Account, StandardAccount, SubAccount};
pub use config::{CoinConfig, SubWalletType};
pub use core::{MerkleBlock, Transaction, TxHash};
pub use crypto::KeyPair;
pub use multisig::{multisig_address, MultiSigAccount, MultiSignSubAccount};
pub use network::{BlockAcceptance, MerkleBlockAcceptor};
pub use wallet::{Wallet, WalletError, WalletListener};
