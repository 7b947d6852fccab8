//! Multi-signature accounts
//!
//! M-of-N accounts whose address is derived deterministically from the
//! signer key set, and the sub-account that adds one signature per signer
//! to a shared program.
//!
//! # Example
//!
//! ```ignore
//! use spv_wallet::multisig::{multisig_address, MultiSigAccount, MultiSignSubAccount};
//!
//! // Same address for any ordering of the three keys
//! let address = multisig_address(&[key1, key2, key3], 2)?;
//!
//! // Local signer plus two co-signers
//! let account = MultiSigAccount::new(local_account, vec![key2, key3], 2)?;
//! let sub_account = MultiSignSubAccount::new(account);
//! sub_account.sign_transaction(&mut tx, &wallet, pay_password)?;
//! ```

pub mod account;

pub use account::{
    multisig_address, multisig_redeem_script_for, sorted_signer_keys, verify_address,
    MultiSigAccount, MultiSignSubAccount, MultisigError,
};
