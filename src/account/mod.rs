//! Accounts and sub-accounts
//!
//! An account holds the root key behind a pay password. A sub-account
//! decides how one wallet uses it:
//! - a single fixed address
//! - BIP32 external and internal address chains
//! - an M-of-N multisig address (see [`crate::multisig`])

pub mod standard;
pub mod subaccount;

pub use standard::StandardAccount;
pub use subaccount::{HdSubAccount, SingleSubAccount};

use crate::config::CoinConfig;
use crate::core::{Program, Transaction};
use crate::crypto::{ExtendedPrivateKey, KeyPair};
use crate::wallet::{AddressSource, Wallet, WalletError};
use std::sync::Arc;

/// Root key material guarded by a pay password
pub trait Account: Send + Sync {
    /// Signing key, released against the pay password
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError>;

    /// BIP32 master key, released against the pay password
    fn derive_master(&self, pay_password: &str) -> Result<ExtendedPrivateKey, WalletError>;

    fn public_key(&self) -> Vec<u8>;
}

/// Key and address policy of one wallet
pub trait SubAccount: Send + Sync {
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError>;

    fn public_key(&self) -> Result<Vec<u8>, WalletError>;

    /// Address source the wallet tracks
    fn init_wallet(&self, config: &CoinConfig) -> Result<Box<dyn AddressSource>, WalletError>;

    /// Add this sub-account's signatures to `tx`
    fn sign_transaction(
        &self,
        tx: &mut Transaction,
        wallet: &Wallet,
        pay_password: &str,
    ) -> Result<(), WalletError>;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// Sub-account matching the address mode in `config`
pub fn new_sub_account(
    config: &CoinConfig,
    account: Arc<dyn Account>,
    pay_password: &str,
) -> Result<Box<dyn SubAccount>, WalletError> {
    if config.single_address {
        Ok(Box::new(SingleSubAccount::new(account)))
    } else {
        Ok(Box::new(HdSubAccount::new(account, config.index, pay_password)?))
    }
}

impl Wallet {
    /// Wallet over the addresses of `sub_account`
    pub fn from_sub_account(
        config: &CoinConfig,
        sub_account: &dyn SubAccount,
        transactions: Vec<Transaction>,
    ) -> Result<Self, WalletError> {
        let address_source = sub_account.init_wallet(config)?;
        Wallet::new(config, address_source, transactions)
    }
}

/// Address each input spends from, deduplicated, in input order
pub(crate) fn input_addresses(tx: &Transaction, wallet: &Wallet) -> Result<Vec<String>, WalletError> {
    let mut addresses: Vec<String> = Vec::new();
    for input in &tx.inputs {
        let address = if input.address.is_empty() {
            wallet
                .transaction_for_hash(&input.prev_hash)
                .and_then(|parent| parent.outputs.get(input.index as usize).map(|o| o.address.clone()))
                .ok_or_else(|| WalletError::Sign(format!("unknown input {}", input.outpoint())))?
        } else {
            input.address.clone()
        };
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    Ok(addresses)
}

/// Single-signature program over `key`'s standard redeem script
pub(crate) fn standard_program(key: &KeyPair, signing_data: &[u8]) -> Result<Program, WalletError> {
    let mut program = Program {
        code: crate::core::standard_redeem_script(&key.public_key_bytes()),
        parameter: Vec::new(),
    };
    program.push_signature(&key.sign(signing_data)?);
    Ok(program)
}
