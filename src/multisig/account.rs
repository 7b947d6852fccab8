//! Multi-signature accounts
//!
//! The address of an M-of-N account is a pure function of the signer key
//! set and M: keys are sorted in descending byte order before the redeem
//! script is emitted, so any permutation of the same keys yields the same
//! address.

use crate::account::{input_addresses, Account, SubAccount};
use crate::config::CoinConfig;
use crate::core::{multisig_redeem_script, Program, ScriptError, Transaction, SIGNATURE_PUSH_LEN};
use crate::crypto::{address_from_program_hash, program_hash_for_code, KeyError, KeyPair};
use crate::wallet::{AddressSource, SingleAddress, Wallet, WalletError};
use secp256k1::PublicKey;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors related to multisig operations
#[derive(Error, Debug)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Duplicate signer public key")]
    DuplicateSigner,
    #[error("Wrong account type: {0}")]
    WrongAccountType(String),
    #[error("Already signed by this signer")]
    AlreadySigned,
    #[error("Transaction already has {have} of {need} signatures")]
    AlreadyComplete { have: usize, need: usize },
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

impl From<MultisigError> for WalletError {
    fn from(e: MultisigError) -> Self {
        match e {
            MultisigError::WrongAccountType(msg) => WalletError::WrongAccountType(msg),
            MultisigError::CryptoError(e) => WalletError::CryptoError(e),
            MultisigError::Script(e) => WalletError::Script(e),
            e @ (MultisigError::AlreadySigned | MultisigError::AlreadyComplete { .. }) => {
                WalletError::Sign(e.to_string())
            }
            e => WalletError::InvalidArgument(e.to_string()),
        }
    }
}

/// Full signer set in script order: descending byte comparison
pub fn sorted_signer_keys(keys: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut sorted = keys.to_vec();
    sorted.sort_by(|a, b| b.cmp(a));
    sorted
}

/// Redeem script of an M-of-N account over `keys`, in any order
pub fn multisig_redeem_script_for(keys: &[Vec<u8>], required: usize) -> Result<Vec<u8>, MultisigError> {
    check_signer_set(keys)?;
    Ok(multisig_redeem_script(&sorted_signer_keys(keys), required)?)
}

/// Address of an M-of-N account over `keys`, in any order
pub fn multisig_address(keys: &[Vec<u8>], required: usize) -> Result<String, MultisigError> {
    let script = multisig_redeem_script_for(keys, required)?;
    Ok(address_from_program_hash(&program_hash_for_code(&script)))
}

/// Whether `address` belongs to the M-of-N account over `keys`
pub fn verify_address(keys: &[Vec<u8>], required: usize, address: &str) -> Result<bool, MultisigError> {
    Ok(multisig_address(keys, required)? == address)
}

fn check_signer_set(keys: &[Vec<u8>]) -> Result<(), MultisigError> {
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        PublicKey::from_slice(key).map_err(|_| KeyError::InvalidPublicKey)?;
        if !seen.insert(key.as_slice()) {
            return Err(MultisigError::DuplicateSigner);
        }
    }
    Ok(())
}

// =============================================================================
// Account
// =============================================================================

/// M-of-N signer set, optionally holding one of the keys locally
pub struct MultiSigAccount {
    local: Option<Arc<dyn Account>>,
    cosigners: Vec<Vec<u8>>,
    required: usize,
}

impl MultiSigAccount {
    /// Account that signs with `local`; N counts the local key
    pub fn new(local: Arc<dyn Account>, cosigners: Vec<Vec<u8>>, required: usize) -> Result<Self, MultisigError> {
        let mut keys = cosigners.clone();
        keys.push(local.public_key());
        multisig_redeem_script_for(&keys, required)?;

        Ok(Self {
            local: Some(local),
            cosigners,
            required,
        })
    }

    /// Watch-only account over the full signer set
    pub fn read_only(signers: Vec<Vec<u8>>, required: usize) -> Result<Self, MultisigError> {
        multisig_redeem_script_for(&signers, required)?;
        Ok(Self {
            local: None,
            cosigners: signers,
            required,
        })
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// N, including the local key
    pub fn total(&self) -> usize {
        self.cosigners.len() + usize::from(self.local.is_some())
    }

    pub fn is_read_only(&self) -> bool {
        self.local.is_none()
    }

    fn local(&self) -> Result<&Arc<dyn Account>, MultisigError> {
        self.local
            .as_ref()
            .ok_or_else(|| MultisigError::WrongAccountType("no local signing key".to_string()))
    }

    /// Co-signers plus the local key, sorted descending
    pub fn signer_keys(&self) -> Result<Vec<Vec<u8>>, MultisigError> {
        let mut keys = self.cosigners.clone();
        keys.push(self.local()?.public_key());
        Ok(sorted_signer_keys(&keys))
    }

    pub fn redeem_script(&self) -> Result<Vec<u8>, MultisigError> {
        Ok(multisig_redeem_script(&self.signer_keys()?, self.required)?)
    }

    /// Address folding in the local key
    ///
    /// Fails for a read-only account, which has no local key to add.
    pub fn address(&self) -> Result<String, MultisigError> {
        Ok(address_from_program_hash(&program_hash_for_code(
            &self.redeem_script()?,
        )))
    }

    /// Address the wallet watches; a read-only account uses its signer list as given
    fn watch_address(&self) -> Result<String, MultisigError> {
        match self.local {
            Some(_) => self.address(),
            None => multisig_address(&self.cosigners, self.required),
        }
    }
}

// =============================================================================
// Sub-account
// =============================================================================

/// Wallet view of a multisig account: one address, one signature per signer
pub struct MultiSignSubAccount {
    account: MultiSigAccount,
}

impl MultiSignSubAccount {
    pub fn new(account: MultiSigAccount) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &MultiSigAccount {
        &self.account
    }

    /// Append the local signature to the program for our redeem script
    fn add_signature(&self, tx: &mut Transaction, key: &KeyPair) -> Result<(), MultisigError> {
        let code = self.account.redeem_script()?;
        let signing_data = tx.signing_data();

        let index = match tx.programs.iter().position(|p| p.code == code) {
            Some(index) => index,
            None => {
                tx.programs.push(Program {
                    code,
                    parameter: Vec::new(),
                });
                tx.programs.len() - 1
            }
        };
        let program = &mut tx.programs[index];

        if program.is_complete() {
            return Err(MultisigError::AlreadyComplete {
                have: program.signature_count(),
                need: self.account.required,
            });
        }
        for push in program.parameter.chunks(SIGNATURE_PUSH_LEN) {
            if push.len() == SIGNATURE_PUSH_LEN && key.verify(&signing_data, &push[1..]).unwrap_or(false) {
                return Err(MultisigError::AlreadySigned);
            }
        }

        program.push_signature(&key.sign(&signing_data)?);
        log::debug!(
            "Added signature {} of {}",
            program.signature_count(),
            self.account.required
        );
        Ok(())
    }
}

impl SubAccount for MultiSignSubAccount {
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError> {
        self.account.local()?.derive_key(pay_password)
    }

    fn public_key(&self) -> Result<Vec<u8>, WalletError> {
        Ok(self.account.local()?.public_key())
    }

    fn init_wallet(&self, _config: &CoinConfig) -> Result<Box<dyn AddressSource>, WalletError> {
        Ok(Box::new(SingleAddress::new(self.account.watch_address()?)))
    }

    fn sign_transaction(
        &self,
        tx: &mut Transaction,
        wallet: &Wallet,
        pay_password: &str,
    ) -> Result<(), WalletError> {
        let address = self.account.address()?;
        if let Some(foreign) = input_addresses(tx, wallet)?.into_iter().find(|a| *a != address) {
            return Err(WalletError::Sign(format!("cannot sign for {}", foreign)));
        }

        let key = self.derive_key(pay_password)?;
        self.add_signature(tx, &key)?;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.account.is_read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::StandardAccount;
    use crate::config::SubWalletType;
    use crate::core::{TransactionBuilder, OP_1, OP_MULTISIG};
    use crate::crypto::program_hash_from_address;

    const PASSWORD: &str = "pay-password";

    fn account(seed: u8) -> Arc<dyn Account> {
        Arc::new(StandardAccount::from_seed(&[seed; 32], PASSWORD).unwrap())
    }

    fn keys() -> Vec<Vec<u8>> {
        (1..=3).map(|seed| account(seed).public_key()).collect()
    }

    #[test]
    fn test_address_independent_of_key_order() {
        let keys = keys();
        let expected = multisig_address(&keys, 2).unwrap();

        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in permutations {
            let shuffled: Vec<Vec<u8>> = order.iter().map(|&i| keys[i].clone()).collect();
            assert_eq!(multisig_address(&shuffled, 2).unwrap(), expected);
        }

        assert_eq!(program_hash_from_address(&expected).unwrap()[0], 0x12);
        assert_ne!(multisig_address(&keys, 3).unwrap(), expected);
    }

    #[test]
    fn test_script_sorts_descending() {
        let keys = keys();
        let script = multisig_redeem_script_for(&keys, 2).unwrap();
        let sorted = sorted_signer_keys(&keys);

        assert!(sorted[0] > sorted[1] && sorted[1] > sorted[2]);
        assert_eq!(script[0], OP_1 + 1);
        assert_eq!(&script[2..35], sorted[0].as_slice());
        assert_eq!(script[script.len() - 2], OP_1 + 2);
        assert_eq!(script[script.len() - 1], OP_MULTISIG);
    }

    #[test]
    fn test_local_account_matches_full_key_list() {
        let keys = keys();
        let local = MultiSigAccount::new(account(1), keys[1..].to_vec(), 2).unwrap();

        assert_eq!(local.total(), 3);
        assert_eq!(local.address().unwrap(), multisig_address(&keys, 2).unwrap());
        assert!(verify_address(&keys, 2, &local.address().unwrap()).unwrap());
    }

    #[test]
    fn test_read_only_account_cannot_derive() {
        let keys = keys();
        let watch = MultiSigAccount::read_only(keys.clone(), 2).unwrap();

        assert!(watch.is_read_only());
        assert!(matches!(watch.address(), Err(MultisigError::WrongAccountType(_))));
        assert!(matches!(
            WalletError::from(watch.address().unwrap_err()),
            WalletError::WrongAccountType(_)
        ));

        // The explicit key list still verifies
        let address = multisig_address(&keys, 2).unwrap();
        assert!(verify_address(&keys, 2, &address).unwrap());
        assert!(!verify_address(&keys[..2], 2, &address).unwrap());
    }

    #[test]
    fn test_invalid_signer_sets() {
        let keys = keys();
        assert!(matches!(
            multisig_address(&keys, 0),
            Err(MultisigError::Script(_))
        ));
        assert!(multisig_address(&keys, 4).is_err());

        let duplicated = vec![keys[0].clone(), keys[1].clone(), keys[0].clone()];
        assert!(matches!(
            multisig_address(&duplicated, 2),
            Err(MultisigError::DuplicateSigner)
        ));

        let bogus = vec![keys[0].clone(), vec![0x05; 33]];
        assert!(matches!(
            multisig_address(&bogus, 1),
            Err(MultisigError::CryptoError(_))
        ));

        assert!(MultiSigAccount::new(account(1), keys.clone(), 2).is_err());
    }

    #[test]
    fn test_two_of_three_signing() {
        let keys = keys();
        let first = MultiSignSubAccount::new(
            MultiSigAccount::new(account(1), vec![keys[1].clone(), keys[2].clone()], 2).unwrap(),
        );
        let second = MultiSignSubAccount::new(
            MultiSigAccount::new(account(2), vec![keys[2].clone(), keys[0].clone()], 2).unwrap(),
        );
        let address = first.account().address().unwrap();
        assert_eq!(address, second.account().address().unwrap());

        let mut config = CoinConfig::new("ELA", SubWalletType::Mainchain);
        config.min_fee = 1;
        let wallet = Wallet::from_sub_account(&config, &first, Vec::new()).unwrap();
        wallet.insert_transaction(
            TransactionBuilder::new()
                .add_output(&address, 10_000)
                .confirmed_at(1, 0)
                .program(vec![0xac], vec![0x40; 65])
                .build(),
        );
        wallet.set_block_height(2);

        let mut tx = wallet
            .create_transaction(None, 4_000, &address, "", "")
            .unwrap();

        first.sign_transaction(&mut tx, &wallet, PASSWORD).unwrap();
        assert!(!tx.is_signed());
        assert!(matches!(
            first.sign_transaction(&mut tx, &wallet, PASSWORD),
            Err(WalletError::Sign(_))
        ));

        second.sign_transaction(&mut tx, &wallet, PASSWORD).unwrap();
        assert!(tx.is_signed());
        assert_eq!(tx.programs.len(), 1);
        assert_eq!(tx.programs[0].signature_count(), 2);

        let watch = MultiSignSubAccount::new(MultiSigAccount::read_only(keys, 2).unwrap());
        assert!(watch.is_read_only());
        assert!(matches!(
            watch.sign_transaction(&mut tx, &wallet, PASSWORD),
            Err(WalletError::WrongAccountType(_))
        ));
    }
}
