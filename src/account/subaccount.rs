//! Single-address and HD sub-accounts

use super::{input_addresses, standard_program, Account, SubAccount};
use crate::config::CoinConfig;
use crate::core::Transaction;
use crate::crypto::{
    public_key_to_address, ExtendedPublicKey, KeyPair, HARDENED, SEQUENCE_EXTERNAL_CHAIN,
    SEQUENCE_INTERNAL_CHAIN,
};
use crate::wallet::{AddressSource, HdAddressChain, SingleAddress, Wallet, WalletError};
use std::sync::Arc;

/// BIP44 purpose
const PURPOSE: u32 = 44;

// =============================================================================
// Single Address
// =============================================================================

/// Receives and pays from the account key's own address
pub struct SingleSubAccount {
    account: Arc<dyn Account>,
}

impl SingleSubAccount {
    pub fn new(account: Arc<dyn Account>) -> Self {
        Self { account }
    }

    pub fn address(&self) -> String {
        public_key_to_address(&self.account.public_key())
    }
}

impl SubAccount for SingleSubAccount {
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError> {
        self.account.derive_key(pay_password)
    }

    fn public_key(&self) -> Result<Vec<u8>, WalletError> {
        Ok(self.account.public_key())
    }

    fn init_wallet(&self, _config: &CoinConfig) -> Result<Box<dyn AddressSource>, WalletError> {
        Ok(Box::new(SingleAddress::new(self.address())))
    }

    fn sign_transaction(
        &self,
        tx: &mut Transaction,
        wallet: &Wallet,
        pay_password: &str,
    ) -> Result<(), WalletError> {
        let address = self.address();
        if let Some(foreign) = input_addresses(tx, wallet)?.into_iter().find(|a| *a != address) {
            return Err(WalletError::Sign(format!("cannot sign for {}", foreign)));
        }

        let key = self.account.derive_key(pay_password)?;
        tx.programs = vec![standard_program(&key, &tx.signing_data())?];
        Ok(())
    }
}

// =============================================================================
// HD
// =============================================================================

/// BIP44 account `m/44'/index'/0'` with external and internal chains
pub struct HdSubAccount {
    account: Arc<dyn Account>,
    path: [u32; 3],
    account_key: ExtendedPublicKey,
}

impl HdSubAccount {
    /// Derives the account public key, which needs the pay password once
    pub fn new(account: Arc<dyn Account>, coin_index: u32, pay_password: &str) -> Result<Self, WalletError> {
        let path = [PURPOSE | HARDENED, coin_index | HARDENED, HARDENED];
        let account_key = account
            .derive_master(pay_password)?
            .derive_path(&path)?
            .to_public();

        Ok(Self {
            account,
            path,
            account_key,
        })
    }

    pub fn account_key(&self) -> &ExtendedPublicKey {
        &self.account_key
    }

    /// Chain and index of `address`, searching the first `limit` of each chain
    fn find_address(&self, address: &str, limit: u32) -> Option<(u32, u32)> {
        for chain in [SEQUENCE_EXTERNAL_CHAIN, SEQUENCE_INTERNAL_CHAIN] {
            for index in 0..limit {
                let derived = match self.account_key.derive_public_key(chain, index) {
                    Ok(public_key) => public_key_to_address(&public_key),
                    Err(_) => continue,
                };
                if derived == address {
                    return Some((chain, index));
                }
            }
        }
        None
    }
}

impl SubAccount for HdSubAccount {
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError> {
        Ok(self
            .account
            .derive_master(pay_password)?
            .derive_path(&self.path)?
            .key_pair())
    }

    fn public_key(&self) -> Result<Vec<u8>, WalletError> {
        Ok(self.account_key.public_key.serialize().to_vec())
    }

    fn init_wallet(&self, config: &CoinConfig) -> Result<Box<dyn AddressSource>, WalletError> {
        let mut chain = HdAddressChain::new(self.account_key);
        chain.extend_to(false, config.used_max_address_index as usize + 1);
        Ok(Box::new(chain))
    }

    fn sign_transaction(
        &self,
        tx: &mut Transaction,
        wallet: &Wallet,
        pay_password: &str,
    ) -> Result<(), WalletError> {
        let addresses = input_addresses(tx, wallet)?;
        let limit = wallet.all_addresses().len() as u32;
        let account_key = self.account.derive_master(pay_password)?.derive_path(&self.path)?;
        let signing_data = tx.signing_data();

        let mut programs = Vec::with_capacity(addresses.len());
        for address in &addresses {
            let (chain, index) = self
                .find_address(address, limit)
                .ok_or_else(|| WalletError::Sign(format!("cannot sign for {}", address)))?;
            let key = account_key.derive_path(&[chain, index])?.key_pair();
            programs.push(standard_program(&key, &signing_data)?);
        }

        tx.programs = programs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::StandardAccount;
    use crate::config::SubWalletType;
    use crate::core::{AssetId, TransactionBuilder, TxInput, TxOutput};
    use crate::crypto::{address_from_program_hash, program_hash_for_code, verify_signature};

    const PASSWORD: &str = "pay-password";

    fn account() -> Arc<dyn Account> {
        Arc::new(StandardAccount::from_seed(&[5u8; 32], PASSWORD).unwrap())
    }

    fn config(single_address: bool) -> CoinConfig {
        let mut config = CoinConfig::new("ELA", SubWalletType::Mainchain);
        config.single_address = single_address;
        config.min_fee = 1;
        config
    }

    fn external_payment(to: &str, amount: u64, height: u32) -> Transaction {
        TransactionBuilder::new()
            .add_output(to, amount)
            .confirmed_at(height, 0)
            .program(vec![0xac], vec![0x40; 65])
            .build()
    }

    fn assert_signed_by(tx: &Transaction) {
        assert!(tx.is_signed());
        for program in &tx.programs {
            let public_key = secp256k1::PublicKey::from_slice(&program.code[1..34]).unwrap();
            assert!(verify_signature(&public_key, &tx.signing_data(), &program.parameter[1..]).unwrap());
        }
    }

    #[test]
    fn test_single_sub_account_signs_spend() {
        let sub_account = SingleSubAccount::new(account());
        let wallet = Wallet::from_sub_account(&config(true), &sub_account, Vec::new()).unwrap();
        assert!(wallet.is_single_address());

        let address = sub_account.address();
        wallet.insert_transaction(external_payment(&address, 10_000, 1));
        wallet.set_block_height(2);

        let mut tx = wallet
            .create_tx_for_outputs(
                vec![TxOutput::new(&address, 5_000, AssetId::system())],
                1,
                None,
            )
            .unwrap();
        sub_account.sign_transaction(&mut tx, &wallet, PASSWORD).unwrap();

        assert_eq!(tx.programs.len(), 1);
        assert_eq!(
            address_from_program_hash(&program_hash_for_code(&tx.programs[0].code)),
            address
        );
        assert_signed_by(&tx);
        assert!(matches!(
            sub_account.sign_transaction(&mut tx, &wallet, "bad-password"),
            Err(WalletError::WrongPassword)
        ));
        assert!(wallet.insert_transaction(tx));
    }

    #[test]
    fn test_hd_wallet_tracks_gap_and_signs_each_address() {
        let sub_account = HdSubAccount::new(account(), 0, PASSWORD).unwrap();
        let config = config(false);
        let wallet = Wallet::from_sub_account(&config, &sub_account, Vec::new()).unwrap();

        let initial = wallet.all_addresses().len();
        assert_eq!(
            initial,
            (config.gap_limit_external + config.gap_limit_internal) as usize
        );

        let receive = wallet.unused_addresses(2, false);
        wallet.insert_transaction(external_payment(&receive[0], 3_000, 1));
        wallet.insert_transaction(external_payment(&receive[1], 4_000, 1));
        wallet.set_block_height(2);

        // Using the first two addresses pushes the gap forward
        assert_eq!(wallet.all_addresses().len(), initial + 2);
        assert!(wallet.address_is_used(&receive[0]));

        let mut tx = wallet.create_transaction(None, 6_500, &receive[0], "", "").unwrap();
        sub_account.sign_transaction(&mut tx, &wallet, PASSWORD).unwrap();

        assert_eq!(tx.programs.len(), 2);
        assert_signed_by(&tx);
    }

    #[test]
    fn test_hd_refuses_foreign_input() {
        let sub_account = HdSubAccount::new(account(), 1, PASSWORD).unwrap();
        let wallet = Wallet::from_sub_account(&config(false), &sub_account, Vec::new()).unwrap();

        let mut tx = TransactionBuilder::new().add_output("x", 1).build();
        tx.inputs.push(TxInput {
            address: public_key_to_address(&[2u8; 33]),
            ..TxInput::new(Default::default(), 0)
        });

        assert!(matches!(
            sub_account.sign_transaction(&mut tx, &wallet, PASSWORD),
            Err(WalletError::Sign(_))
        ));
    }

    #[test]
    fn test_coin_index_changes_addresses() {
        let first = HdSubAccount::new(account(), 0, PASSWORD).unwrap();
        let second = HdSubAccount::new(account(), 1, PASSWORD).unwrap();
        assert_ne!(first.public_key().unwrap(), second.public_key().unwrap());
        assert!(HdSubAccount::new(account(), 0, "wrong-password").is_err());
    }
}
