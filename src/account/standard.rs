//! Password-guarded root key

use super::Account;
use crate::crypto::{sha256, ExtendedPrivateKey, KeyPair};
use crate::wallet::WalletError;

/// Shortest accepted pay password
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted pay password
pub const MAX_PASSWORD_LEN: usize = 128;

fn check_password_format(pay_password: &str) -> Result<(), WalletError> {
    let len = pay_password.len();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(WalletError::InvalidArgument(format!(
            "pay password must be {} to {} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Master key released only against the pay password
pub struct StandardAccount {
    master: ExtendedPrivateKey,
    password_digest: Vec<u8>,
}

impl StandardAccount {
    /// Account rooted at the BIP32 master key of `seed`
    pub fn from_seed(seed: &[u8], pay_password: &str) -> Result<Self, WalletError> {
        check_password_format(pay_password)?;
        Ok(Self {
            master: ExtendedPrivateKey::from_seed(seed)?,
            password_digest: sha256(pay_password.as_bytes()),
        })
    }

    /// Account with a fresh random seed
    pub fn generate(pay_password: &str) -> Result<Self, WalletError> {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(&seed, pay_password)
    }

    fn check_password(&self, pay_password: &str) -> Result<(), WalletError> {
        if sha256(pay_password.as_bytes()) != self.password_digest {
            return Err(WalletError::WrongPassword);
        }
        Ok(())
    }

    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<(), WalletError> {
        self.check_password(old_password)?;
        check_password_format(new_password)?;
        self.password_digest = sha256(new_password.as_bytes());
        Ok(())
    }
}

impl Account for StandardAccount {
    fn derive_key(&self, pay_password: &str) -> Result<KeyPair, WalletError> {
        self.check_password(pay_password)?;
        Ok(self.master.key_pair())
    }

    fn derive_master(&self, pay_password: &str) -> Result<ExtendedPrivateKey, WalletError> {
        self.check_password(pay_password)?;
        Ok(self.master.clone())
    }

    fn public_key(&self) -> Vec<u8> {
        self.master.to_public().public_key.serialize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "s3cret-pass";

    #[test]
    fn test_password_guards_key() {
        let account = StandardAccount::from_seed(&[9u8; 32], PASSWORD).unwrap();

        let key = account.derive_key(PASSWORD).unwrap();
        assert_eq!(key.public_key_bytes(), account.public_key());
        assert!(matches!(
            account.derive_key("wrong-password"),
            Err(WalletError::WrongPassword)
        ));
    }

    #[test]
    fn test_password_format() {
        assert!(StandardAccount::from_seed(&[9u8; 32], "short").is_err());
        assert!(StandardAccount::generate(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }

    #[test]
    fn test_change_password() {
        let mut account = StandardAccount::generate(PASSWORD).unwrap();
        assert!(account.change_password("not-the-password", "another-pass").is_err());

        account.change_password(PASSWORD, "another-pass").unwrap();
        assert!(account.derive_key(PASSWORD).is_err());
        assert!(account.derive_master("another-pass").is_ok());
    }
}
