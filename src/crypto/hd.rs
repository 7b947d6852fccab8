//! Hierarchical deterministic keys (BIP32)
//!
//! Child key derivation for the HD address chains. Public derivation
//! lets a wallet grow its address chains without touching private keys.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;

use super::keys::{KeyError, KeyPair};

type HmacSha512 = Hmac<Sha512>;

/// Indices at or above this value derive hardened children
pub const HARDENED: u32 = 0x8000_0000;

/// External (receive) chain index
pub const SEQUENCE_EXTERNAL_CHAIN: u32 = 0;

/// Internal (change) chain index
pub const SEQUENCE_INTERNAL_CHAIN: u32 = 1;

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], KeyError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| KeyError::InvalidDerivation(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn split_tweak(i: &[u8; 64]) -> Result<(Scalar, [u8; 32]), KeyError> {
    let mut il = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    let tweak = Scalar::from_be_bytes(il)
        .map_err(|_| KeyError::InvalidDerivation("tweak out of range".to_string()))?;

    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&i[32..]);
    Ok((tweak, chain_code))
}

/// Extended public key: public key plus chain code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    /// Derive a non-hardened child
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        if index >= HARDENED {
            return Err(KeyError::InvalidDerivation(
                "hardened child from public key".to_string(),
            ));
        }

        let i = hmac_sha512(
            &self.chain_code,
            &[&self.public_key.serialize(), &index.to_be_bytes()],
        )?;
        let (tweak, chain_code) = split_tweak(&i)?;

        let secp = Secp256k1::verification_only();
        let public_key = self.public_key.add_exp_tweak(&secp, &tweak)?;
        Ok(Self {
            public_key,
            chain_code,
        })
    }

    /// Compressed public key of `chain/index` below this key
    pub fn derive_public_key(&self, chain: u32, index: u32) -> Result<Vec<u8>, KeyError> {
        let child = self.derive_child(chain)?.derive_child(index)?;
        Ok(child.public_key.serialize().to_vec())
    }
}

/// Extended private key: secret key plus chain code
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    pub secret_key: SecretKey,
    pub chain_code: [u8; 32],
}

impl ExtendedPrivateKey {
    /// Master key from seed bytes
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let i = hmac_sha512(b"Bitcoin seed", &[seed])?;
        let secret_key =
            SecretKey::from_slice(&i[..32]).map_err(|_| KeyError::InvalidPrivateKey)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        Ok(Self {
            secret_key,
            chain_code,
        })
    }

    /// Derive a child key (hardened when `index >= HARDENED`)
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let i = if index >= HARDENED {
            hmac_sha512(
                &self.chain_code,
                &[&[0u8], &self.secret_key.secret_bytes(), &index.to_be_bytes()],
            )?
        } else {
            let secp = Secp256k1::signing_only();
            let public_key = PublicKey::from_secret_key(&secp, &self.secret_key);
            hmac_sha512(
                &self.chain_code,
                &[&public_key.serialize(), &index.to_be_bytes()],
            )?
        };
        let (tweak, chain_code) = split_tweak(&i)?;

        let secret_key = self.secret_key.add_tweak(&tweak)?;
        Ok(Self {
            secret_key,
            chain_code,
        })
    }

    /// Derive along a path of child indices
    pub fn derive_path(&self, path: &[u32]) -> Result<Self, KeyError> {
        path.iter()
            .try_fold(self.clone(), |key, &index| key.derive_child(index))
    }

    /// Neutered counterpart
    pub fn to_public(&self) -> ExtendedPublicKey {
        let secp = Secp256k1::signing_only();
        ExtendedPublicKey {
            public_key: PublicKey::from_secret_key(&secp, &self.secret_key),
            chain_code: self.chain_code,
        }
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair::from_secret_key(self.secret_key)
    }
}
