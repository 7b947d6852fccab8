//! secp256k1 keys behind standard programs
//!
//! Signatures are 64-byte compact ECDSA over the 32-byte signing digest of
//! a transaction; a program parameter pushes each one with a length byte.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::address::{address_from_program_hash, program_hash_for_code};
use crate::core::script::standard_redeem_script;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Signing digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid derivation: {0}")]
    InvalidDerivation(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Signing key together with its compressed public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret half
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        let (secret_key, public_key) = Secp256k1::new().generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// 33-byte compressed encoding, as it appears in redeem scripts
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Standard single-signature address of this key
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key.serialize())
    }

    /// Compact signature over a transaction's signing digest
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let message = digest_message(digest)?;
        let signature = Secp256k1::signing_only().sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact().to_vec())
    }

    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, digest, signature)
    }
}

/// Standard address of a serialized public key
///
/// Base58Check over `0x21 || hash160(len || pubkey || CHECKSIG)`.
pub fn public_key_to_address(public_key: &[u8]) -> String {
    let code = standard_redeem_script(public_key);
    address_from_program_hash(&program_hash_for_code(&code))
}

pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

fn digest_message(digest: &[u8]) -> Result<Message, KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest(digest.len()));
    }
    Ok(Message::from_digest_slice(digest)?)
}

/// Check a compact signature; a well-formed signature by another key is `Ok(false)`
pub fn verify_signature(
    public_key: &PublicKey,
    digest: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let message = digest_message(digest)?;
    let signature = Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;
    Ok(Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, public_key)
        .is_ok())
}
