//! Cryptographic utilities for the wallet
//!
//! This module provides:
//! - SHA-256 / RIPEMD-160 hashing
//! - ECDSA key management (secp256k1) and BIP32 derivation
//! - Program hashes and Base58Check addresses
//! - Merkle tree calculations

pub mod address;
pub mod hash;
pub mod hd;
pub mod keys;
pub mod merkle;

pub use address::{
    address_from_program_hash, is_valid_address, program_hash_for_code,
    program_hash_from_address, ProgramHash,
};
pub use hash::{double_sha256, hash160, sha256};
pub use hd::{ExtendedPrivateKey, ExtendedPublicKey, HARDENED, SEQUENCE_EXTERNAL_CHAIN, SEQUENCE_INTERNAL_CHAIN};
pub use keys::{
    public_key_from_hex, public_key_to_address, verify_signature, KeyError, KeyPair,
};
pub use merkle::{calculate_merkle_root, Hash256, MerkleExtraction, PartialMerkleTree};
