//! Program hashes and Base58Check addresses
//!
//! A program hash is a one-byte prefix followed by RIPEMD160(SHA256(code)),
//! where the prefix is chosen from the final opcode of the redeem script.

use super::hash::{double_sha256, hash160};
use super::keys::KeyError;
use crate::core::script::{OP_CROSSCHAIN, OP_MULTISIG};

/// Length of a program hash in bytes
pub const PROGRAM_HASH_LEN: usize = 21;

/// Prefix for single-signature (CHECKSIG) programs
pub const PREFIX_STANDARD: u8 = 0x21;

/// Prefix for multi-signature programs
pub const PREFIX_MULTISIG: u8 = 0x12;

/// Prefix for cross-chain programs
pub const PREFIX_CROSSCHAIN: u8 = 0x4B;

/// A 21-byte program hash
pub type ProgramHash = [u8; PROGRAM_HASH_LEN];

/// Hash a redeem script into its program hash
pub fn program_hash_for_code(code: &[u8]) -> ProgramHash {
    let prefix = match code.last() {
        Some(&OP_MULTISIG) => PREFIX_MULTISIG,
        Some(&OP_CROSSCHAIN) => PREFIX_CROSSCHAIN,
        _ => PREFIX_STANDARD,
    };

    let mut program_hash = [0u8; PROGRAM_HASH_LEN];
    program_hash[0] = prefix;
    program_hash[1..].copy_from_slice(&hash160(code));
    program_hash
}

/// Base58Check-encode a program hash
pub fn address_from_program_hash(program_hash: &ProgramHash) -> String {
    let mut address_bytes = program_hash.to_vec();
    let checksum = double_sha256(&address_bytes);
    address_bytes.extend_from_slice(&checksum[..4]);
    bs58::encode(address_bytes).into_string()
}

/// Decode an address back to its program hash, validating the checksum
pub fn program_hash_from_address(address: &str) -> Result<ProgramHash, KeyError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| KeyError::InvalidAddress(format!("{}: {}", address, e)))?;

    if bytes.len() != PROGRAM_HASH_LEN + 4 {
        return Err(KeyError::InvalidAddress(format!(
            "{}: unexpected length {}",
            address,
            bytes.len()
        )));
    }

    let (payload, checksum) = bytes.split_at(PROGRAM_HASH_LEN);
    if double_sha256(payload)[..4] != *checksum {
        return Err(KeyError::InvalidAddress(format!("{}: bad checksum", address)));
    }

    let mut program_hash = [0u8; PROGRAM_HASH_LEN];
    program_hash.copy_from_slice(payload);
    Ok(program_hash)
}

/// Check that a string is a well-formed address
pub fn is_valid_address(address: &str) -> bool {
    program_hash_from_address(address).is_ok()
}
