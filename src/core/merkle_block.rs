//! Merkle blocks
//!
//! A block header plus a partial merkle tree proving which of the
//! block's transactions matched the peer-side filter.

use crate::core::transaction::{put_var_int, TxHash};
use crate::crypto::{double_sha256, Hash256, PartialMerkleTree};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Serialized header size in bytes
pub const BLOCK_HEADER_SIZE: usize = 80;

/// How far a block timestamp may run ahead of the local clock (seconds)
pub const MAX_TIME_DRIFT: u64 = 2 * 60 * 60;

// =============================================================================
// Block Errors
// =============================================================================

/// Merkle block parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Malformed merkle block: {0}")]
    Malformed(String),
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    #[error("Timestamp {0} too far ahead of local time")]
    TimestampTooFarAhead(u32),
}

fn ensure(buf: &[u8], n: usize, what: &str) -> Result<(), BlockError> {
    if buf.remaining() < n {
        return Err(BlockError::Malformed(format!("truncated {}", what)));
    }
    Ok(())
}

fn get_var_int(buf: &mut &[u8]) -> Result<u64, BlockError> {
    ensure(buf, 1, "var int")?;
    let n = match buf.get_u8() {
        0xFD => {
            ensure(buf, 2, "var int")?;
            buf.get_u16_le() as u64
        }
        0xFE => {
            ensure(buf, 4, "var int")?;
            buf.get_u32_le() as u64
        }
        0xFF => {
            ensure(buf, 8, "var int")?;
            buf.get_u64_le()
        }
        n => n as u64,
    };
    Ok(n)
}

fn get_hash(buf: &mut &[u8]) -> Result<Hash256, BlockError> {
    ensure(buf, 32, "hash")?;
    let mut hash = [0u8; 32];
    buf.copy_to_slice(&mut hash);
    Ok(hash)
}

/// Expand a compact `bits` value into a little-endian 256-bit target
///
/// Returns `None` for negative, overflowing or zero targets.
pub fn compact_to_target(bits: u32) -> Option<[u8; 32]> {
    let size = (bits >> 24) as usize;
    let mut mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 || size > 32 {
        return None;
    }

    let mut target = [0u8; 32];
    if size <= 3 {
        mantissa >>= 8 * (3 - size);
        target[..3].copy_from_slice(&mantissa.to_le_bytes()[..3]);
    } else {
        let bytes = mantissa.to_le_bytes();
        for (i, byte) in bytes[..3].iter().enumerate() {
            let pos = size - 3 + i;
            if pos < 32 {
                target[pos] = *byte;
            } else if *byte != 0 {
                return None;
            }
        }
    }

    if target.iter().all(|b| *b == 0) {
        return None;
    }
    Some(target)
}

/// Compare two little-endian 256-bit numbers: `a <= b`
fn le_hash_at_most(a: &Hash256, b: &Hash256) -> bool {
    for i in (0..32).rev() {
        if a[i] != b[i] {
            return a[i] < b[i];
        }
    }
    true
}

// =============================================================================
// Merkle Block
// =============================================================================

/// Header plus partial merkle tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub version: u32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    /// Compact proof-of-work target
    pub target: u32,
    pub nonce: u32,
    pub height: u32,
    pub tree: PartialMerkleTree,
}

impl MerkleBlock {
    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.version);
        buf.put_slice(&self.prev_block);
        buf.put_slice(&self.merkle_root);
        buf.put_u32_le(self.timestamp);
        buf.put_u32_le(self.target);
        buf.put_u32_le(self.nonce);
    }

    /// Block hash: double SHA-256 of the 80-byte header
    pub fn block_hash(&self) -> Hash256 {
        let mut buf = BytesMut::with_capacity(BLOCK_HEADER_SIZE);
        self.write_header(&mut buf);
        double_sha256(&buf)
    }

    /// Parse a merkle block from its wire form
    pub fn decode(data: &[u8]) -> Result<Self, BlockError> {
        let mut buf = data;
        ensure(buf, BLOCK_HEADER_SIZE + 8, "header")?;

        let version = buf.get_u32_le();
        let prev_block = get_hash(&mut buf)?;
        let merkle_root = get_hash(&mut buf)?;
        let timestamp = buf.get_u32_le();
        let target = buf.get_u32_le();
        let nonce = buf.get_u32_le();
        let height = buf.get_u32_le();
        let total_tx = buf.get_u32_le();

        let hash_count = get_var_int(&mut buf)? as usize;
        ensure(buf, hash_count.saturating_mul(32), "hashes")?;
        let hashes = (0..hash_count)
            .map(|_| get_hash(&mut buf))
            .collect::<Result<Vec<_>, _>>()?;

        let flag_len = get_var_int(&mut buf)? as usize;
        ensure(buf, flag_len, "flags")?;
        let flags = buf[..flag_len].to_vec();
        buf.advance(flag_len);

        if buf.has_remaining() {
            return Err(BlockError::Malformed(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }
        if total_tx > 0 && hashes.is_empty() {
            return Err(BlockError::Malformed("no hashes for non-empty block".to_string()));
        }

        Ok(Self {
            version,
            prev_block,
            merkle_root,
            timestamp,
            target,
            nonce,
            height,
            tree: PartialMerkleTree {
                total_tx,
                hashes,
                flags,
            },
        })
    }

    /// Serialize to wire form
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_header(&mut buf);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.tree.total_tx);
        put_var_int(&mut buf, self.tree.hashes.len() as u64);
        for hash in &self.tree.hashes {
            buf.put_slice(hash);
        }
        put_var_int(&mut buf, self.tree.flags.len() as u64);
        buf.put_slice(&self.tree.flags);
        buf.to_vec()
    }

    /// Check merkle proof, timestamp and proof of work
    pub fn validate(&self, now: u64) -> Result<(), BlockError> {
        let extraction = self.tree.extract();
        if !extraction.fully_consumed
            || (self.tree.total_tx > 0 && extraction.root != self.merkle_root)
        {
            return Err(BlockError::InvalidMerkleRoot);
        }

        if self.timestamp as u64 > now + MAX_TIME_DRIFT {
            return Err(BlockError::TimestampTooFarAhead(self.timestamp));
        }

        let target = compact_to_target(self.target).ok_or(BlockError::InvalidProofOfWork)?;
        if !le_hash_at_most(&self.block_hash(), &target) {
            return Err(BlockError::InvalidProofOfWork);
        }

        Ok(())
    }

    pub fn is_valid(&self, now: u64) -> bool {
        self.validate(now).is_ok()
    }

    /// Matched transaction hashes, in tree order
    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.tree.extract().matched.into_iter().map(TxHash).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
