//! Fee policy
//!
//! Fees are charged per started kilobyte of serialized transaction.

// =============================================================================
// Constants
// =============================================================================

/// Fee rate used when the configuration does not set one
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;

/// Fee rate the dust floor is defined against
pub const MIN_FEE_PER_KB: u64 = 1_000;

/// Highest fee rate a wallet accepts
pub const MAX_FEE_PER_KB: u64 = 1_000_000;

/// `ceil(size / 1000) * fee_per_kb`
pub fn fee_for_size(size_bytes: usize, fee_per_kb: u64) -> u64 {
    ((size_bytes as u64).saturating_add(999) / 1000).saturating_mul(fee_per_kb)
}

// =============================================================================
// Tests
// =============================================================================
