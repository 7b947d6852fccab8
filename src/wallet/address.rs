//! Address sources
//!
//! Where a wallet's receive and change addresses come from. A single-address
//! wallet always answers with the same address; an HD wallet grows two BIP32
//! chains so that a gap limit of unused addresses is always available.

use crate::crypto::{
    public_key_to_address, ExtendedPublicKey, SEQUENCE_EXTERNAL_CHAIN, SEQUENCE_INTERNAL_CHAIN,
};
use std::collections::HashSet;

/// Capability every wallet variant provides for address bookkeeping
pub trait AddressSource: Send {
    /// The first `gap_limit` addresses after the last used one on a chain,
    /// generating new addresses as needed
    fn unused_addresses(&mut self, gap_limit: u32, internal: bool, used: &HashSet<String>) -> Vec<String>;

    /// Every address this source has handed out
    fn all_addresses(&self) -> Vec<String>;

    fn contains_address(&self, address: &str) -> bool;

    fn is_single_address(&self) -> bool {
        false
    }
}

// =============================================================================
// Single Address
// =============================================================================

/// One fixed address for receiving and change
#[derive(Debug, Clone)]
pub struct SingleAddress {
    address: String,
}

impl SingleAddress {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

impl AddressSource for SingleAddress {
    fn unused_addresses(&mut self, gap_limit: u32, _internal: bool, _used: &HashSet<String>) -> Vec<String> {
        if gap_limit == 0 {
            return Vec::new();
        }
        vec![self.address.clone()]
    }

    fn all_addresses(&self) -> Vec<String> {
        vec![self.address.clone()]
    }

    fn contains_address(&self, address: &str) -> bool {
        self.address == address
    }

    fn is_single_address(&self) -> bool {
        true
    }
}

// =============================================================================
// HD Address Chain
// =============================================================================

/// External and internal BIP32 chains below an account key
#[derive(Debug, Clone)]
pub struct HdAddressChain {
    account_key: ExtendedPublicKey,
    external: Vec<String>,
    internal: Vec<String>,
    all: HashSet<String>,
}

impl HdAddressChain {
    pub fn new(account_key: ExtendedPublicKey) -> Self {
        Self {
            account_key,
            external: Vec::new(),
            internal: Vec::new(),
            all: HashSet::new(),
        }
    }

    /// Derive addresses until the chain holds at least `count`
    pub fn extend_to(&mut self, internal: bool, count: usize) {
        let chain_index = if internal {
            SEQUENCE_INTERNAL_CHAIN
        } else {
            SEQUENCE_EXTERNAL_CHAIN
        };

        loop {
            let chain = if internal { &self.internal } else { &self.external };
            if chain.len() >= count {
                break;
            }
            let index = chain.len() as u32;

            let address = match self.account_key.derive_public_key(chain_index, index) {
                Ok(public_key) => public_key_to_address(&public_key),
                Err(e) => {
                    log::error!("Address derivation failed at {}/{}: {}", chain_index, index, e);
                    break;
                }
            };

            self.all.insert(address.clone());
            if internal {
                self.internal.push(address);
            } else {
                self.external.push(address);
            }
        }
    }

    /// Chain and index of an address handed out by this source
    pub fn position_of(&self, address: &str) -> Option<(u32, u32)> {
        if let Some(i) = self.external.iter().position(|a| a == address) {
            return Some((SEQUENCE_EXTERNAL_CHAIN, i as u32));
        }
        self.internal
            .iter()
            .position(|a| a == address)
            .map(|i| (SEQUENCE_INTERNAL_CHAIN, i as u32))
    }

    pub fn external_len(&self) -> usize {
        self.external.len()
    }

    pub fn internal_len(&self) -> usize {
        self.internal.len()
    }
}

impl AddressSource for HdAddressChain {
    fn unused_addresses(&mut self, gap_limit: u32, internal: bool, used: &HashSet<String>) -> Vec<String> {
        let chain = if internal { &self.internal } else { &self.external };

        // Index just past the last used address
        let mut start = chain.len();
        while start > 0 && !used.contains(&chain[start - 1]) {
            start -= 1;
        }

        let end = start + gap_limit as usize;
        self.extend_to(internal, end);

        let chain = if internal { &self.internal } else { &self.external };
        chain[start.min(chain.len())..end.min(chain.len())].to_vec()
    }

    fn all_addresses(&self) -> Vec<String> {
        self.external
            .iter()
            .chain(self.internal.iter())
            .cloned()
            .collect()
    }

    fn contains_address(&self, address: &str) -> bool {
        self.all.contains(address)
    }
}
