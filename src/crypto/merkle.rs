//! Merkle tree calculations for SPV proofs
//!
//! Full-tree roots plus the partial merkle tree (hashes + flag bits)
//! that a peer sends inside a merkle block to prove a subset of
//! transactions is included in a block.

use super::hash::double_sha256;

/// 32-byte hash used as a merkle tree node
pub type Hash256 = [u8; 32];

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    double_sha256(&data)
}

/// Calculate the merkle root from a list of leaf hashes
///
/// An odd node at any level is paired with itself.
pub fn calculate_merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return [0u8; 32];
    }

    let mut current_level: Vec<Hash256> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| hash_pair(&chunk[0], chunk.get(1).unwrap_or(&chunk[0])))
            .collect();
    }

    current_level[0]
}

/// Depth of the tree holding `total` leaves
fn tree_depth(total: u32) -> u32 {
    let mut depth = 0;
    while (1u64 << depth) < total as u64 {
        depth += 1;
    }
    depth
}

/// Number of nodes at `height` above the leaves
fn width_at(total: u32, height: u32) -> u32 {
    ((total as u64 + (1u64 << height) - 1) >> height) as u32
}

/// Partial merkle tree as carried by a merkle block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialMerkleTree {
    /// Number of transactions in the full block
    pub total_tx: u32,
    /// Node hashes in depth-first order
    pub hashes: Vec<Hash256>,
    /// Traversal flag bits, least significant bit first
    pub flags: Vec<u8>,
}

/// Result of walking a partial merkle tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleExtraction {
    pub root: Hash256,
    /// Leaves flagged as matched, in tree order
    pub matched: Vec<Hash256>,
    /// Whether every hash and every flag byte was consumed
    pub fully_consumed: bool,
}

struct Walker<'a> {
    tree: &'a PartialMerkleTree,
    depth: u32,
    hash_idx: usize,
    flag_idx: usize,
    matched: Vec<Hash256>,
}

impl Walker<'_> {
    fn next_flag(&mut self) -> Option<bool> {
        let byte = self.tree.flags.get(self.flag_idx / 8)?;
        if self.hash_idx >= self.tree.hashes.len() {
            return None;
        }
        let flag = byte & (1 << (self.flag_idx % 8)) != 0;
        self.flag_idx += 1;
        Some(flag)
    }

    fn walk(&mut self, level: u32) -> Option<Hash256> {
        let flag = self.next_flag()?;

        if !flag || level == self.depth {
            let hash = self.tree.hashes[self.hash_idx];
            self.hash_idx += 1;
            if flag {
                self.matched.push(hash);
            }
            return Some(hash);
        }

        let left = self.walk(level + 1).unwrap_or([0u8; 32]);
        // A missing right branch duplicates the left one
        let right = self.walk(level + 1).unwrap_or(left);
        Some(hash_pair(&left, &right))
    }
}

impl PartialMerkleTree {
    /// Build the partial tree proving the leaves whose `matches` flag is set
    pub fn from_leaves(leaves: &[Hash256], matches: &[bool]) -> Self {
        let total_tx = leaves.len() as u32;
        let mut bits = Vec::new();
        let mut hashes = Vec::new();

        if total_tx > 0 {
            Self::build(
                leaves,
                matches,
                tree_depth(total_tx),
                0,
                &mut bits,
                &mut hashes,
            );
        }

        let mut flags = vec![0u8; (bits.len() + 7) / 8];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                flags[i / 8] |= 1 << (i % 8);
            }
        }

        Self {
            total_tx,
            hashes,
            flags,
        }
    }

    fn node_hash(leaves: &[Hash256], height: u32, pos: u32) -> Hash256 {
        if height == 0 {
            return leaves[pos as usize];
        }
        let left = Self::node_hash(leaves, height - 1, pos * 2);
        let right = if pos * 2 + 1 < width_at(leaves.len() as u32, height - 1) {
            Self::node_hash(leaves, height - 1, pos * 2 + 1)
        } else {
            left
        };
        hash_pair(&left, &right)
    }

    fn build(
        leaves: &[Hash256],
        matches: &[bool],
        height: u32,
        pos: u32,
        bits: &mut Vec<bool>,
        hashes: &mut Vec<Hash256>,
    ) {
        let total = leaves.len() as u32;
        let start = (pos as u64) << height;
        let end = (((pos as u64) + 1) << height).min(total as u64);
        let parent_of_match = (start..end).any(|i| matches.get(i as usize).copied().unwrap_or(false));
        bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            hashes.push(Self::node_hash(leaves, height, pos));
        } else {
            Self::build(leaves, matches, height - 1, pos * 2, bits, hashes);
            if pos * 2 + 1 < width_at(total, height - 1) {
                Self::build(leaves, matches, height - 1, pos * 2 + 1, bits, hashes);
            }
        }
    }

    /// Walk the tree, recomputing the root and collecting matched leaves
    pub fn extract(&self) -> MerkleExtraction {
        let mut walker = Walker {
            tree: self,
            depth: tree_depth(self.total_tx),
            hash_idx: 0,
            flag_idx: 0,
            matched: Vec::new(),
        };

        let root = if self.total_tx == 0 {
            [0u8; 32]
        } else {
            walker.walk(0).unwrap_or([0u8; 32])
        };

        let fully_consumed = walker.hash_idx == self.hashes.len()
            && (walker.flag_idx + 7) / 8 == self.flags.len();

        MerkleExtraction {
            root,
            matched: walker.matched,
            fully_consumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash256 {
        double_sha256(&[n])
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = vec![leaf(1)];
        assert_eq!(calculate_merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = vec![leaf(1), leaf(2)];
        assert_eq!(calculate_merkle_root(&hashes), hash_pair(&leaf(1), &leaf(2)));
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let three = vec![leaf(1), leaf(2), leaf(3)];
        let four = vec![leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(calculate_merkle_root(&three), calculate_merkle_root(&four));
    }

    #[test]
    fn test_partial_tree_recovers_root_and_matches() {
        let leaves: Vec<Hash256> = (0..7).map(leaf).collect();
        let matches = [false, true, false, false, false, true, false];

        let tree = PartialMerkleTree::from_leaves(&leaves, &matches);
        let extraction = tree.extract();

        assert!(extraction.fully_consumed);
        assert_eq!(extraction.root, calculate_merkle_root(&leaves));
        assert_eq!(extraction.matched, vec![leaves[1], leaves[5]]);
    }

    #[test]
    fn test_partial_tree_without_matches() {
        let leaves: Vec<Hash256> = (0..4).map(leaf).collect();
        let tree = PartialMerkleTree::from_leaves(&leaves, &[false; 4]);
        let extraction = tree.extract();

        assert_eq!(tree.hashes.len(), 1);
        assert_eq!(extraction.root, calculate_merkle_root(&leaves));
        assert!(extraction.matched.is_empty());
    }

    #[test]
    fn test_tampered_hash_changes_root() {
        let leaves: Vec<Hash256> = (0..5).map(leaf).collect();
        let mut tree = PartialMerkleTree::from_leaves(&leaves, &[true, false, false, false, true]);
        tree.hashes[0] = leaf(99);
        assert_ne!(tree.extract().root, calculate_merkle_root(&leaves));
    }
}
