//! Content-addressed hash tree over the ordered event log.
//!
//! Leaves are SHA-256 digests of each event's canonical form, in log order.
//! Levels pair adjacent hashes; an odd tail is paired with itself. The root
//! of an empty log is the empty string.

use fieldbook_domain::FormSubmission;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;

/// SHA-256 hex digest of an event's canonical form.
pub fn leaf_hash(event: &FormSubmission) -> String {
    hex::encode(Sha256::digest(canonical_json(event).as_bytes()))
}

fn node_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Root of the tree over `events`, or `""` for an empty log.
pub fn compute_root(events: &[FormSubmission]) -> String {
    MerkleTree::from_events(events).root_hex()
}

/// Inclusion proof: the sibling hashes along the path from a leaf to the
/// root, bottom-up. `leaf_index` anchors the left/right folding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub leaf_index: usize,
    pub siblings: Vec<String>,
}

impl Proof {
    pub fn empty() -> Self {
        Self {
            leaf_index: 0,
            siblings: Vec::new(),
        }
    }
}

/// Recompute the leaf for `event`, fold it with the proof's siblings, and
/// compare against `expected_root`.
pub fn verify(event: &FormSubmission, proof: &Proof, expected_root: &str) -> bool {
    if expected_root.is_empty() {
        return false;
    }
    let mut hash = leaf_hash(event);
    let mut index = proof.leaf_index;
    for sibling in &proof.siblings {
        hash = if index % 2 == 0 {
            node_hash(&hash, sibling)
        } else {
            node_hash(sibling, &hash)
        };
        index /= 2;
    }
    hash == expected_root
}

/// The full tree, kept level by level so proofs fall out of a lookup.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves; the last level holds the single root.
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    pub fn from_events(events: &[FormSubmission]) -> Self {
        let leaves: Vec<String> = events.iter().map(leaf_hash).collect();
        Self::from_leaves(leaves)
    }

    fn from_leaves(leaves: Vec<String>) -> Self {
        if leaves.is_empty() {
            return Self::default();
        }

        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().expect("non-empty levels");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                next.push(node_hash(left, right));
            }
            levels.push(next);
        }
        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Hex root, or `""` for an empty tree.
    pub fn root_hex(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_default()
    }

    /// Proof for `event`. Empty for a single-event tree or when the event is
    /// not in the tree (verification then fails against any multi-leaf root).
    pub fn proof_for(&self, event: &FormSubmission) -> Proof {
        let target = leaf_hash(event);
        let Some(leaf_index) = self
            .levels
            .first()
            .and_then(|leaves| leaves.iter().position(|leaf| *leaf == target))
        else {
            return Proof::empty();
        };

        let mut siblings = Vec::new();
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let sibling_index = index ^ 1;
            // An odd tail is its own sibling.
            let sibling = level.get(sibling_index).unwrap_or(&level[index]);
            siblings.push(sibling.clone());
            index /= 2;
        }

        Proof {
            leaf_index,
            siblings,
        }
    }
}
