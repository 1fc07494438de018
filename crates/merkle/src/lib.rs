//! Tamper-evidence over the event log: canonical hashing, Merkle tree
//! construction, inclusion proofs, and verification.

pub mod canonical;
pub mod tree;

pub use canonical::canonical_json;
pub use tree::{MerkleTree, Proof, compute_root, leaf_hash, verify};
