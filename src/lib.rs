#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! NFT provenance: verifiable randomness for trait assignment.
//!
//! Each token's randomness is an ECVRF-EDWARDS25519-SHA512-ELL2 output over
//! `collection_id:token_id`. Traits are a pure function of that output and a
//! public catalog. Per-token outputs are batched into a SHA-256 Merkle tree
//! whose root is published in a ledger transaction, and every token ships as
//! a self-contained, issuer-sealed [`ProofBundle`] that anyone can check with
//! [`BundleValidator`].
//!
//! Fixed choices:
//! - VRF: suite 0x04, Elligator-2 hash-to-curve, 80-byte proofs, 64-byte outputs
//! - Traits: SHA-256 per category, full 256-bit index reduction, roll mod 100
//! - Merkle: SHA-256, odd levels duplicate their last node
//! - Anchor: `NFTVRF1 || root` in an OP_RETURN output, 6 confirmations
//! - Seal: Ed25519 over a domain-separated canonical JSON encoding

pub mod types;
pub mod errors;
pub mod field;
pub mod curve;
pub mod hash_to_curve;
pub mod vrf;
pub mod derivation;
pub mod merkle;
pub mod anchor;
pub mod bundle;
pub mod seal;
pub mod config;
pub mod issuer;
pub mod validator;

pub use types::*;
pub use errors::BundleError;
pub use vrf::{proof_to_hash, verify, verify_proof, EcVrfEd25519, Proof, SecretScalar, VrfError, VrfProver, VrfVerifier};
pub use derivation::{derive_traits, verify_traits, Tier, Trait, TraitCatalog, TraitCategory, TraitSet};
pub use merkle::{merkle_leaf, verify_merkle_path, Direction, MerkleProof, MerkleTree, PathStep};
pub use anchor::{Anchor, AnchorVerifier, LedgerError, LedgerQuery, LedgerTransaction, MemoryLedger};
pub use bundle::ProofBundle;
pub use config::{ConfigError, FundingPool, Outpoint, ValidatorConfig};
pub use issuer::{AnchorRequest, IssueError, Issuer, PendingBatch};
pub use validator::{BundleValidator, Rejection, Stage, ValidationState, Verdict};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
