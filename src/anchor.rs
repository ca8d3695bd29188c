//! Ledger anchor: the Merkle root published inside an unspendable output.
//!
//! The ledger itself is a collaborator behind [`LedgerQuery`]; this module
//! never performs I/O or retries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::types::{
    BlockHash, MerkleRoot, Txid, DEFAULT_COMMITMENT_PREFIX, DEFAULT_MIN_CONFIRMATIONS, HASH_LEN,
};

/// OP_RETURN opcode: marks an output as provably unspendable.
pub const OP_RETURN: u8 = 0x6a;
/// Largest payload a single direct push can carry.
pub const MAX_DIRECT_PUSH: usize = 75;

/// Where and when a batch root was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub txid: Txid,
    pub block_height: u64,
    pub block_hash: BlockHash,
    pub confirmations: u64,
    /// Advisory only; never used for ordering.
    pub timestamp: u64,
}

/// What the ledger reports about an anchoring transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub confirmations: u64,
    pub commitment_bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction not found")]
    NotFound,
    #[error("ledger query timed out")]
    Timeout,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the ledger, supplied by the caller.
pub trait LedgerQuery {
    /// # Errors
    /// `NotFound` if the ledger has no such transaction; `Timeout` or
    /// `Unavailable` when the ledger could not answer.
    fn fetch_transaction(&self, txid: &Txid) -> Result<LedgerTransaction, LedgerError>;
}

impl<T: LedgerQuery + ?Sized> LedgerQuery for &T {
    fn fetch_transaction(&self, txid: &Txid) -> Result<LedgerTransaction, LedgerError> {
        (**self).fetch_transaction(txid)
    }
}

/// Fixed in-memory ledger, for tests and offline replays of known anchors.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    txs: HashMap<Txid, LedgerTransaction>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, txid: Txid, tx: LedgerTransaction) {
        self.txs.insert(txid, tx);
    }
}

impl LedgerQuery for MemoryLedger {
    fn fetch_transaction(&self, txid: &Txid) -> Result<LedgerTransaction, LedgerError> {
        self.txs.get(txid).cloned().ok_or(LedgerError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    #[error("anchor transaction not found")]
    NotFound,
    #[error("anchor commitment does not match merkle root")]
    RootMismatch,
    #[error("insufficient confirmations: required {required}, observed {observed}")]
    InsufficientConfirmations { required: u64, observed: u64 },
    #[error(transparent)]
    Ledger(LedgerError),
    #[error("commitment payload of {len} bytes exceeds a single push")]
    PayloadTooLarge { len: usize },
}

impl From<LedgerError> for AnchorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound => Self::NotFound,
            other => Self::Ledger(other),
        }
    }
}

/// payload = prefix || root
#[must_use]
pub fn commitment_payload(prefix: &[u8], root: &MerkleRoot) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + HASH_LEN);
    out.extend_from_slice(prefix);
    out.extend_from_slice(&root.0);
    out
}

/// Split a commitment into its root, checking the prefix and length.
///
/// # Errors
/// `RootMismatch` for a wrong prefix or length.
pub fn parse_commitment(prefix: &[u8], bytes: &[u8]) -> Result<MerkleRoot, AnchorError> {
    if bytes.len() != prefix.len() + HASH_LEN {
        return Err(AnchorError::RootMismatch);
    }
    let (head, root) = bytes.split_at(prefix.len());
    if head != prefix {
        return Err(AnchorError::RootMismatch);
    }
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(root);
    Ok(MerkleRoot(out))
}

/// `OP_RETURN <push len> <payload>` for the transaction builder.
///
/// # Errors
/// `PayloadTooLarge` if the payload does not fit a single direct push.
pub fn op_return_script(payload: &[u8]) -> Result<Vec<u8>, AnchorError> {
    let len = u8::try_from(payload.len())
        .ok()
        .filter(|l| usize::from(*l) <= MAX_DIRECT_PUSH)
        .ok_or(AnchorError::PayloadTooLarge { len: payload.len() })?;
    let mut script = Vec::with_capacity(2 + payload.len());
    script.push(OP_RETURN);
    script.push(len);
    script.extend_from_slice(payload);
    Ok(script)
}

/// Checks an [`Anchor`] against the ledger: existence, then commitment, then
/// depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorVerifier {
    commitment_prefix: Vec<u8>,
    min_confirmations: u64,
}

impl Default for AnchorVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_COMMITMENT_PREFIX.to_vec(), DEFAULT_MIN_CONFIRMATIONS)
    }
}

impl AnchorVerifier {
    #[must_use]
    pub fn new(commitment_prefix: Vec<u8>, min_confirmations: u64) -> Self {
        Self { commitment_prefix, min_confirmations }
    }

    #[must_use]
    pub fn commitment_prefix(&self) -> &[u8] {
        &self.commitment_prefix
    }

    #[must_use]
    pub fn min_confirmations(&self) -> u64 {
        self.min_confirmations
    }

    /// # Errors
    /// `NotFound`, `Ledger(Timeout | Unavailable)`, `RootMismatch` or
    /// `InsufficientConfirmations`, in that order of checking.
    pub fn verify(&self, anchor: &Anchor, root: &MerkleRoot, ledger: &impl LedgerQuery) -> Result<(), AnchorError> {
        let tx = ledger.fetch_transaction(&anchor.txid)?;

        let committed = parse_commitment(&self.commitment_prefix, &tx.commitment_bytes)?;
        if !bool::from(committed.0[..].ct_eq(&root.0[..])) {
            return Err(AnchorError::RootMismatch);
        }

        let observed = anchor.confirmations.min(tx.confirmations);
        if observed < self.min_confirmations {
            return Err(AnchorError::InsufficientConfirmations {
                required: self.min_confirmations,
                observed,
            });
        }
        Ok(())
    }
}
