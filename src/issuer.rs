//! Issuing side: prove and derive per token, join into a Merkle batch, then
//! seal bundles once the root is anchored.

use std::{collections::HashSet, fmt};

use ed25519_dalek::{SigningKey, VerifyingKey};
use thiserror::Error;

use crate::{
    anchor::{commitment_payload, op_return_script, Anchor, AnchorError},
    bundle::ProofBundle,
    config::{FundingPool, Outpoint},
    derivation::{derive_traits, DerivationError, TraitCatalog, TraitSet},
    errors::BundleError,
    merkle::{merkle_leaf, MerkleError, MerkleTree},
    seal::seal_bundle,
    types::{
        build_alpha, Hash256, MerkleRoot, PublicPoint, SealSignature, VrfOutput, ALPHA_SEPARATOR,
        DEFAULT_COMMITMENT_PREFIX, DUST_LIMIT,
    },
    vrf::{Proof, SecretScalar, VrfError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("batch has no tokens")]
    EmptyBatch,
    #[error("token id {0:?} appears more than once in the batch")]
    DuplicateToken(String),
    #[error("collection id {0:?} must not contain ':'")]
    InvalidCollectionId(String),
    #[error("no funding pool configured")]
    NoFundingPool,
    #[error("no funding outpoint covers {required}, largest is {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error(transparent)]
    Vrf(#[from] VrfError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Holder of the VRF secret and the seal key.
pub struct Issuer {
    vrf: SecretScalar,
    seal: SigningKey,
    catalog: TraitCatalog,
    commitment_prefix: Vec<u8>,
    funding_pool: Option<FundingPool>,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("public_point", &self.vrf.public_point())
            .field("seal_key", &hex::encode(self.seal.verifying_key().as_bytes()))
            .field("categories", &self.catalog.len())
            .field("funding_outpoints", &self.funding_pool.as_ref().map_or(0, |p| p.outpoints().len()))
            .finish_non_exhaustive()
    }
}

/// Per-token result, ready to be placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token_id: String,
    pub vrf_output: VrfOutput,
    pub vrf_proof: Proof,
    pub traits: TraitSet,
    pub leaf: Hash256,
}

impl Issuer {
    /// # Errors
    /// `Derivation` if the catalog is not well formed.
    pub fn new(vrf: SecretScalar, seal: SigningKey, catalog: TraitCatalog) -> Result<Self, IssueError> {
        catalog.validate()?;
        Ok(Self {
            vrf,
            seal,
            catalog,
            commitment_prefix: DEFAULT_COMMITMENT_PREFIX.to_vec(),
            funding_pool: None,
        })
    }

    #[must_use]
    pub fn with_commitment_prefix(mut self, prefix: Vec<u8>) -> Self {
        self.commitment_prefix = prefix;
        self
    }

    /// Outputs that pay for anchoring. Fixed for the issuer's lifetime.
    #[must_use]
    pub fn with_funding_pool(mut self, pool: FundingPool) -> Self {
        self.funding_pool = Some(pool);
        self
    }

    #[must_use]
    pub fn public_point(&self) -> PublicPoint {
        self.vrf.public_point()
    }

    #[must_use]
    pub fn seal_key(&self) -> VerifyingKey {
        self.seal.verifying_key()
    }

    #[must_use]
    pub fn catalog(&self) -> &TraitCatalog {
        &self.catalog
    }

    /// Prove and derive a single token.
    ///
    /// # Errors
    /// `Vrf` if α hashes to an exceptional point.
    pub fn issue_token(&self, collection_id: &str, token_id: &str) -> Result<IssuedToken, IssueError> {
        let alpha = build_alpha(collection_id, token_id);
        let (vrf_output, vrf_proof) = self.vrf.prove(&alpha)?;
        let traits = derive_traits(&vrf_output, &self.catalog)?;
        Ok(IssuedToken {
            token_id: token_id.to_owned(),
            leaf: merkle_leaf(&vrf_output, &alpha),
            vrf_output,
            vrf_proof,
            traits,
        })
    }

    /// Issue every token independently, then build the batch tree.
    ///
    /// # Errors
    /// `EmptyBatch`, `DuplicateToken`, `InvalidCollectionId`, or the first
    /// per-token failure.
    pub fn prepare_batch<S>(&self, collection_id: &str, token_ids: &[S]) -> Result<PendingBatch<'_>, IssueError>
    where
        S: AsRef<str> + Sync,
    {
        if token_ids.is_empty() {
            return Err(IssueError::EmptyBatch);
        }
        if collection_id.as_bytes().contains(&ALPHA_SEPARATOR) {
            return Err(IssueError::InvalidCollectionId(collection_id.to_owned()));
        }
        let mut seen = HashSet::with_capacity(token_ids.len());
        for t in token_ids {
            if !seen.insert(t.as_ref()) {
                return Err(IssueError::DuplicateToken(t.as_ref().to_owned()));
            }
        }

        let entries = self.issue_all(collection_id, token_ids)?;
        let tree = MerkleTree::from_leaves(entries.iter().map(|e| e.leaf).collect())?;
        let root = tree.root();
        tracing::info!(collection_id, tokens = entries.len(), root = %hex::encode(root.0), "batch prepared");

        Ok(PendingBatch {
            issuer: self,
            collection_id: collection_id.to_owned(),
            commitment_payload: commitment_payload(&self.commitment_prefix, &root),
            entries,
            tree,
        })
    }

    #[cfg(feature = "parallel")]
    fn issue_all<S: AsRef<str> + Sync>(&self, collection_id: &str, token_ids: &[S]) -> Result<Vec<IssuedToken>, IssueError> {
        use rayon::prelude::*;
        token_ids.par_iter().map(|t| self.issue_token(collection_id, t.as_ref())).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn issue_all<S: AsRef<str>>(&self, collection_id: &str, token_ids: &[S]) -> Result<Vec<IssuedToken>, IssueError> {
        token_ids.iter().map(|t| self.issue_token(collection_id, t.as_ref())).collect()
    }
}

/// Inputs for the collaborator that builds and broadcasts the anchoring
/// transaction: spend `funding`, emit `script` and return `change`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorRequest {
    pub funding: Outpoint,
    pub script: Vec<u8>,
    pub change: u64,
}

/// A batch whose root still has to be published.
#[derive(Debug)]
pub struct PendingBatch<'a> {
    issuer: &'a Issuer,
    collection_id: String,
    commitment_payload: Vec<u8>,
    entries: Vec<IssuedToken>,
    tree: MerkleTree,
}

impl PendingBatch<'_> {
    #[must_use]
    pub fn root(&self) -> MerkleRoot {
        self.tree.root()
    }

    /// Bytes to publish on the ledger: prefix || root.
    #[must_use]
    pub fn commitment_payload(&self) -> &[u8] {
        &self.commitment_payload
    }

    /// # Errors
    /// `Anchor` if the configured prefix is too long for one push.
    pub fn op_return_script(&self) -> Result<Vec<u8>, IssueError> {
        Ok(op_return_script(&self.commitment_payload)?)
    }

    /// Pick the smallest pool outpoint that pays `fee` and still leaves
    /// change above the dust limit.
    ///
    /// # Errors
    /// `NoFundingPool`, `InsufficientFunds`, or `Anchor` for an oversized
    /// commitment.
    pub fn anchor_request(&self, fee: u64) -> Result<AnchorRequest, IssueError> {
        let pool = self.issuer.funding_pool.as_ref().ok_or(IssueError::NoFundingPool)?;
        let required = fee.saturating_add(DUST_LIMIT);
        let funding = *pool
            .select(required)
            .ok_or_else(|| IssueError::InsufficientFunds { required, available: pool.largest() })?;
        let script = self.op_return_script()?;
        tracing::info!(
            collection_id = %self.collection_id,
            funding_txid = %hex::encode(funding.txid),
            vout = funding.vout,
            fee,
            "anchor funding selected"
        );
        Ok(AnchorRequest { funding, script, change: funding.value - fee })
    }

    #[must_use]
    pub fn entries(&self) -> &[IssuedToken] {
        &self.entries
    }

    #[must_use]
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Attach the anchor and each token's Merkle proof, then sign.
    ///
    /// # Errors
    /// `Merkle` or `Bundle` on internal encoding failures.
    pub fn seal(self, anchor: Anchor) -> Result<Vec<ProofBundle>, IssueError> {
        let public_key = self.issuer.public_point();
        let bundles = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| -> Result<ProofBundle, IssueError> {
                let mut bundle = ProofBundle {
                    collection_id: self.collection_id.clone(),
                    token_id: e.token_id,
                    vrf_output: e.vrf_output,
                    vrf_proof: e.vrf_proof,
                    traits: e.traits,
                    public_key,
                    merkle_proof: self.tree.proof(i)?,
                    anchor,
                    signature: SealSignature([0u8; 64]),
                };
                bundle.signature = seal_bundle(&self.issuer.seal, &bundle)?;
                Ok(bundle)
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            collection_id = %self.collection_id,
            tokens = bundles.len(),
            txid = %hex::encode(anchor.txid.0),
            "batch sealed"
        );
        Ok(bundles)
    }
}
