//! Bundle validation as an explicit state machine.
//!
//! ```text
//! Start → ParsedStructure → VrfChecked → TraitsChecked → MerkleChecked
//!       → AnchorChecked → Verified
//! ```
//!
//! Each transition runs one check. The first failure moves to `Rejected`
//! and nothing after it runs; in particular the ledger is only queried once
//! the VRF, traits and Merkle path have all passed.

use std::{borrow::Cow, fmt};

use ed25519_dalek::VerifyingKey;
use thiserror::Error;

use crate::{
    anchor::{AnchorVerifier, LedgerQuery},
    bundle::ProofBundle,
    config::{ConfigError, ValidatorConfig},
    derivation::{verify_traits, TraitCatalog},
    errors::BundleError,
    merkle::merkle_leaf,
    seal::verify_seal,
    types::PublicPoint,
    vrf::{EcVrfEd25519, VrfVerifier},
};

/// The check a transition performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Structure,
    Vrf,
    Traits,
    Merkle,
    Anchor,
    Seal,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Vrf => "vrf",
            Self::Traits => "traits",
            Self::Merkle => "merkle",
            Self::Anchor => "anchor",
            Self::Seal => "seal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected at {at} stage: {reason}")]
pub struct Rejection {
    pub at: Stage,
    pub reason: BundleError,
}

/// Where a bundle is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationState<'a> {
    Start(&'a str),
    ParsedStructure(Cow<'a, ProofBundle>),
    VrfChecked(Cow<'a, ProofBundle>),
    TraitsChecked(Cow<'a, ProofBundle>),
    MerkleChecked(Cow<'a, ProofBundle>),
    AnchorChecked(Cow<'a, ProofBundle>),
    Verified(Cow<'a, ProofBundle>),
    Rejected(Rejection),
}

impl ValidationState<'_> {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified(_) | Self::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Rejected(Rejection),
}

impl Verdict {
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Verified => None,
            Self::Rejected(r) => Some(r),
        }
    }

    /// # Errors
    /// The rejection reason.
    pub fn into_result(self) -> Result<(), BundleError> {
        match self {
            Self::Verified => Ok(()),
            Self::Rejected(r) => Err(r.reason),
        }
    }
}

type Check<L, V> = fn(&BundleValidator<L, V>, &ProofBundle) -> Result<(), BundleError>;

/// Checks bundles against a fixed catalog, issuer keys and ledger view.
/// Holds no per-bundle state; share it by reference across threads.
pub struct BundleValidator<L, V = EcVrfEd25519> {
    catalog: TraitCatalog,
    anchor: AnchorVerifier,
    issuer: VerifyingKey,
    vrf_key: PublicPoint,
    ledger: L,
    vrf: V,
}

impl<L: LedgerQuery> BundleValidator<L> {
    /// # Errors
    /// Any [`ValidatorConfig::validate`] failure.
    pub fn new(config: &ValidatorConfig, ledger: L) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            catalog: config.catalog.clone(),
            anchor: config.anchor_verifier(),
            issuer: config.issuer_verifying_key()?,
            vrf_key: config.vrf_key()?,
            ledger,
            vrf: EcVrfEd25519,
        })
    }
}

impl<L: LedgerQuery, V: VrfVerifier> BundleValidator<L, V> {
    /// Swap in another VRF verifier.
    pub fn with_vrf<W: VrfVerifier>(self, vrf: W) -> BundleValidator<L, W> {
        BundleValidator {
            catalog: self.catalog,
            anchor: self.anchor,
            issuer: self.issuer,
            vrf_key: self.vrf_key,
            ledger: self.ledger,
            vrf,
        }
    }

    #[must_use]
    pub fn validate_json(&self, json: &str) -> Verdict {
        self.run(ValidationState::Start(json))
    }

    /// Run stages 2-6 on an already typed bundle.
    #[must_use]
    pub fn validate_bundle(&self, bundle: &ProofBundle) -> Verdict {
        self.run(ValidationState::ParsedStructure(Cow::Borrowed(bundle)))
    }

    fn run(&self, mut state: ValidationState<'_>) -> Verdict {
        loop {
            state = match state {
                ValidationState::Verified(_) => return Verdict::Verified,
                ValidationState::Rejected(r) => return Verdict::Rejected(r),
                s => self.step(s),
            };
        }
    }

    /// Perform exactly one transition. Terminal states are returned unchanged.
    #[must_use]
    pub fn step<'a>(&self, state: ValidationState<'a>) -> ValidationState<'a> {
        use ValidationState as S;
        match state {
            S::Start(json) => match ProofBundle::from_json(json) {
                Ok(b) => {
                    tracing::debug!(collection_id = %b.collection_id, token_id = %b.token_id, "bundle parsed");
                    S::ParsedStructure(Cow::Owned(b))
                }
                Err(reason) => {
                    tracing::warn!(stage = %Stage::Structure, %reason, "bundle rejected");
                    S::Rejected(Rejection { at: Stage::Structure, reason })
                }
            },
            S::ParsedStructure(b) => self.advance(Stage::Vrf, b, Self::check_vrf, S::VrfChecked),
            S::VrfChecked(b) => self.advance(Stage::Traits, b, Self::check_traits, S::TraitsChecked),
            S::TraitsChecked(b) => self.advance(Stage::Merkle, b, Self::check_merkle, S::MerkleChecked),
            S::MerkleChecked(b) => self.advance(Stage::Anchor, b, Self::check_anchor, S::AnchorChecked),
            S::AnchorChecked(b) => self.advance(Stage::Seal, b, Self::check_seal, S::Verified),
            done @ (S::Verified(_) | S::Rejected(_)) => done,
        }
    }

    fn advance<'a>(
        &self,
        stage: Stage,
        bundle: Cow<'a, ProofBundle>,
        check: Check<L, V>,
        next: fn(Cow<'a, ProofBundle>) -> ValidationState<'a>,
    ) -> ValidationState<'a> {
        match check(self, &bundle) {
            Ok(()) => {
                tracing::debug!(
                    %stage,
                    collection_id = %bundle.collection_id,
                    token_id = %bundle.token_id,
                    "stage passed"
                );
                next(bundle)
            }
            Err(reason) => {
                tracing::warn!(
                    %stage,
                    collection_id = %bundle.collection_id,
                    token_id = %bundle.token_id,
                    %reason,
                    "bundle rejected"
                );
                ValidationState::Rejected(Rejection { at: stage, reason })
            }
        }
    }

    // A valid proof under any other key would let the issuer pick among
    // several β for the same α.
    fn check_vrf(&self, b: &ProofBundle) -> Result<(), BundleError> {
        if b.public_key != self.vrf_key {
            return Err(BundleError::VrfKeyMismatch);
        }
        self.vrf.verify(&b.public_key, &b.alpha(), &b.vrf_output, &b.vrf_proof)?;
        Ok(())
    }

    fn check_traits(&self, b: &ProofBundle) -> Result<(), BundleError> {
        verify_traits(&b.vrf_output, &self.catalog, &b.traits)?;
        Ok(())
    }

    fn check_merkle(&self, b: &ProofBundle) -> Result<(), BundleError> {
        if merkle_leaf(&b.vrf_output, &b.alpha()) != b.merkle_proof.leaf {
            return Err(BundleError::MerklePathInvalid);
        }
        b.merkle_proof.verify()?;
        Ok(())
    }

    fn check_anchor(&self, b: &ProofBundle) -> Result<(), BundleError> {
        self.anchor.verify(&b.anchor, &b.merkle_proof.root, &self.ledger)?;
        Ok(())
    }

    fn check_seal(&self, b: &ProofBundle) -> Result<(), BundleError> {
        verify_seal(&self.issuer, b)
    }
}

#[cfg(not(feature = "parallel"))]
impl<L: LedgerQuery, V: VrfVerifier> BundleValidator<L, V> {
    /// Validate independent bundles; verdicts are in input order.
    #[must_use]
    pub fn validate_many(&self, bundles: &[ProofBundle]) -> Vec<Verdict> {
        bundles.iter().map(|b| self.validate_bundle(b)).collect()
    }
}

#[cfg(feature = "parallel")]
impl<L: LedgerQuery + Sync, V: VrfVerifier + Sync> BundleValidator<L, V> {
    /// Validate independent bundles; verdicts are in input order.
    #[must_use]
    pub fn validate_many(&self, bundles: &[ProofBundle]) -> Vec<Verdict> {
        use rayon::prelude::*;
        bundles.par_iter().map(|b| self.validate_bundle(b)).collect()
    }
}
