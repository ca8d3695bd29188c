use thiserror::Error;

use crate::{
    anchor::{AnchorError, LedgerError},
    derivation::DerivationError,
    merkle::MerkleError,
    vrf::VrfError,
};

/// Every reason a bundle can be rejected. One variant per failure kind; the
/// pipeline never folds a specific kind into a generic one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("invalid curve point")]
    InvalidCurvePoint,

    #[error("bundle VRF key is not the issuer's published key")]
    VrfKeyMismatch,

    #[error("VRF challenge mismatch")]
    ChallengeMismatch,

    #[error("VRF output mismatch")]
    OutputMismatch,

    #[error("trait mismatch in category {0:?}")]
    TraitMismatch(String),

    #[error("merkle path invalid")]
    MerklePathInvalid,

    #[error("anchor transaction not found")]
    AnchorNotFound,

    #[error("anchor commitment does not match merkle root")]
    AnchorRootMismatch,

    #[error("insufficient confirmations: required {required}, observed {observed}")]
    InsufficientConfirmations { required: u64, observed: u64 },

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("invalid issuer signature")]
    SignatureInvalid,
}

impl From<VrfError> for BundleError {
    fn from(e: VrfError) -> Self {
        match e {
            VrfError::InvalidCurvePoint => Self::InvalidCurvePoint,
            VrfError::ChallengeMismatch => Self::ChallengeMismatch,
            VrfError::OutputMismatch => Self::OutputMismatch,
            VrfError::MalformedProof(what) => Self::MalformedBundle(format!("vrf_proof: {what}")),
            VrfError::InvalidSecretScalar => Self::MalformedBundle("invalid secret scalar".into()),
        }
    }
}

impl From<MerkleError> for BundleError {
    fn from(e: MerkleError) -> Self {
        match e {
            MerkleError::PathInvalid => Self::MerklePathInvalid,
            other => Self::MalformedBundle(other.to_string()),
        }
    }
}

impl From<AnchorError> for BundleError {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::NotFound => Self::AnchorNotFound,
            AnchorError::RootMismatch => Self::AnchorRootMismatch,
            AnchorError::InsufficientConfirmations { required, observed } => {
                Self::InsufficientConfirmations { required, observed }
            }
            AnchorError::Ledger(LedgerError::NotFound) => Self::AnchorNotFound,
            AnchorError::Ledger(other) => Self::LedgerUnavailable(other.to_string()),
            e @ AnchorError::PayloadTooLarge { .. } => Self::MalformedBundle(e.to_string()),
        }
    }
}

impl From<DerivationError> for BundleError {
    fn from(e: DerivationError) -> Self {
        match e {
            DerivationError::Mismatch(category) => Self::TraitMismatch(category),
            other => Self::MalformedBundle(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vrf_kinds_are_preserved() {
        assert_eq!(BundleError::from(VrfError::ChallengeMismatch), BundleError::ChallengeMismatch);
        assert_eq!(BundleError::from(VrfError::OutputMismatch), BundleError::OutputMismatch);
        assert_eq!(BundleError::from(VrfError::InvalidCurvePoint), BundleError::InvalidCurvePoint);
    }

    #[test]
    fn ledger_timeout_is_not_reported_as_missing_anchor() {
        let e = BundleError::from(AnchorError::Ledger(LedgerError::Timeout));
        assert!(matches!(e, BundleError::LedgerUnavailable(_)));
        let e = BundleError::from(AnchorError::Ledger(LedgerError::NotFound));
        assert_eq!(e, BundleError::AnchorNotFound);
    }

    #[test]
    fn trait_mismatch_keeps_category() {
        let e = BundleError::from(DerivationError::Mismatch("eyes".into()));
        assert_eq!(e, BundleError::TraitMismatch("eyes".into()));
        assert_eq!(e.to_string(), "trait mismatch in category \"eyes\"");
    }
}
