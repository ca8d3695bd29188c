//! Configuration injected at construction and immutable afterwards.
//!
//! Validator side:
//!
//! ```json
//! {
//!   "min_confirmations": 6,
//!   "commitment_prefix": "4e465456524631",
//!   "issuer_key": "<64 hex chars>",
//!   "vrf_public_key": "<64 hex chars>",
//!   "catalog": [{ "name": "eyes", "values": ["round", "laser"] }]
//! }
//! ```
//!
//! Issuing side, the fixed pool of outputs that pays for anchoring:
//!
//! ```json
//! [{ "txid": "<64 hex chars>", "vout": 0, "value": 10000 }]
//! ```

use std::{collections::BTreeSet, io::Read};

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    anchor::{AnchorVerifier, MAX_DIRECT_PUSH},
    derivation::{DerivationError, TraitCatalog},
    curve::decode_public_key,
    seal::decode_issuer_key,
    types::{Hash256, PublicPoint, DEFAULT_COMMITMENT_PREFIX, DEFAULT_MIN_CONFIRMATIONS, DUST_LIMIT, HASH_LEN},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("commitment prefix must be 1..={max} bytes, got {len}")]
    CommitmentPrefix { len: usize, max: usize },
    #[error("issuer key is not a valid Ed25519 public key")]
    InvalidIssuerKey,
    #[error("VRF public key is not a valid edwards25519 point of large order")]
    InvalidVrfKey,
    #[error(transparent)]
    Catalog(#[from] DerivationError),
    #[error("funding pool is empty")]
    EmptyFundingPool,
    #[error("funding outpoint {index} holds {value}, below the dust limit")]
    DustOutpoint { index: usize, value: u64 },
    #[error("funding outpoint {index} is listed twice")]
    DuplicateOutpoint { index: usize },
}

/// A spendable output reserved for paying anchoring fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Outpoint {
    #[serde(with = "hex::serde")]
    pub txid: Hash256,
    pub vout: u32,
    pub value: u64,
}

/// Fixed set of funding outpoints. Every outpoint is at or above the dust
/// limit and appears once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Outpoint>", into = "Vec<Outpoint>")]
pub struct FundingPool {
    outpoints: Vec<Outpoint>,
}

impl FundingPool {
    /// # Errors
    /// `EmptyFundingPool`, `DustOutpoint` or `DuplicateOutpoint`.
    pub fn new(outpoints: Vec<Outpoint>) -> Result<Self, ConfigError> {
        if outpoints.is_empty() {
            return Err(ConfigError::EmptyFundingPool);
        }
        let mut seen = BTreeSet::new();
        for (index, o) in outpoints.iter().enumerate() {
            if o.value < DUST_LIMIT {
                return Err(ConfigError::DustOutpoint { index, value: o.value });
            }
            if !seen.insert((o.txid, o.vout)) {
                return Err(ConfigError::DuplicateOutpoint { index });
            }
        }
        Ok(Self { outpoints })
    }

    #[must_use]
    pub fn outpoints(&self) -> &[Outpoint] {
        &self.outpoints
    }

    #[must_use]
    pub fn total_value(&self) -> u64 {
        self.outpoints.iter().map(|o| o.value).fold(0, u64::saturating_add)
    }

    /// Smallest outpoint that covers `amount`.
    #[must_use]
    pub fn select(&self, amount: u64) -> Option<&Outpoint> {
        self.outpoints.iter().filter(|o| o.value >= amount).min_by_key(|o| o.value)
    }

    #[must_use]
    pub fn largest(&self) -> u64 {
        self.outpoints.iter().map(|o| o.value).max().unwrap_or(0)
    }

    /// # Errors
    /// Parse errors or any [`FundingPool::new`] failure.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let outpoints: Vec<Outpoint> = serde_json::from_str(s)?;
        Self::new(outpoints)
    }
}

impl TryFrom<Vec<Outpoint>> for FundingPool {
    type Error = ConfigError;
    fn try_from(v: Vec<Outpoint>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<FundingPool> for Vec<Outpoint> {
    fn from(p: FundingPool) -> Self {
        p.outpoints
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    pub min_confirmations: u64,
    #[serde(with = "hex::serde")]
    pub commitment_prefix: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub issuer_key: [u8; 32],
    /// The issuer's published VRF key. Every bundle must carry exactly this key.
    #[serde(with = "hex::serde")]
    pub vrf_public_key: [u8; 32],
    pub catalog: TraitCatalog,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            commitment_prefix: DEFAULT_COMMITMENT_PREFIX.to_vec(),
            issuer_key: [0u8; 32],
            vrf_public_key: [0u8; 32],
            catalog: TraitCatalog::default(),
        }
    }
}

impl ValidatorConfig {
    /// Parse and validate.
    ///
    /// # Errors
    /// Parse errors or any [`ValidatorConfig::validate`] failure.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// As [`ValidatorConfig::from_json_str`], plus I/O errors.
    pub fn from_reader(mut r: impl Read) -> Result<Self, ConfigError> {
        let mut s = String::new();
        r.read_to_string(&mut s)?;
        Self::from_json_str(&s)
    }

    /// The prefix plus root must fit one direct push; both issuer keys must
    /// decode; the catalog must be well formed.
    ///
    /// # Errors
    /// The first failed check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = MAX_DIRECT_PUSH - HASH_LEN;
        if self.commitment_prefix.is_empty() || self.commitment_prefix.len() > max {
            return Err(ConfigError::CommitmentPrefix { len: self.commitment_prefix.len(), max });
        }
        self.issuer_verifying_key()?;
        self.vrf_key()?;
        self.catalog.validate()?;
        Ok(())
    }

    /// # Errors
    /// `InvalidVrfKey` for a non-decodable or small-order point.
    pub fn vrf_key(&self) -> Result<PublicPoint, ConfigError> {
        let key = PublicPoint(self.vrf_public_key);
        decode_public_key(&key).map_err(|_| ConfigError::InvalidVrfKey)?;
        Ok(key)
    }

    /// # Errors
    /// `InvalidIssuerKey` for a non-decodable or weak key.
    pub fn issuer_verifying_key(&self) -> Result<VerifyingKey, ConfigError> {
        decode_issuer_key(&self.issuer_key).map_err(|_| ConfigError::InvalidIssuerKey)
    }

    #[must_use]
    pub fn anchor_verifier(&self) -> AnchorVerifier {
        AnchorVerifier::new(self.commitment_prefix.clone(), self.min_confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vrf::SecretScalar;
    use ed25519_dalek::SigningKey;

    fn issuer_hex() -> String {
        hex::encode(SigningKey::from_bytes(&[5u8; 32]).verifying_key().to_bytes())
    }

    fn vrf_hex() -> String {
        hex::encode(SecretScalar::from_seed(&[6u8; 32]).unwrap().public_point().0)
    }

    fn keys() -> String {
        format!(r#""issuer_key":"{}","vrf_public_key":"{}""#, issuer_hex(), vrf_hex())
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let json = format!(r#"{{{},"catalog":[{{"name":"eyes","values":["a","b"]}}]}}"#, keys());
        let cfg = ValidatorConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.min_confirmations, 6);
        assert_eq!(cfg.commitment_prefix, b"NFTVRF1".to_vec());
        assert_eq!(hex::encode(cfg.vrf_key().unwrap().0), vrf_hex());
        assert_eq!(cfg.anchor_verifier().min_confirmations(), 6);
    }

    #[test]
    fn from_reader_matches_from_str() {
        let json = format!(
            r#"{{"min_confirmations":3,"commitment_prefix":"414243",{},"catalog":[{{"name":"c","values":["x"]}}]}}"#,
            keys()
        );
        let cfg = ValidatorConfig::from_reader(json.as_bytes()).unwrap();
        assert_eq!(cfg.commitment_prefix, b"ABC".to_vec());
        assert_eq!(cfg.min_confirmations, 3);
        assert_eq!(cfg, ValidatorConfig::from_json_str(&json).unwrap());
    }

    #[test]
    fn invalid_configs_rejected() {
        let keys = keys();
        // default keys are small-order points
        assert!(matches!(
            ValidatorConfig::from_json_str(r#"{"catalog":[{"name":"c","values":["x"]}]}"#),
            Err(ConfigError::InvalidIssuerKey)
        ));
        assert!(matches!(
            ValidatorConfig::from_json_str(&format!(
                r#"{{"issuer_key":"{}","catalog":[{{"name":"c","values":["x"]}}]}}"#,
                issuer_hex()
            )),
            Err(ConfigError::InvalidVrfKey)
        ));
        assert!(matches!(
            ValidatorConfig::from_json_str(&format!(r#"{{{keys}}}"#)),
            Err(ConfigError::Catalog(DerivationError::EmptyCatalog))
        ));
        assert!(matches!(
            ValidatorConfig::from_json_str(&format!(
                r#"{{{keys},"commitment_prefix":"","catalog":[{{"name":"c","values":["x"]}}]}}"#
            )),
            Err(ConfigError::CommitmentPrefix { len: 0, .. })
        ));
        assert!(matches!(
            ValidatorConfig::from_json_str(&format!(r#"{{{keys},"bogus":1}}"#)),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn vrf_key_must_be_a_large_order_point() {
        let mut cfg = ValidatorConfig {
            issuer_key: SigningKey::from_bytes(&[5u8; 32]).verifying_key().to_bytes(),
            catalog: TraitCatalog::new(vec![crate::derivation::TraitCategory::uniform("c", ["x"])]).unwrap(),
            ..ValidatorConfig::default()
        };
        // identity
        cfg.vrf_public_key = [0u8; 32];
        cfg.vrf_public_key[0] = 1;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidVrfKey)));
        // y = p is not canonical
        cfg.vrf_public_key = [0xff; 32];
        cfg.vrf_public_key[0] = 0xed;
        cfg.vrf_public_key[31] = 0x7f;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidVrfKey)));

        cfg.vrf_public_key = SecretScalar::from_seed(&[6u8; 32]).unwrap().public_point().0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn funding_pool_rules() {
        let op = |b: u8, value| Outpoint { txid: [b; 32], vout: 0, value };
        assert!(matches!(FundingPool::new(vec![]), Err(ConfigError::EmptyFundingPool)));
        assert!(matches!(
            FundingPool::new(vec![op(1, 1_000), op(2, 545)]),
            Err(ConfigError::DustOutpoint { index: 1, value: 545 })
        ));
        assert!(matches!(
            FundingPool::new(vec![op(1, 1_000), op(1, 2_000)]),
            Err(ConfigError::DuplicateOutpoint { index: 1 })
        ));

        let pool = FundingPool::new(vec![op(1, 5_000), op(2, DUST_LIMIT), op(3, 1_200)]).unwrap();
        assert_eq!(pool.total_value(), 6_746);
        assert_eq!(pool.largest(), 5_000);
        assert_eq!(pool.select(1_000).map(|o| o.value), Some(1_200));
        assert_eq!(pool.select(9_999), None);
    }

    #[test]
    fn funding_pool_is_validated_on_parse() {
        let txid = "ab".repeat(32);
        let json = format!(r#"[{{"txid":"{txid}","vout":1,"value":100}}]"#);
        assert!(matches!(FundingPool::from_json_str(&json), Err(ConfigError::DustOutpoint { index: 0, value: 100 })));
        // the serde path goes through the same checks
        assert!(serde_json::from_str::<FundingPool>(&json).is_err());

        let json = json.replace("\"value\":100", "\"value\":600");
        let pool = FundingPool::from_json_str(&json).unwrap();
        assert_eq!(pool.outpoints()[0].vout, 1);
        assert_eq!(serde_json::from_str::<FundingPool>(&json).unwrap(), pool);
    }
}
