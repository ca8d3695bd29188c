//! Deterministic trait derivation from a VRF output.
//!
//! For category `i`: `seed_i = SHA256(β || BE32(i))`, the value index is the
//! full 256-bit big-endian digest reduced mod the pool size (or mod the total
//! weight for weighted pools), and the rarity roll is `seed_i[0] mod 100`.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{Hash256, VrfOutput};

/// Rarity tier from fixed cumulative roll bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Tier {
    /// common 0–59, rare 60–84, epic 85–94, legendary 95–99
    #[must_use]
    pub const fn from_roll(roll: u8) -> Self {
        match roll {
            0..=59 => Self::Common,
            60..=84 => Self::Rare,
            85..=94 => Self::Epic,
            _ => Self::Legendary,
        }
    }

    /// Width of the tier's band, in percent.
    #[must_use]
    pub const fn rarity_pct(self) -> u8 {
        match self {
            Self::Common => 60,
            Self::Rare => 25,
            Self::Epic => 10,
            Self::Legendary => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

/// A derived trait. Only meaningful together with the β that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trait {
    pub value: String,
    pub tier: Tier,
    pub rarity_pct: u8,
    pub roll: u8,
}

/// Derived traits keyed by category name (sorted, for canonical encoding).
pub type TraitSet = BTreeMap<String, Trait>;

/// One category and its pool of values, optionally weighted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitCategory {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<u32>>,
}

impl TraitCategory {
    #[must_use]
    pub fn uniform(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            weights: None,
        }
    }

    #[must_use]
    pub fn weighted(name: impl Into<String>, entries: impl IntoIterator<Item = (impl Into<String>, u32)>) -> Self {
        let (values, weights): (Vec<String>, Vec<u32>) =
            entries.into_iter().map(|(v, w)| (v.into(), w)).unzip();
        Self { name: name.into(), values, weights: Some(weights) }
    }

    fn validate(&self) -> Result<(), DerivationError> {
        if self.values.is_empty() {
            return Err(DerivationError::EmptyPool(self.name.clone()));
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.values.len() {
                return Err(DerivationError::WeightsLength {
                    category: self.name.clone(),
                    expected: self.values.len(),
                    got: weights.len(),
                });
            }
            if weights.iter().all(|w| *w == 0) {
                return Err(DerivationError::ZeroWeight(self.name.clone()));
            }
        }
        Ok(())
    }

    /// Pool index selected by `seed`. Callers validate the category first;
    /// an empty pool or zero total weight selects index 0.
    #[must_use]
    pub fn select(&self, seed: &Hash256) -> usize {
        let n = U256::from_big_endian(seed);
        match &self.weights {
            None if self.values.is_empty() => 0,
            None => {
                let idx = n % U256::from(self.values.len());
                usize::try_from(idx.low_u64()).unwrap_or(0)
            }
            Some(weights) => {
                let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
                if total == 0 {
                    return 0;
                }
                let mut point = (n % U256::from(total)).low_u64();
                for (i, w) in weights.iter().enumerate() {
                    let w = u64::from(*w);
                    if point < w {
                        return i;
                    }
                    point -= w;
                }
                weights.len() - 1
            }
        }
    }
}

/// Ordered, validated list of trait categories. Public and fixed before
/// generation starts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitCatalog {
    categories: Vec<TraitCategory>,
}

impl TraitCatalog {
    /// # Errors
    /// See [`TraitCatalog::validate`].
    pub fn new(categories: Vec<TraitCategory>) -> Result<Self, DerivationError> {
        let catalog = Self { categories };
        catalog.validate()?;
        Ok(catalog)
    }

    /// At least one category, unique names, non-empty pools, weight tables
    /// matching their pools with a non-zero total.
    ///
    /// # Errors
    /// The first violated rule.
    pub fn validate(&self) -> Result<(), DerivationError> {
        if self.categories.is_empty() {
            return Err(DerivationError::EmptyCatalog);
        }
        let mut seen = BTreeSet::new();
        for c in &self.categories {
            if !seen.insert(c.name.as_str()) {
                return Err(DerivationError::DuplicateCategory(c.name.clone()));
            }
            c.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn categories(&self) -> &[TraitCategory] {
        &self.categories
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("trait catalog has no categories")]
    EmptyCatalog,
    #[error("category {0:?} has an empty pool")]
    EmptyPool(String),
    #[error("category {0:?} appears more than once")]
    DuplicateCategory(String),
    #[error("category {category:?}: {got} weights for {expected} values")]
    WeightsLength { category: String, expected: usize, got: usize },
    #[error("category {0:?}: all weights are zero")]
    ZeroWeight(String),
    #[error("trait mismatch in category {0:?}")]
    Mismatch(String),
}

/// seed_i = SHA256( β || BE32(i) )
#[must_use]
pub fn category_seed(beta: &VrfOutput, index: u32) -> Hash256 {
    let mut h = Sha256::new();
    h.update(beta.0);
    h.update(index.to_be_bytes());
    h.finalize().into()
}

fn derive_trait(beta: &VrfOutput, index: u32, category: &TraitCategory) -> Trait {
    let seed = category_seed(beta, index);
    let value = category.values[category.select(&seed)].clone();
    let roll = seed[0] % 100;
    let tier = Tier::from_roll(roll);
    Trait { value, tier, rarity_pct: tier.rarity_pct(), roll }
}

/// Derive the full trait set for β.
///
/// # Errors
/// Catalog validation errors.
pub fn derive_traits(beta: &VrfOutput, catalog: &TraitCatalog) -> Result<TraitSet, DerivationError> {
    catalog.validate()?;
    Ok((0u32..)
        .zip(catalog.categories())
        .map(|(i, c)| (c.name.clone(), derive_trait(beta, i, c)))
        .collect())
}

/// Re-derive and compare with a claimed set.
///
/// # Errors
/// `Mismatch(category)` for the first catalog category whose claimed trait is
/// missing or differs, then for any claimed category the catalog lacks.
pub fn verify_traits(beta: &VrfOutput, catalog: &TraitCatalog, claimed: &TraitSet) -> Result<(), DerivationError> {
    let expected = derive_traits(beta, catalog)?;
    for c in catalog.categories() {
        if claimed.get(&c.name) != expected.get(&c.name) {
            return Err(DerivationError::Mismatch(c.name.clone()));
        }
    }
    if let Some(extra) = claimed.keys().find(|k| !expected.contains_key(*k)) {
        return Err(DerivationError::Mismatch(extra.clone()));
    }
    Ok(())
}
