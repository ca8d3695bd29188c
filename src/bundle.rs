//! `ProofBundle`: the self-contained evidence for one token, and its JSON form.
//!
//! Binary VRF material and the signature travel as standard padded base64;
//! hashes and ledger ids as lowercase hex. Parsing is strict: unknown fields,
//! wrong lengths, non-canonical encodings and trait records whose tier does
//! not match their roll are all `MalformedBundle`.

use std::{collections::BTreeMap, fmt};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::{
    anchor::Anchor,
    derivation::{Tier, Trait, TraitSet},
    errors::BundleError,
    merkle::{Direction, MerkleProof, PathStep},
    seal::SEAL_DOMAIN,
    types::{build_alpha, BlockHash, Hash256, MerkleRoot, PublicPoint, SealSignature, Txid, VrfOutput},
    vrf::Proof,
};

/// Everything a third party needs to check one token's randomness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofBundle {
    pub collection_id: String,
    pub token_id: String,
    pub vrf_output: VrfOutput,
    pub vrf_proof: Proof,
    pub traits: TraitSet,
    pub public_key: PublicPoint,
    pub merkle_proof: MerkleProof,
    pub anchor: Anchor,
    pub signature: SealSignature,
}

impl ProofBundle {
    /// α for this token.
    #[must_use]
    pub fn alpha(&self) -> Vec<u8> {
        build_alpha(&self.collection_id, &self.token_id)
    }

    /// # Errors
    /// `MalformedBundle` with a description of the first schema violation.
    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        let wire: WireBundle = serde_json::from_str(json).map_err(malformed)?;
        wire.into_typed()
    }

    /// # Errors
    /// `MalformedBundle` if serialization fails.
    pub fn to_json(&self) -> Result<String, BundleError> {
        serde_json::to_string(&WireBundle::from_typed(self, true)).map_err(malformed)
    }

    /// `SEAL_DOMAIN || JSON(bundle without signature)`, the message the issuer signs.
    ///
    /// # Errors
    /// `MalformedBundle` if serialization fails.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, BundleError> {
        let mut out = SEAL_DOMAIN.to_vec();
        serde_json::to_writer(&mut out, &WireBundle::from_typed(self, false)).map_err(malformed)?;
        Ok(out)
    }
}

fn malformed(e: impl ToString) -> BundleError {
    BundleError::MalformedBundle(e.to_string())
}

fn b64_field<const N: usize>(name: &str, s: &str) -> Result<[u8; N], BundleError> {
    let bytes = STANDARD
        .decode(s)
        .map_err(|e| BundleError::MalformedBundle(format!("{name}: {e}")))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        BundleError::MalformedBundle(format!("{name}: expected {N} bytes, got {}", bytes.len()))
    })
}

fn hex_field(name: &str, s: &str) -> Result<Hash256, BundleError> {
    if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(BundleError::MalformedBundle(format!("{name}: expected lowercase hex")));
    }
    let bytes = hex::decode(s).map_err(|e| BundleError::MalformedBundle(format!("{name}: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        BundleError::MalformedBundle(format!("{name}: expected 32 bytes, got {}", bytes.len()))
    })
}

fn check_trait(category: &str, t: &Trait) -> Result<(), BundleError> {
    if t.roll > 99 {
        return Err(BundleError::MalformedBundle(format!("traits.{category}: roll {} out of range", t.roll)));
    }
    let tier = Tier::from_roll(t.roll);
    if t.tier != tier || t.rarity_pct != tier.rarity_pct() {
        return Err(BundleError::MalformedBundle(format!(
            "traits.{category}: tier/rarity_pct inconsistent with roll {}",
            t.roll
        )));
    }
    Ok(())
}

// serde_json keeps the last of two equal keys; a bundle naming a category
// twice is rejected instead.
fn unique_traits<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Trait>, D::Error> {
    struct TraitsVisitor;

    impl<'de> Visitor<'de> for TraitsVisitor {
        type Value = BTreeMap<String, Trait>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from category name to trait")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = BTreeMap::new();
            while let Some((category, t)) = map.next_entry::<String, Trait>()? {
                if out.contains_key(&category) {
                    return Err(de::Error::custom(format_args!("duplicate trait category {category:?}")));
                }
                out.insert(category, t);
            }
            Ok(out)
        }
    }

    d.deserialize_map(TraitsVisitor)
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireProof {
    gamma: String,
    c: String,
    s: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireStep {
    sibling: String,
    direction: Direction,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireMerkleProof {
    root: String,
    leaf: String,
    path: Vec<WireStep>,
    index: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireAnchor {
    txid: String,
    block_height: u64,
    block_hash: String,
    confirmations: u64,
    timestamp: u64,
}

// Field order here is the canonical order of the signed encoding.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireBundle {
    collection_id: String,
    token_id: String,
    vrf_output: String,
    vrf_proof: WireProof,
    #[serde(deserialize_with = "unique_traits")]
    traits: BTreeMap<String, Trait>,
    public_key: String,
    merkle_proof: WireMerkleProof,
    anchor: WireAnchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl WireBundle {
    fn from_typed(b: &ProofBundle, with_signature: bool) -> Self {
        let p = &b.merkle_proof;
        Self {
            collection_id: b.collection_id.clone(),
            token_id: b.token_id.clone(),
            vrf_output: STANDARD.encode(b.vrf_output.0),
            vrf_proof: WireProof {
                gamma: STANDARD.encode(b.vrf_proof.gamma()),
                c: STANDARD.encode(b.vrf_proof.c()),
                s: STANDARD.encode(b.vrf_proof.s()),
            },
            traits: b.traits.clone(),
            public_key: STANDARD.encode(b.public_key.0),
            merkle_proof: WireMerkleProof {
                root: hex::encode(p.root.0),
                leaf: hex::encode(p.leaf),
                path: p
                    .path
                    .iter()
                    .map(|s| WireStep { sibling: hex::encode(s.sibling), direction: s.direction })
                    .collect(),
                index: p.index,
            },
            anchor: WireAnchor {
                txid: hex::encode(b.anchor.txid.0),
                block_height: b.anchor.block_height,
                block_hash: hex::encode(b.anchor.block_hash.0),
                confirmations: b.anchor.confirmations,
                timestamp: b.anchor.timestamp,
            },
            signature: with_signature.then(|| STANDARD.encode(b.signature.0)),
        }
    }

    fn into_typed(self) -> Result<ProofBundle, BundleError> {
        let vrf_proof = Proof::from_parts(
            b64_field("vrf_proof.gamma", &self.vrf_proof.gamma)?,
            b64_field("vrf_proof.c", &self.vrf_proof.c)?,
            b64_field("vrf_proof.s", &self.vrf_proof.s)?,
        )?;
        for (category, t) in &self.traits {
            check_trait(category, t)?;
        }
        let path = self
            .merkle_proof
            .path
            .iter()
            .map(|s| {
                let sibling = hex_field("merkle_proof.path.sibling", &s.sibling)?;
                Ok::<_, BundleError>(PathStep { sibling, direction: s.direction })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let signature = self
            .signature
            .as_deref()
            .ok_or_else(|| BundleError::MalformedBundle("missing field `signature`".into()))?;

        Ok(ProofBundle {
            collection_id: self.collection_id,
            token_id: self.token_id,
            vrf_output: VrfOutput(b64_field("vrf_output", &self.vrf_output)?),
            vrf_proof,
            traits: self.traits,
            public_key: PublicPoint(b64_field("public_key", &self.public_key)?),
            merkle_proof: MerkleProof {
                root: MerkleRoot(hex_field("merkle_proof.root", &self.merkle_proof.root)?),
                leaf: hex_field("merkle_proof.leaf", &self.merkle_proof.leaf)?,
                path,
                index: self.merkle_proof.index,
            },
            anchor: Anchor {
                txid: Txid(hex_field("anchor.txid", &self.anchor.txid)?),
                block_height: self.anchor.block_height,
                block_hash: BlockHash(hex_field("anchor.block_hash", &self.anchor.block_hash)?),
                confirmations: self.anchor.confirmations,
                timestamp: self.anchor.timestamp,
            },
            signature: SealSignature(b64_field("signature", signature)?),
        })
    }
}
