use core::convert::TryFrom;
use core::fmt;

use crate::errors::BundleError;

/// ECVRF suite byte for edwards25519 + SHA-512 + Elligator-2.
pub const SUITE: u8 = 0x04;
pub const SUITE_NAME: &str = "ECVRF-EDWARDS25519-SHA512-ELL2";

pub const PUBLIC_KEY_LEN: usize = 32;
pub const VRF_OUTPUT_LEN: usize = 64;          // β
pub const VRF_PROOF_LEN: usize = 80;           // π = Γ(32)||c(16)||s(32)
pub const GAMMA_LEN: usize = 32;
pub const CHALLENGE_LEN: usize = 16;
pub const SCALAR_LEN: usize = 32;
pub const HASH_LEN: usize = 32;                // SHA-256 leaves, nodes, roots
pub const SIGNATURE_LEN: usize = 64;
pub const COFACTOR: u8 = 8;

/// Separator between collection and token id inside α.
pub const ALPHA_SEPARATOR: u8 = b':';

/// Default confirmation depth for a ledger anchor.
pub const DEFAULT_MIN_CONFIRMATIONS: u64 = 6;
/// Default ASCII prefix in front of the Merkle root inside the ledger commitment.
pub const DEFAULT_COMMITMENT_PREFIX: &[u8] = b"NFTVRF1";
/// Outputs at or above this many base units are spendable on the anchoring ledger.
pub const DUST_LIMIT: u64 = 546;

/// 32-byte SHA-256 digest.
pub type Hash256 = [u8; HASH_LEN];

// Fixed-size newtypes prevent misuse
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)] pub struct PublicPoint(pub [u8; PUBLIC_KEY_LEN]);
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)] pub struct VrfOutput(pub [u8; VRF_OUTPUT_LEN]);
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)] pub struct MerkleRoot(pub Hash256);
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)] pub struct Txid(pub Hash256);
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)] pub struct BlockHash(pub Hash256);
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)] pub struct SealSignature(pub [u8; SIGNATURE_LEN]);

// Exact-sized decode helpers
macro_rules! impl_tryfrom_slice {
    ($t:ty, $len:expr, $name:literal) => {
        impl TryFrom<&[u8]> for $t {
            type Error = BundleError;
            fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
                if b.len() != $len {
                    return Err(BundleError::MalformedBundle(format!(
                        "{}: expected {} bytes, got {}",
                        $name,
                        $len,
                        b.len()
                    )));
                }
                let mut arr = [0u8; $len];
                arr.copy_from_slice(b);
                Ok(Self(arr))
            }
        }
    };
}
impl_tryfrom_slice!(PublicPoint, PUBLIC_KEY_LEN, "public_key");
impl_tryfrom_slice!(VrfOutput, VRF_OUTPUT_LEN, "vrf_output");
impl_tryfrom_slice!(MerkleRoot, HASH_LEN, "merkle root");
impl_tryfrom_slice!(Txid, HASH_LEN, "txid");
impl_tryfrom_slice!(BlockHash, HASH_LEN, "block_hash");
impl_tryfrom_slice!(SealSignature, SIGNATURE_LEN, "signature");

macro_rules! impl_hex_debug {
    ($t:ty) => {
        impl fmt::Debug for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($t), hex::encode(self.0))
            }
        }
    };
}
impl_hex_debug!(PublicPoint);
impl_hex_debug!(VrfOutput);
impl_hex_debug!(MerkleRoot);
impl_hex_debug!(Txid);
impl_hex_debug!(BlockHash);
impl_hex_debug!(SealSignature);

/// α = `collection_id` || ':' || `token_id`
#[must_use]
pub fn build_alpha(collection_id: &str, token_id: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(collection_id.len() + 1 + token_id.len());
    v.extend_from_slice(collection_id.as_bytes());
    v.push(ALPHA_SEPARATOR);
    v.extend_from_slice(token_id.as_bytes());
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_layout() {
        assert_eq!(build_alpha("CryptoKitties", "12345"), b"CryptoKitties:12345".to_vec());
        assert_eq!(build_alpha("", ""), b":".to_vec());
    }

    #[test]
    fn tryfrom_rejects_wrong_length() {
        let short = [0u8; 31];
        let err = MerkleRoot::try_from(&short[..]).unwrap_err();
        assert!(matches!(err, BundleError::MalformedBundle(_)));
        assert!(VrfOutput::try_from(&[7u8; 64][..]).is_ok());
    }
}
