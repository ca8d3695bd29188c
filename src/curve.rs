//! edwards25519 group and scalar-field helpers used by the VRF.

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
};

use crate::{
    types::{CHALLENGE_LEN, PublicPoint, SCALAR_LEN},
    vrf::VrfError,
};

/// Generator of the prime-order subgroup.
pub const G: EdwardsPoint = ED25519_BASEPOINT_POINT;

/// Decode a 32-byte compressed point. Only the canonical encoding of a point
/// is accepted, so every point has exactly one valid byte string.
///
/// # Errors
/// `InvalidCurvePoint` if the bytes are not the canonical encoding of a curve point.
pub fn decode_point(bytes: &[u8; 32]) -> Result<EdwardsPoint, VrfError> {
    let p = CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or(VrfError::InvalidCurvePoint)?;
    if p.compress().as_bytes() != bytes {
        return Err(VrfError::InvalidCurvePoint);
    }
    Ok(p)
}

#[must_use]
pub fn encode_point(p: &EdwardsPoint) -> [u8; 32] {
    p.compress().to_bytes()
}

/// Decode and validate a VRF public key: it must be a curve point outside the
/// small-order torsion subgroup (identity included).
///
/// # Errors
/// `InvalidCurvePoint` on a non-decodable or small-order key.
pub fn decode_public_key(pk: &PublicPoint) -> Result<EdwardsPoint, VrfError> {
    let y = decode_point(&pk.0)?;
    if y.is_small_order() {
        return Err(VrfError::InvalidCurvePoint);
    }
    Ok(y)
}

/// Reject encodings of scalars `>= q`.
///
/// # Errors
/// `MalformedProof` when the encoding is not canonical.
pub fn decode_canonical_scalar(bytes: &[u8; SCALAR_LEN]) -> Result<Scalar, VrfError> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes))
        .ok_or(VrfError::MalformedProof("non-canonical scalar"))
}

/// A 16-byte challenge read as a little-endian integer; always below q.
#[must_use]
pub fn challenge_scalar(c: &[u8; CHALLENGE_LEN]) -> Scalar {
    let mut wide = [0u8; 32];
    wide[..CHALLENGE_LEN].copy_from_slice(c);
    Scalar::from_bytes_mod_order(wide)
}

/// Reduce a 64-byte hash output mod q.
#[must_use]
pub fn scalar_from_wide(bytes: &[u8; 64]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(bytes)
}
