//! Hash-to-curve for the VRF: SHA-512 → field element → Elligator-2 →
//! edwards25519 → cofactor clearing.

use curve25519_dalek::{edwards::EdwardsPoint, montgomery::MontgomeryPoint};
use sha2::{Digest, Sha512};

use crate::{
    field::{FieldElement, MONTGOMERY_A},
    types::{PublicPoint, SUITE},
    vrf::VrfError,
};

/// Domain separator for the hash-to-curve step.
pub const H2C_DOMAIN: u8 = 0x01;

/// H = `ELL2`( SHA512( SUITE || 0x01 || Y || α )[0..32] with bit 255 cleared ) · 8
///
/// # Errors
/// `InvalidCurvePoint` if the map lands on the single exceptional
/// Montgomery coordinate or clearing the cofactor leaves the identity.
pub fn hash_to_curve(y: &PublicPoint, alpha: &[u8]) -> Result<EdwardsPoint, VrfError> {
    let mut h = Sha512::new();
    h.update([SUITE, H2C_DOMAIN]);
    h.update(y.0);
    h.update(alpha);
    let digest = h.finalize();

    let mut r = [0u8; 32];
    r.copy_from_slice(&digest[..32]);
    r[31] &= 0x7f;

    map_to_curve(&FieldElement::from_bytes(&r))
}

/// Elligator-2 onto edwards25519 followed by cofactor clearing.
///
/// # Errors
/// `InvalidCurvePoint` as for [`hash_to_curve`].
pub fn map_to_curve(r: &FieldElement) -> Result<EdwardsPoint, VrfError> {
    let u = elligator2(r);
    // sign bit 0: the x-coordinate choice is irrelevant once the cofactor is cleared
    let p = MontgomeryPoint(u.to_bytes())
        .to_edwards(0)
        .ok_or(VrfError::InvalidCurvePoint)?;
    let h = p.mul_by_cofactor();
    if h.is_small_order() {
        return Err(VrfError::InvalidCurvePoint);
    }
    Ok(h)
}

/// Montgomery u-coordinate of the Elligator-2 image of `r` on Curve25519.
///
/// u = -A / (1 + 2r²); if u³ + A·u² + u is not a square, u = -A - u.
#[must_use]
pub fn elligator2(r: &FieldElement) -> FieldElement {
    let a = FieldElement::from_u64(MONTGOMERY_A);
    let denom = FieldElement::ONE + FieldElement::from_u64(2) * r.square();
    let u = -a * denom.invert();
    let w = u * (u.square() + a * u + FieldElement::ONE);
    if w.legendre() == -1 { -a - u } else { u }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{encode_point, G};
    use curve25519_dalek::scalar::Scalar;

    fn montgomery_rhs(u: FieldElement) -> FieldElement {
        let a = FieldElement::from_u64(MONTGOMERY_A);
        u * (u.square() + a * u + FieldElement::ONE)
    }

    #[test]
    fn elligator_output_is_on_curve() {
        for x in 0u64..200 {
            let u = elligator2(&FieldElement::from_u64(x));
            assert_ne!(montgomery_rhs(u).legendre(), -1, "r = {x}");
        }
    }

    #[test]
    fn map_rejects_only_exceptional_coordinates() {
        let minus_one = -FieldElement::ONE;
        for x in 0u64..64 {
            let r = FieldElement::from_u64(x);
            let u = elligator2(&r);
            match map_to_curve(&r) {
                Ok(h) => assert!(h.is_torsion_free() && !h.is_small_order()),
                Err(e) => {
                    assert_eq!(e, VrfError::InvalidCurvePoint);
                    assert!(u.is_zero() || u == minus_one, "unexpected rejection for r = {x}");
                }
            }
        }
    }

    #[test]
    fn hash_lands_in_prime_order_subgroup() {
        let y = PublicPoint(encode_point(&(G * Scalar::from(7u64))));
        for alpha in [&b""[..], &b"a"[..], &b"CryptoKitties:12345"[..]] {
            let h = hash_to_curve(&y, alpha).unwrap();
            assert!(h.is_torsion_free());
            assert!(!h.is_small_order());
        }
    }

    #[test]
    fn hash_is_deterministic_and_input_sensitive() {
        let y = PublicPoint(encode_point(&G));
        let h1 = hash_to_curve(&y, b"collection:1").unwrap();
        let h2 = hash_to_curve(&y, b"collection:1").unwrap();
        let h3 = hash_to_curve(&y, b"collection:2").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);

        let other = PublicPoint(encode_point(&(G * Scalar::from(2u64))));
        assert_ne!(h1, hash_to_curve(&other, b"collection:1").unwrap());
    }
}
