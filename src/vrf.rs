//! ECVRF over edwards25519 with SHA-512 and Elligator-2 hash-to-curve.
//!
//! π = Γ(32) || c(16) || s(32), β = SHA512( SUITE || 0x03 || 8·Γ ).
//! The challenge binds H, Γ, U, V, the public key and α:
//! c = SHA512( SUITE || 0x02 || H || Γ || U || V || Y || α )[0..16].

use core::fmt;

use curve25519_dalek::{edwards::EdwardsPoint, scalar::{clamp_integer, Scalar}};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    curve::{challenge_scalar, decode_canonical_scalar, decode_point, decode_public_key, encode_point, scalar_from_wide},
    hash_to_curve::hash_to_curve,
    types::{CHALLENGE_LEN, GAMMA_LEN, PublicPoint, SCALAR_LEN, SUITE, VRF_OUTPUT_LEN, VRF_PROOF_LEN, VrfOutput},
};

const CHALLENGE_DOMAIN: u8 = 0x02;
const PROOF_TO_HASH_DOMAIN: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VrfError {
    #[error("invalid curve point")]
    InvalidCurvePoint,
    #[error("malformed VRF proof: {0}")]
    MalformedProof(&'static str),
    #[error("VRF challenge mismatch")]
    ChallengeMismatch,
    #[error("VRF output mismatch")]
    OutputMismatch,
    #[error("secret scalar must be in [1, q-1]")]
    InvalidSecretScalar,
}

/// VRF proof π. `s` is kept canonical (`< q`) by construction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    gamma: [u8; GAMMA_LEN],
    c: [u8; CHALLENGE_LEN],
    s: [u8; SCALAR_LEN],
}

impl Proof {
    /// Assemble a proof from its parts.
    ///
    /// # Errors
    /// `MalformedProof` if `s` is not a canonical scalar encoding.
    pub fn from_parts(
        gamma: [u8; GAMMA_LEN],
        c: [u8; CHALLENGE_LEN],
        s: [u8; SCALAR_LEN],
    ) -> Result<Self, VrfError> {
        decode_canonical_scalar(&s)?;
        Ok(Self { gamma, c, s })
    }

    /// Decode the 80-byte wire form Γ || c || s.
    ///
    /// # Errors
    /// `MalformedProof` on a wrong length or a non-canonical `s`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        if bytes.len() != VRF_PROOF_LEN {
            return Err(VrfError::MalformedProof("proof must be 80 bytes"));
        }
        let mut gamma = [0u8; GAMMA_LEN];
        let mut c = [0u8; CHALLENGE_LEN];
        let mut s = [0u8; SCALAR_LEN];
        gamma.copy_from_slice(&bytes[..GAMMA_LEN]);
        c.copy_from_slice(&bytes[GAMMA_LEN..GAMMA_LEN + CHALLENGE_LEN]);
        s.copy_from_slice(&bytes[GAMMA_LEN + CHALLENGE_LEN..]);
        Self::from_parts(gamma, c, s)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; VRF_PROOF_LEN] {
        let mut out = [0u8; VRF_PROOF_LEN];
        out[..GAMMA_LEN].copy_from_slice(&self.gamma);
        out[GAMMA_LEN..GAMMA_LEN + CHALLENGE_LEN].copy_from_slice(&self.c);
        out[GAMMA_LEN + CHALLENGE_LEN..].copy_from_slice(&self.s);
        out
    }

    #[must_use]
    pub const fn gamma(&self) -> &[u8; GAMMA_LEN] {
        &self.gamma
    }

    #[must_use]
    pub const fn c(&self) -> &[u8; CHALLENGE_LEN] {
        &self.c
    }

    #[must_use]
    pub const fn s(&self) -> &[u8; SCALAR_LEN] {
        &self.s
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proof")
            .field("gamma", &hex::encode(self.gamma))
            .field("c", &hex::encode(self.c))
            .field("s", &hex::encode(self.s))
            .finish()
    }
}

/// The issuer's VRF secret: scalar x ∈ [1, q-1] and the prefix used for
/// deterministic nonces. Never serialized; wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar {
    x: Scalar,
    nonce_prefix: [u8; 32],
}

impl SecretScalar {
    /// Use a canonical scalar encoding directly. The nonce prefix is
    /// `SHA512(x)[32..64]`.
    ///
    /// # Errors
    /// `InvalidSecretScalar` for zero or a non-canonical encoding.
    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self, VrfError> {
        let x = decode_canonical_scalar(&bytes).map_err(|_| VrfError::InvalidSecretScalar)?;
        if x == Scalar::ZERO {
            return Err(VrfError::InvalidSecretScalar);
        }
        let mut h = [0u8; 64];
        h.copy_from_slice(&Sha512::digest(bytes));
        let mut nonce_prefix = [0u8; 32];
        nonce_prefix.copy_from_slice(&h[32..]);
        h.zeroize();
        Ok(Self { x, nonce_prefix })
    }

    /// Ed25519-style expansion of a 32-byte seed: `h = SHA512(seed)`,
    /// `x = clamp(h[0..32]) mod q`, nonce prefix `h[32..64]`. The resulting
    /// public point equals the Ed25519 public key of the same seed.
    ///
    /// # Errors
    /// `InvalidSecretScalar` if the clamped scalar reduces to zero.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, VrfError> {
        let mut h = [0u8; 64];
        h.copy_from_slice(&Sha512::digest(seed));
        let mut lo = [0u8; 32];
        lo.copy_from_slice(&h[..32]);
        let x = Scalar::from_bytes_mod_order(clamp_integer(lo));
        let mut nonce_prefix = [0u8; 32];
        nonce_prefix.copy_from_slice(&h[32..]);
        lo.zeroize();
        h.zeroize();
        if x == Scalar::ZERO {
            return Err(VrfError::InvalidSecretScalar);
        }
        Ok(Self { x, nonce_prefix })
    }

    /// Fresh secret from a cryptographic RNG.
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Self {
        loop {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            let sk = Self::from_seed(&seed);
            seed.zeroize();
            if let Ok(sk) = sk {
                return sk;
            }
        }
    }

    /// Y = x·G
    #[must_use]
    pub fn public_point(&self) -> PublicPoint {
        PublicPoint(encode_point(&EdwardsPoint::mul_base(&self.x)))
    }

    /// k = SHA512( nonce_prefix || H ) mod q
    fn nonce(&self, h: &EdwardsPoint) -> Scalar {
        let mut hasher = Sha512::new();
        hasher.update(self.nonce_prefix);
        hasher.update(encode_point(h));
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&hasher.finalize());
        let k = scalar_from_wide(&wide);
        wide.zeroize();
        k
    }

    /// Produce (β, π) for α. Deterministic: the same secret and α always
    /// yield byte-identical output.
    ///
    /// # Errors
    /// `InvalidCurvePoint` if α hashes to an exceptional point.
    pub fn prove(&self, alpha: &[u8]) -> Result<(VrfOutput, Proof), VrfError> {
        let y = self.public_point();
        let h = hash_to_curve(&y, alpha)?;
        let gamma = h * self.x;
        let mut k = self.nonce(&h);
        let u = EdwardsPoint::mul_base(&k);
        let v = h * k;
        let c = challenge(&h, &gamma, &u, &v, &y, alpha);
        let s = k + challenge_scalar(&c) * self.x;
        k.zeroize();

        let proof = Proof { gamma: encode_point(&gamma), c, s: s.to_bytes() };
        Ok((gamma_to_hash(&gamma), proof))
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar(..)")
    }
}

fn challenge(
    h: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
    y: &PublicPoint,
    alpha: &[u8],
) -> [u8; CHALLENGE_LEN] {
    let mut hasher = Sha512::new();
    hasher.update([SUITE, CHALLENGE_DOMAIN]);
    hasher.update(encode_point(h));
    hasher.update(encode_point(gamma));
    hasher.update(encode_point(u));
    hasher.update(encode_point(v));
    hasher.update(y.0);
    hasher.update(alpha);
    let digest = hasher.finalize();
    let mut c = [0u8; CHALLENGE_LEN];
    c.copy_from_slice(&digest[..CHALLENGE_LEN]);
    c
}

fn gamma_to_hash(gamma: &EdwardsPoint) -> VrfOutput {
    let mut hasher = Sha512::new();
    hasher.update([SUITE, PROOF_TO_HASH_DOMAIN]);
    hasher.update(encode_point(&gamma.mul_by_cofactor()));
    let mut out = [0u8; VRF_OUTPUT_LEN];
    out.copy_from_slice(&hasher.finalize());
    VrfOutput(out)
}

/// β from a proof without checking it. Only meaningful after [`verify`].
///
/// # Errors
/// `InvalidCurvePoint` if Γ does not decode.
pub fn proof_to_hash(proof: &Proof) -> Result<VrfOutput, VrfError> {
    Ok(gamma_to_hash(&decode_point(&proof.gamma)?))
}

/// Verify π for (Y, α) and return the β it commits to.
///
/// # Errors
/// `InvalidCurvePoint` for a bad Y or Γ, `ChallengeMismatch` when the
/// recomputed challenge differs.
pub fn verify_proof(y: &PublicPoint, alpha: &[u8], proof: &Proof) -> Result<VrfOutput, VrfError> {
    let y_point = decode_public_key(y)?;
    let gamma = decode_point(&proof.gamma)?;
    let s = decode_canonical_scalar(&proof.s)?;
    let c = challenge_scalar(&proof.c);
    let h = hash_to_curve(y, alpha)?;

    // U = s·G − c·Y, V = s·H − c·Γ
    let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&(-c), &y_point, &s);
    let v = h * s - gamma * c;

    let c_check = challenge(&h, &gamma, &u, &v, y, alpha);
    if !bool::from(c_check[..].ct_eq(&proof.c[..])) {
        return Err(VrfError::ChallengeMismatch);
    }
    Ok(gamma_to_hash(&gamma))
}

/// Verify π for (Y, α) and require it to commit to the claimed β.
///
/// # Errors
/// As [`verify_proof`], plus `OutputMismatch` when β differs.
pub fn verify(y: &PublicPoint, alpha: &[u8], beta: &VrfOutput, proof: &Proof) -> Result<(), VrfError> {
    let expected = verify_proof(y, alpha, proof)?;
    if !bool::from(expected.0[..].ct_eq(&beta.0[..])) {
        return Err(VrfError::OutputMismatch);
    }
    Ok(())
}

/// Key holder able to produce VRF proofs.
pub trait VrfProver {
    /// # Errors
    /// Returns `VrfError` if α maps to an exceptional curve point.
    fn prove(&self, alpha: &[u8]) -> Result<(VrfOutput, Proof), VrfError>;

    fn public_point(&self) -> PublicPoint;
}

impl VrfProver for SecretScalar {
    fn prove(&self, alpha: &[u8]) -> Result<(VrfOutput, Proof), VrfError> {
        Self::prove(self, alpha)
    }

    fn public_point(&self) -> PublicPoint {
        Self::public_point(self)
    }
}

/// Pluggable VRF verification used by the bundle validator.
pub trait VrfVerifier {
    /// # Errors
    /// Returns the specific `VrfError` that caused rejection.
    fn verify(&self, y: &PublicPoint, alpha: &[u8], beta: &VrfOutput, proof: &Proof) -> Result<(), VrfError>;
}

/// The ECVRF implemented in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcVrfEd25519;

impl VrfVerifier for EcVrfEd25519 {
    fn verify(&self, y: &PublicPoint, alpha: &[u8], beta: &VrfOutput, proof: &Proof) -> Result<(), VrfError> {
        verify(y, alpha, beta, proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::EIGHT_TORSION;

    fn issuer() -> SecretScalar {
        SecretScalar::from_seed(&[0x42; 32]).unwrap()
    }

    #[test]
    fn prove_then_verify() {
        let sk = issuer();
        let alpha = b"CryptoKitties:12345";
        let (beta, proof) = sk.prove(alpha).unwrap();
        assert_eq!(verify(&sk.public_point(), alpha, &beta, &proof), Ok(()));
        assert_eq!(verify_proof(&sk.public_point(), alpha, &proof), Ok(beta));
        assert_eq!(proof_to_hash(&proof), Ok(beta));
    }

    #[test]
    fn generated_keys_prove_and_verify() {
        let mut rng = rand_core::OsRng;
        let a = SecretScalar::generate(&mut rng);
        let b = SecretScalar::generate(&mut rng);
        assert_ne!(a.public_point(), b.public_point());
        assert!(decode_public_key(&a.public_point()).is_ok());

        let (beta, proof) = a.prove(b"token:1").unwrap();
        assert_eq!(verify(&a.public_point(), b"token:1", &beta, &proof), Ok(()));
        assert!(verify(&b.public_point(), b"token:1", &beta, &proof).is_err());
    }

    #[test]
    fn proving_is_deterministic() {
        let a = issuer().prove(b"token:1").unwrap();
        let b = issuer().prove(b"token:1").unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(a.1.to_bytes(), b.1.to_bytes());
    }

    #[test]
    fn different_alpha_different_output() {
        let sk = issuer();
        let (b1, p1) = sk.prove(b"token:1").unwrap();
        let (b2, p2) = sk.prove(b"token:2").unwrap();
        assert_ne!(b1, b2);
        assert_ne!(p1, p2);
    }

    #[test]
    fn wrong_alpha_or_key_is_a_challenge_mismatch() {
        let sk = issuer();
        let (beta, proof) = sk.prove(b"token:1").unwrap();
        assert_eq!(verify(&sk.public_point(), b"token:2", &beta, &proof), Err(VrfError::ChallengeMismatch));
        let other = SecretScalar::from_seed(&[7; 32]).unwrap();
        assert_eq!(verify(&other.public_point(), b"token:1", &beta, &proof), Err(VrfError::ChallengeMismatch));
    }

    #[test]
    fn wrong_beta_is_an_output_mismatch() {
        let sk = issuer();
        let (mut beta, proof) = sk.prove(b"token:1").unwrap();
        beta.0[63] ^= 1;
        assert_eq!(verify(&sk.public_point(), b"token:1", &beta, &proof), Err(VrfError::OutputMismatch));
    }

    #[test]
    fn torsion_shifted_gamma_keeps_beta_but_fails() {
        let sk = issuer();
        let alpha = b"token:9";
        let (beta, proof) = sk.prove(alpha).unwrap();
        let gamma = decode_point(proof.gamma()).unwrap();
        let shifted = encode_point(&(gamma + EIGHT_TORSION[1]));
        let forged = Proof::from_parts(shifted, *proof.c(), *proof.s()).unwrap();
        // 8·(Γ + T) = 8·Γ, so the forged proof claims the same β
        assert_eq!(proof_to_hash(&forged), Ok(beta));
        assert_eq!(verify(&sk.public_point(), alpha, &beta, &forged), Err(VrfError::ChallengeMismatch));
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let sk = issuer();
        let alpha = b"token:77";
        let (beta, proof) = sk.prove(alpha).unwrap();
        let bytes = proof.to_bytes();
        for bit in 0..VRF_PROOF_LEN * 8 {
            let mut flipped = bytes;
            flipped[bit / 8] ^= 1 << (bit % 8);
            let outcome = Proof::from_bytes(&flipped)
                .and_then(|p| verify(&sk.public_point(), alpha, &beta, &p));
            assert!(outcome.is_err(), "bit {bit} accepted");
        }
    }

    #[test]
    fn small_order_public_key_rejected() {
        let sk = issuer();
        let (beta, proof) = sk.prove(b"x").unwrap();
        let pk = PublicPoint(encode_point(&EIGHT_TORSION[0]));
        assert_eq!(verify(&pk, b"x", &beta, &proof), Err(VrfError::InvalidCurvePoint));
    }

    #[test]
    fn non_canonical_s_rejected_at_decode() {
        let mut bytes = issuer().prove(b"x").unwrap().1.to_bytes();
        bytes[79] |= 0xF0;
        assert!(matches!(Proof::from_bytes(&bytes), Err(VrfError::MalformedProof(_))));
        assert!(matches!(Proof::from_bytes(&bytes[..79]), Err(VrfError::MalformedProof(_))));
    }

    #[test]
    fn seed_expansion_matches_ed25519_public_key() {
        let seed = [0x42u8; 32];
        let ed = ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key();
        assert_eq!(issuer().public_point().0, ed.to_bytes());
    }

    #[test]
    fn zero_scalar_rejected() {
        assert!(matches!(SecretScalar::from_canonical_bytes([0; 32]), Err(VrfError::InvalidSecretScalar)));
        let mut one = [0u8; 32];
        one[0] = 1;
        let sk = SecretScalar::from_canonical_bytes(one).unwrap();
        assert_eq!(sk.public_point().0, encode_point(&crate::curve::G));
    }
}
