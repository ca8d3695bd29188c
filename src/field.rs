//! Arithmetic in GF(p), p = 2^255 - 19.
//!
//! Only public values (the VRF public key and α) pass through this module,
//! on their way into the Elligator-2 map. Secret-dependent arithmetic stays in
//! `curve25519-dalek`, which is constant time; this code is not.

use core::ops::{Add, Mul, Neg, Sub};
use primitive_types::{U256, U512};

/// p = 2^255 - 19, little-endian limbs.
pub const P: U256 = U256([
    0xFFFF_FFFF_FFFF_FFED,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
    0x7FFF_FFFF_FFFF_FFFF,
]);

/// Montgomery coefficient of Curve25519: v² = u³ + A·u² + u.
pub const MONTGOMERY_A: u64 = 486_662;

/// Canonical field element, always `< P`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldElement(U256);

impl FieldElement {
    pub const ZERO: Self = Self(U256([0, 0, 0, 0]));
    pub const ONE: Self = Self(U256([1, 0, 0, 0]));

    /// Interpret 32 little-endian bytes as an integer and reduce it mod p.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(U256::from_little_endian(bytes) % P)
    }

    #[must_use]
    pub fn from_u64(x: u64) -> Self {
        Self(U256::from(x) % P)
    }

    /// Canonical little-endian encoding.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.0.to_little_endian(&mut out);
        out
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn square(self) -> Self {
        self * self
    }

    /// Left-to-right square-and-multiply.
    #[must_use]
    pub fn pow(self, exp: U256) -> Self {
        let mut acc = Self::ONE;
        for i in (0..exp.bits()).rev() {
            acc = acc.square();
            if exp.bit(i) {
                acc = acc * self;
            }
        }
        acc
    }

    /// Multiplicative inverse via Fermat, `a^(p-2)`. Zero maps to zero.
    #[must_use]
    pub fn invert(self) -> Self {
        self.pow(P - U256::from(2u8))
    }

    /// Euler's criterion: 0 for zero, 1 for a non-zero square, -1 otherwise.
    #[must_use]
    pub fn legendre(self) -> i8 {
        let r = self.pow((P - U256::one()) >> 1u32);
        if r.is_zero() {
            0
        } else if r == Self::ONE {
            1
        } else {
            -1
        }
    }
}

impl Add for FieldElement {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        // both operands < 2^255, the sum fits in 256 bits
        let s = self.0 + rhs.0;
        Self(if s >= P { s - P } else { s })
    }
}

impl Sub for FieldElement {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self(self.0 + P - rhs.0)
        }
    }
}

impl Neg for FieldElement {
    type Output = Self;
    fn neg(self) -> Self {
        if self.is_zero() { self } else { Self(P - self.0) }
    }
}

impl Mul for FieldElement {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let r: U512 = self.0.full_mul(rhs.0) % U512::from(P);
        // r < P, so the upper limbs are zero
        Self(U256([r.0[0], r.0[1], r.0[2], r.0[3]]))
    }
}
