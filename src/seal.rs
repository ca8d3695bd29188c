//! Issuer seal: Ed25519 over the bundle's canonical bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{bundle::ProofBundle, errors::BundleError, types::SealSignature};

/// Domain prefix of the sealed message.
pub const SEAL_DOMAIN: &[u8] = b"NFTVRF1/seal/v1";

/// Sign a bundle; its current `signature` field is ignored.
///
/// # Errors
/// `MalformedBundle` if the bundle cannot be encoded.
pub fn seal_bundle(key: &SigningKey, bundle: &ProofBundle) -> Result<SealSignature, BundleError> {
    let msg = bundle.canonical_bytes()?;
    Ok(SealSignature(key.sign(&msg).to_bytes()))
}

/// # Errors
/// `SignatureInvalid` unless `bundle.signature` is a strict Ed25519
/// signature by `issuer` over the canonical bytes.
pub fn verify_seal(issuer: &VerifyingKey, bundle: &ProofBundle) -> Result<(), BundleError> {
    let msg = bundle.canonical_bytes()?;
    let sig = Signature::from_bytes(&bundle.signature.0);
    issuer.verify_strict(&msg, &sig).map_err(|_| BundleError::SignatureInvalid)
}

/// Decode a 32-byte issuer public key.
///
/// # Errors
/// `SignatureInvalid` if the bytes are not a valid, non-weak Ed25519 point.
pub fn decode_issuer_key(bytes: &[u8; 32]) -> Result<VerifyingKey, BundleError> {
    let vk = VerifyingKey::from_bytes(bytes).map_err(|_| BundleError::SignatureInvalid)?;
    if vk.is_weak() {
        return Err(BundleError::SignatureInvalid);
    }
    Ok(vk)
}
