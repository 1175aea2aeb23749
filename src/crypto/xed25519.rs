//! XEd25519 signing and verification: Ed25519-compatible signatures produced
//! directly from X25519 key material, as required for signed pre-keys.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::{Scalar, clamp_integer};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::TryRngCore;
use sha2::{Digest, Sha512};

/// Domain-separation prefix for the nonce hash: 0xFE followed by 31 bytes of
/// 0xFF, per the XEdDSA specification.
const NONCE_HASH_PREFIX: [u8; 32] = [
    0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// Derives the Ed25519 key pair for an X25519 private key, negating the
/// scalar if needed so the public key carries the requested sign bit.
fn calculate_key_pair(private_key: &[u8; 32], sign: u8) -> ([u8; 32], [u8; 32]) {
    let clamped = clamp_integer(*private_key);
    let scalar = Scalar::from_bytes_mod_order(clamped);
    let point = EdwardsPoint::mul_base(&scalar);

    if (point.compress().to_bytes()[31] & 0x80) >> 7 == sign {
        (clamped, point.compress().to_bytes())
    } else {
        let negated = -scalar;
        let negated_point = EdwardsPoint::mul_base(&negated);
        (negated.to_bytes(), negated_point.compress().to_bytes())
    }
}

/// Signs `message` with a 32-byte X25519 private key, returning a 64-byte
/// signature whose high bit encodes the Edwards sign of the public key.
pub fn sign(private_key_bytes: &[u8; 32], message: &[u8]) -> [u8; 64] {
    let (ed_private, ed_public) = calculate_key_pair(private_key_bytes, 0);

    let mut nonce = [0u8; 64];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce)
        .expect("RNG failure");

    let mut hasher = Sha512::new();
    hasher.update(NONCE_HASH_PREFIX);
    hasher.update(ed_private);
    hasher.update(message);
    hasher.update(nonce);
    let r_digest: [u8; 64] = hasher.finalize().into();

    let r_scalar = Scalar::from_bytes_mod_order_wide(&r_digest);
    let r_point = EdwardsPoint::mul_base(&r_scalar);

    let mut hasher = Sha512::new();
    hasher.update(r_point.compress().to_bytes());
    hasher.update(ed_public);
    hasher.update(message);
    let challenge: [u8; 64] = hasher.finalize().into();

    let challenge_scalar = Scalar::from_bytes_mod_order_wide(&challenge);
    let private_scalar = Scalar::from_bytes_mod_order(ed_private);
    let s_scalar = r_scalar + challenge_scalar * private_scalar;

    let mut signature = [0u8; 64];
    signature[0..32].copy_from_slice(&r_point.compress().to_bytes());
    signature[32..64].copy_from_slice(&s_scalar.to_bytes());
    signature
}

/// Verifies a signature against a 32-byte X25519 (Montgomery) public key.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let sign_bit = (signature[63] & 0x80) >> 7;

    let edwards_point = match MontgomeryPoint(*public_key).to_edwards(sign_bit) {
        Some(point) => point,
        None => return false,
    };

    let verifying_key = match VerifyingKey::from_bytes(&edwards_point.compress().to_bytes()) {
        Ok(key) => key,
        Err(_) => return false,
    };

    // The sign bit lives in the signature, not the Ed25519 encoding.
    let mut cleaned = *signature;
    cleaned[63] &= 0x7F;

    verifying_key
        .verify(message, &Signature::from_bytes(&cleaned))
        .is_ok()
}
