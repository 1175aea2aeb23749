use crate::crypto::xed25519;
use ed25519_dalek::Signature;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

/// Type byte prefixed to a public key before signing it.
const DJB_TYPE: u8 = 5;

/// An X25519 key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: [u8; 32],
    pub private_key: [u8; 32],
}

impl KeyPair {
    /// Generates a new random X25519 key pair.
    pub fn new() -> Self {
        let mut p_bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut p_bytes).expect("RNG failure");
        let private = StaticSecret::from(p_bytes);
        let public = PublicKey::from(&private);
        Self {
            public_key: *public.as_bytes(),
            private_key: private.to_bytes(),
        }
    }

    /// Creates a key pair from an existing 32-byte private key.
    pub fn from_private_key(private_key: [u8; 32]) -> Self {
        let private = StaticSecret::from(private_key);
        let public = PublicKey::from(&private);
        Self {
            public_key: *public.as_bytes(),
            private_key: private.to_bytes(),
        }
    }

    /// Signs the public key of another `KeyPair` with this key pair's private
    /// key. The signed message is the type byte followed by the raw public
    /// key.
    pub fn sign(&self, key_to_sign: &KeyPair) -> Signature {
        self.sign_message(&prefixed_public_key(&key_to_sign.public_key))
    }

    /// Signs an arbitrary byte slice via the XEd25519 scheme.
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(&xed25519::sign(&self.private_key, message))
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks a pre-key signature against the signer's public identity key.
pub fn verify_prekey_signature(
    identity_public: &[u8; 32],
    prekey_public: &[u8; 32],
    signature: &[u8; 64],
) -> bool {
    xed25519::verify(identity_public, &prefixed_public_key(prekey_public), signature)
}

fn prefixed_public_key(public_key: &[u8; 32]) -> [u8; 33] {
    let mut message = [0u8; 33];
    message[0] = DJB_TYPE;
    message[1..].copy_from_slice(public_key);
    message
}
