use crate::crypto::key_pair::KeyPair;
use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord};
use chrono::Utc;

/// Generates the long-term identity key pair. Clients should only do this
/// once, at registration time.
pub fn generate_identity_key_pair() -> KeyPair {
    KeyPair::new()
}

/// Generates one signed pre-key record, its public half signed by the
/// identity key. The record starts out unaccepted.
pub fn generate_signed_prekey(identity_key_pair: &KeyPair, id: u32) -> SignedPreKeyRecord {
    let key_pair = KeyPair::new();
    let signature = identity_key_pair.sign(&key_pair);
    SignedPreKeyRecord::new(id, key_pair, signature.to_bytes(), Utc::now())
}

/// Generates a batch of one-time pre-key records with ids `start..start + count`.
pub fn generate_one_time_prekeys(start: u32, count: u32) -> Vec<OneTimePreKeyRecord> {
    let now = Utc::now();
    let mut prekeys = Vec::with_capacity(count as usize);
    for id in start..start + count {
        prekeys.push(OneTimePreKeyRecord::new(id, KeyPair::new(), now));
    }
    prekeys
}
