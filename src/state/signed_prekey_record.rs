use crate::crypto::key_pair::KeyPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A medium-term pre-key whose public half is signed by the identity key.
///
/// `accepted_by_service` flips to true only once the directory service has
/// acknowledged the upload; the store's current pointer may only ever name an
/// accepted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    pub id: u32,
    pub key_pair: KeyPair,
    #[serde(with = "serde_bytes")]
    pub signature: [u8; 64],
    pub created_at: DateTime<Utc>,
    pub accepted_by_service: bool,
}

impl SignedPreKeyRecord {
    pub fn new(id: u32, key_pair: KeyPair, signature: [u8; 64], created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            key_pair,
            signature,
            created_at,
            accepted_by_service: false,
        }
    }
}
