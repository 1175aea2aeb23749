use crate::crypto::key_pair::KeyPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single-use pre-key. Consumed by the first peer that opens a session with
/// it; consumption is observed only as a decreasing remote count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKeyRecord {
    pub id: u32,
    pub key_pair: KeyPair,
    pub created_at: DateTime<Utc>,
    pub uploaded: bool,
}

impl OneTimePreKeyRecord {
    pub fn new(id: u32, key_pair: KeyPair, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            key_pair,
            created_at,
            uploaded: false,
        }
    }
}
