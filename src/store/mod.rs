pub mod error;
pub mod filestore;
pub mod memory;
pub mod traits;

use crate::config::RetentionPolicy;
use crate::crypto::key_pair::KeyPair;
use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord, SignedPreKeyState};
use crate::store::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Everything the store tracks for one identity.
///
/// Multi-field updates (promote current + supersede old + cull + reset the
/// failure counter) are applied to this snapshot under a single lock hold,
/// and durable backends replace the whole snapshot atomically, so a reader
/// never observes a half-migrated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityKeyState {
    pub identity_key: Option<KeyPair>,
    pub signed_prekeys: BTreeMap<u32, SignedPreKeyRecord>,
    pub one_time_prekeys: BTreeMap<u32, OneTimePreKeyRecord>,
    pub current_signed_prekey_id: Option<u32>,
    /// Monotonic id counters. Never rewound, so ids are not reused after a
    /// cull even across restarts.
    pub next_signed_prekey_id: u32,
    pub next_one_time_prekey_id: u32,
    pub failure_count: u32,
}

impl Default for IdentityKeyState {
    fn default() -> Self {
        Self {
            identity_key: None,
            signed_prekeys: BTreeMap::new(),
            one_time_prekeys: BTreeMap::new(),
            current_signed_prekey_id: None,
            next_signed_prekey_id: 1,
            next_one_time_prekey_id: 1,
            failure_count: 0,
        }
    }
}

impl IdentityKeyState {
    /// Records a freshly generated rotation: signed record unaccepted,
    /// one-time records not yet uploaded.
    pub fn insert_rotation(
        &mut self,
        signed: SignedPreKeyRecord,
        one_time: Vec<OneTimePreKeyRecord>,
    ) {
        self.signed_prekeys.insert(signed.id, signed);
        for record in one_time {
            self.one_time_prekeys.insert(record.id, record);
        }
    }

    /// Applies the full post-upload commit: accept the signed record, promote
    /// it to current (demoting any previous current in the same mutation),
    /// flag the uploaded one-time records, cull superseded and aged material,
    /// and clear the failure counter.
    pub fn commit_rotation(
        &mut self,
        signed_prekey_id: u32,
        one_time_ids: RangeInclusive<u32>,
        retention: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = self
            .signed_prekeys
            .get_mut(&signed_prekey_id)
            .ok_or_else(|| StoreError::NotFound(format!("signed pre-key {signed_prekey_id}")))?;
        record.accepted_by_service = true;
        self.current_signed_prekey_id = Some(signed_prekey_id);

        for id in one_time_ids {
            if let Some(prekey) = self.one_time_prekeys.get_mut(&id) {
                prekey.uploaded = true;
            }
        }

        self.cull_signed_prekeys(retention);
        self.cull_one_time_prekeys(retention.one_time_cutoff(now));
        self.failure_count = 0;
        Ok(())
    }

    pub fn signed_prekey_state(&self, id: u32) -> Option<SignedPreKeyState> {
        let record = self.signed_prekeys.get(&id)?;
        Some(if !record.accepted_by_service {
            SignedPreKeyState::Generated
        } else if self.current_signed_prekey_id == Some(id) {
            SignedPreKeyState::Current
        } else {
            SignedPreKeyState::Superseded
        })
    }

    /// Keeps the current record plus the most recently created non-current
    /// records up to the retention count; everything older is culled.
    fn cull_signed_prekeys(&mut self, retention: &RetentionPolicy) {
        let current = self.current_signed_prekey_id;
        let mut superseded: Vec<(u32, DateTime<Utc>)> = self
            .signed_prekeys
            .values()
            .filter(|record| Some(record.id) != current)
            .map(|record| (record.id, record.created_at))
            .collect();
        superseded.sort_by(|a, b| b.1.cmp(&a.1));

        for (id, _) in superseded
            .into_iter()
            .skip(retention.retained_signed_prekeys)
        {
            self.signed_prekeys.remove(&id);
        }
    }

    fn cull_one_time_prekeys(&mut self, cutoff: Option<DateTime<Utc>>) {
        if let Some(cutoff) = cutoff {
            self.one_time_prekeys
                .retain(|_, record| record.created_at >= cutoff);
        }
    }
}
