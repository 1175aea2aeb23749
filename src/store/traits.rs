use crate::config::RetentionPolicy;
use crate::crypto::key_pair::KeyPair;
use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord, SignedPreKeyState};
use crate::store::error::Result;
use crate::types::Identity;
use async_trait::async_trait;
use std::ops::RangeInclusive;

/// Durable storage for pre-key records, keyed by identity and record id.
///
/// The store owns record storage exclusively; the replenishment engine is the
/// only writer of acceptance and current-pointer state. Implementations must
/// apply `store_rotation` and `commit_rotation` atomically: a reader never
/// observes part of either write, and a crash leaves either the previous or
/// the new state.
#[async_trait]
pub trait PreKeyStore: Send + Sync {
    async fn identity_key_pair(&self, identity: Identity) -> Result<Option<KeyPair>>;
    async fn set_identity_key_pair(&self, identity: Identity, key_pair: &KeyPair) -> Result<()>;

    async fn load_signed_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyRecord>>;
    async fn load_signed_prekeys(&self, identity: Identity) -> Result<Vec<SignedPreKeyRecord>>;
    async fn current_signed_prekey_id(&self, identity: Identity) -> Result<Option<u32>>;
    async fn signed_prekey_state(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyState>>;
    /// Returns the next signed pre-key id and durably advances the counter.
    /// Ids allocated but never used (crash before persist) are skipped, never
    /// reused.
    async fn allocate_signed_prekey_id(&self, identity: Identity) -> Result<u32>;

    async fn load_one_time_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<OneTimePreKeyRecord>>;
    async fn load_one_time_prekeys(&self, identity: Identity)
    -> Result<Vec<OneTimePreKeyRecord>>;
    /// Removes a one-time pre-key consumed by a peer session.
    async fn remove_one_time_prekey(&self, identity: Identity, id: u32) -> Result<()>;
    /// Reserves `count` consecutive one-time pre-key ids, returning the first.
    async fn allocate_one_time_prekey_ids(&self, identity: Identity, count: u32) -> Result<u32>;

    /// Persists a freshly generated rotation in one atomic write: the signed
    /// record unaccepted, the one-time batch not yet uploaded. Runs before
    /// any network call so a crash loses no generated key material.
    async fn store_rotation(
        &self,
        identity: Identity,
        signed: &SignedPreKeyRecord,
        one_time: &[OneTimePreKeyRecord],
    ) -> Result<()>;

    /// Applies the post-upload commit in one atomic write: accept + promote
    /// the signed record (superseding the previous current), mark the
    /// uploaded one-time batch, cull per the retention policy, and reset the
    /// failure counter.
    async fn commit_rotation(
        &self,
        identity: Identity,
        signed_prekey_id: u32,
        one_time_ids: RangeInclusive<u32>,
        retention: &RetentionPolicy,
    ) -> Result<()>;

    async fn failure_count(&self, identity: Identity) -> Result<u32>;
    /// Durably increments the upload failure counter, returning the new value.
    async fn increment_failure_count(&self, identity: Identity) -> Result<u32>;
}
