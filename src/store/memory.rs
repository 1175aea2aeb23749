use crate::config::RetentionPolicy;
use crate::crypto::key_pair::KeyPair;
use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord, SignedPreKeyState};
use crate::store::IdentityKeyState;
use crate::store::error::Result;
use crate::store::traits::PreKeyStore;
use crate::types::Identity;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tokio::sync::Mutex;

/// In-memory store. Nothing survives a restart; useful for tests and for
/// ephemeral deployments that re-register on startup.
#[derive(Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<Identity, IdentityKeyState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<R>(&self, identity: Identity, f: impl FnOnce(&IdentityKeyState) -> R) -> R {
        let mut states = self.states.lock().await;
        f(states.entry(identity).or_default())
    }

    async fn mutate<R>(&self, identity: Identity, f: impl FnOnce(&mut IdentityKeyState) -> R) -> R {
        let mut states = self.states.lock().await;
        f(states.entry(identity).or_default())
    }
}

#[async_trait]
impl PreKeyStore for MemoryStore {
    async fn identity_key_pair(&self, identity: Identity) -> Result<Option<KeyPair>> {
        Ok(self.read(identity, |state| state.identity_key.clone()).await)
    }

    async fn set_identity_key_pair(&self, identity: Identity, key_pair: &KeyPair) -> Result<()> {
        let key_pair = key_pair.clone();
        self.mutate(identity, |state| state.identity_key = Some(key_pair))
            .await;
        Ok(())
    }

    async fn load_signed_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyRecord>> {
        Ok(self
            .read(identity, |state| state.signed_prekeys.get(&id).cloned())
            .await)
    }

    async fn load_signed_prekeys(&self, identity: Identity) -> Result<Vec<SignedPreKeyRecord>> {
        Ok(self
            .read(identity, |state| {
                state.signed_prekeys.values().cloned().collect()
            })
            .await)
    }

    async fn current_signed_prekey_id(&self, identity: Identity) -> Result<Option<u32>> {
        Ok(self
            .read(identity, |state| state.current_signed_prekey_id)
            .await)
    }

    async fn signed_prekey_state(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyState>> {
        Ok(self
            .read(identity, |state| state.signed_prekey_state(id))
            .await)
    }

    async fn allocate_signed_prekey_id(&self, identity: Identity) -> Result<u32> {
        Ok(self
            .mutate(identity, |state| {
                let id = state.next_signed_prekey_id;
                state.next_signed_prekey_id += 1;
                id
            })
            .await)
    }

    async fn load_one_time_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<OneTimePreKeyRecord>> {
        Ok(self
            .read(identity, |state| state.one_time_prekeys.get(&id).cloned())
            .await)
    }

    async fn load_one_time_prekeys(
        &self,
        identity: Identity,
    ) -> Result<Vec<OneTimePreKeyRecord>> {
        Ok(self
            .read(identity, |state| {
                state.one_time_prekeys.values().cloned().collect()
            })
            .await)
    }

    async fn remove_one_time_prekey(&self, identity: Identity, id: u32) -> Result<()> {
        self.mutate(identity, |state| {
            state.one_time_prekeys.remove(&id);
        })
        .await;
        Ok(())
    }

    async fn allocate_one_time_prekey_ids(&self, identity: Identity, count: u32) -> Result<u32> {
        Ok(self
            .mutate(identity, |state| {
                let start = state.next_one_time_prekey_id;
                state.next_one_time_prekey_id += count;
                start
            })
            .await)
    }

    async fn store_rotation(
        &self,
        identity: Identity,
        signed: &SignedPreKeyRecord,
        one_time: &[OneTimePreKeyRecord],
    ) -> Result<()> {
        let signed = signed.clone();
        let one_time = one_time.to_vec();
        self.mutate(identity, |state| state.insert_rotation(signed, one_time))
            .await;
        Ok(())
    }

    async fn commit_rotation(
        &self,
        identity: Identity,
        signed_prekey_id: u32,
        one_time_ids: RangeInclusive<u32>,
        retention: &RetentionPolicy,
    ) -> Result<()> {
        self.mutate(identity, |state| {
            state.commit_rotation(signed_prekey_id, one_time_ids, retention, Utc::now())
        })
        .await
    }

    async fn failure_count(&self, identity: Identity) -> Result<u32> {
        Ok(self.read(identity, |state| state.failure_count).await)
    }

    async fn increment_failure_count(&self, identity: Identity) -> Result<u32> {
        Ok(self
            .mutate(identity, |state| {
                state.failure_count += 1;
                state.failure_count
            })
            .await)
    }
}
