use crate::config::RetentionPolicy;
use crate::crypto::key_pair::KeyPair;
use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord, SignedPreKeyState};
use crate::store::IdentityKeyState;
use crate::store::error::{Result, StoreError};
use crate::store::traits::PreKeyStore;
use crate::types::Identity;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// File-backed store. Each identity's full state lives in one JSON snapshot
/// that is replaced via write-to-temp-then-rename, which is what makes the
/// multi-field rotation writes atomic across crashes.
pub struct FileStore {
    base_path: PathBuf,
    states: Mutex<HashMap<Identity, IdentityKeyState>>,
}

impl FileStore {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = path.into();
        for identity in Identity::ALL {
            fs::create_dir_all(base_path.join(identity.as_str())).await?;
        }
        Ok(Self {
            base_path,
            states: Mutex::new(HashMap::new()),
        })
    }

    fn state_path(&self, identity: Identity) -> PathBuf {
        self.base_path.join(identity.as_str()).join("state.json")
    }

    async fn load_from_disk(&self, identity: Identity) -> Result<IdentityKeyState> {
        match fs::read(self.state_path(identity)).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(IdentityKeyState::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn persist(&self, identity: Identity, state: &IdentityKeyState) -> Result<()> {
        let path = self.state_path(identity);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read<R>(
        &self,
        identity: Identity,
        f: impl FnOnce(&IdentityKeyState) -> R,
    ) -> Result<R> {
        let mut states = self.states.lock().await;
        let state = match states.entry(identity) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.load_from_disk(identity).await?),
        };
        Ok(f(state))
    }

    async fn mutate<R>(
        &self,
        identity: Identity,
        f: impl FnOnce(&mut IdentityKeyState) -> R,
    ) -> Result<R> {
        let mut states = self.states.lock().await;
        let state = match states.entry(identity) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.load_from_disk(identity).await?),
        };
        let result = f(&mut *state);
        self.persist(identity, &*state).await?;
        Ok(result)
    }
}

#[async_trait]
impl PreKeyStore for FileStore {
    async fn identity_key_pair(&self, identity: Identity) -> Result<Option<KeyPair>> {
        self.read(identity, |state| state.identity_key.clone()).await
    }

    async fn set_identity_key_pair(&self, identity: Identity, key_pair: &KeyPair) -> Result<()> {
        let key_pair = key_pair.clone();
        self.mutate(identity, |state| state.identity_key = Some(key_pair))
            .await
    }

    async fn load_signed_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyRecord>> {
        self.read(identity, |state| state.signed_prekeys.get(&id).cloned())
            .await
    }

    async fn load_signed_prekeys(&self, identity: Identity) -> Result<Vec<SignedPreKeyRecord>> {
        self.read(identity, |state| {
            state.signed_prekeys.values().cloned().collect()
        })
        .await
    }

    async fn current_signed_prekey_id(&self, identity: Identity) -> Result<Option<u32>> {
        self.read(identity, |state| state.current_signed_prekey_id)
            .await
    }

    async fn signed_prekey_state(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<SignedPreKeyState>> {
        self.read(identity, |state| state.signed_prekey_state(id))
            .await
    }

    async fn allocate_signed_prekey_id(&self, identity: Identity) -> Result<u32> {
        self.mutate(identity, |state| {
            let id = state.next_signed_prekey_id;
            state.next_signed_prekey_id += 1;
            id
        })
        .await
    }

    async fn load_one_time_prekey(
        &self,
        identity: Identity,
        id: u32,
    ) -> Result<Option<OneTimePreKeyRecord>> {
        self.read(identity, |state| state.one_time_prekeys.get(&id).cloned())
            .await
    }

    async fn load_one_time_prekeys(
        &self,
        identity: Identity,
    ) -> Result<Vec<OneTimePreKeyRecord>> {
        self.read(identity, |state| {
            state.one_time_prekeys.values().cloned().collect()
        })
        .await
    }

    async fn remove_one_time_prekey(&self, identity: Identity, id: u32) -> Result<()> {
        self.mutate(identity, |state| {
            state.one_time_prekeys.remove(&id);
        })
        .await
    }

    async fn allocate_one_time_prekey_ids(&self, identity: Identity, count: u32) -> Result<u32> {
        self.mutate(identity, |state| {
            let start = state.next_one_time_prekey_id;
            state.next_one_time_prekey_id += count;
            start
        })
        .await
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
            .await
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
        .await?
    }

    async fn failure_count(&self, identity: Identity) -> Result<u32> {
        self.read(identity, |state| state.failure_count).await
    }

    async fn increment_failure_count(&self, identity: Identity) -> Result<u32> {
        self.mutate(identity, |state| {
            state.failure_count += 1;
            state.failure_count
        })
        .await
    }
}
