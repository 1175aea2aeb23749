use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::directory::{
    DirectoryClient, KeyUploadBundle, OneTimePreKeyUpload, ServiceError, SignedPreKeyUpload,
};
use crate::keyhelper;
use crate::pipeline::ProcessingGate;
use crate::store::error::StoreError;
use crate::store::traits::PreKeyStore;
use crate::types::Identity;

/// Reports whether the account has completed registration with the directory
/// service. An unregistered account has nothing to replenish.
pub trait RegistrationStatus: Send + Sync {
    fn is_registered(&self) -> bool;
}

impl RegistrationStatus for AtomicBool {
    fn is_registered(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The remote count query failed; nothing was mutated.
    #[error("pre-key count query failed: {0}")]
    CountQuery(#[source] ServiceError),

    /// The upload failed; generated records remain persisted unaccepted.
    #[error("key upload failed: {0}")]
    Upload(#[source] ServiceError),

    /// No identity key pair exists for this identity. A misconfiguration the
    /// engine never retries on its own.
    #[error("no identity key material for {0}")]
    MissingIdentityKey(Identity),
}

impl RotationError {
    /// Whether a later run may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RotationError::MissingIdentityKey(_))
    }

    /// Whether the failure should be surfaced to alerting collaborators.
    /// Connectivity blips are expected and stay quiet; service rejections and
    /// misconfiguration are not.
    pub fn should_alert(&self) -> bool {
        match self {
            RotationError::Upload(err) => {
                !err.is_connectivity() && matches!(err.status_code(), Some(400..=599))
            }
            RotationError::MissingIdentityKey(_) => true,
            _ => false,
        }
    }
}

/// Decides when to rotate the signed pre-key and top up the one-time pool,
/// and drives the persist-upload-commit sequence for one identity at a time.
///
/// Callers must not run the engine concurrently for the same identity; the
/// scheduler serializes invocations. Within a run, generated records are
/// durably persisted before the upload and only marked accepted after the
/// directory acknowledges, so an interruption at any point leaves a state a
/// later run resolves on its own.
pub struct ReplenishmentEngine {
    store: Arc<dyn PreKeyStore>,
    directory: Arc<dyn DirectoryClient>,
    registration: Arc<dyn RegistrationStatus>,
    gate: Arc<ProcessingGate>,
    config: EngineConfig,
}

impl ReplenishmentEngine {
    pub fn new(
        store: Arc<dyn PreKeyStore>,
        directory: Arc<dyn DirectoryClient>,
        registration: Arc<dyn RegistrationStatus>,
        gate: Arc<ProcessingGate>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            registration,
            gate,
            config,
        }
    }

    pub async fn run(&self, identity: Identity) -> Result<(), RotationError> {
        if !self.registration.is_registered() {
            debug!(target: "PreKeys", "skipping {identity} refresh: not registered");
            return Ok(());
        }

        // Key state must not rotate under unresolved inbound session traffic.
        self.gate.drained().await;

        let count = self
            .directory
            .get_one_time_prekey_count(identity)
            .await
            .map_err(RotationError::CountQuery)?;
        let current = self.store.current_signed_prekey_id(identity).await?;

        if count >= self.config.min_one_time_prekey_count && current.is_some() {
            debug!(target: "PreKeys", "available {identity} keys sufficient: {count}");
            return Ok(());
        }
        info!(
            target: "PreKeys",
            "rotating {identity} keys: {count} one-time keys remaining, current signed pre-key: {current:?}"
        );

        let identity_key_pair = self
            .store
            .identity_key_pair(identity)
            .await?
            .ok_or(RotationError::MissingIdentityKey(identity))?;

        let batch_size = self.config.one_time_prekey_batch_size;
        let signed_id = self.store.allocate_signed_prekey_id(identity).await?;
        let one_time_start = self
            .store
            .allocate_one_time_prekey_ids(identity, batch_size)
            .await?;

        let signed = keyhelper::generate_signed_prekey(&identity_key_pair, signed_id);
        let one_time = keyhelper::generate_one_time_prekeys(one_time_start, batch_size);

        // Durable before the network call: a crash past this point leaves the
        // records unaccepted, a valid state for the next run to resolve.
        self.store
            .store_rotation(identity, &signed, &one_time)
            .await?;

        let bundle = KeyUploadBundle {
            identity_key: identity_key_pair.public_key,
            signed_prekey: SignedPreKeyUpload::from(&signed),
            one_time_prekeys: one_time.iter().map(OneTimePreKeyUpload::from).collect(),
        };

        match self.directory.upload_keys(identity, bundle).await {
            Ok(()) => {
                let one_time_ids = one_time_start..=one_time_start + batch_size.saturating_sub(1);
                self.store
                    .commit_rotation(identity, signed.id, one_time_ids, &self.config.retention)
                    .await?;
                info!(target: "PreKeys", "{identity} now current on signed pre-key {}", signed.id);
                Ok(())
            }
            Err(err) => {
                self.note_upload_failure(identity, &err).await;
                Err(RotationError::Upload(err))
            }
        }
    }

    /// Failure accounting: only service-classified rejections advance the
    /// consecutive-failure counter that alerting collaborators watch.
    async fn note_upload_failure(&self, identity: Identity, err: &ServiceError) {
        if err.is_connectivity() {
            debug!(target: "PreKeys", "not counting {identity} upload failure: {err}");
            return;
        }
        match err.status_code() {
            Some(code) if (400..=599).contains(&code) => {
                match self.store.increment_failure_count(identity).await {
                    Ok(failures) => warn!(
                        target: "PreKeys",
                        "service rejected {identity} key upload with status {code} ({failures} consecutive failures)"
                    ),
                    Err(store_err) => error!(
                        target: "PreKeys",
                        "failed to record {identity} upload failure: {store_err}"
                    ),
                }
            }
            _ => {
                debug!(target: "PreKeys", "not counting {identity} upload failure from non-service error: {err}")
            }
        }
    }
}
