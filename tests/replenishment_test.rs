// tests/replenishment_test.rs
//
// Exercises the replenishment decision algorithm end to end against an
// in-memory store and a scripted directory client: the cheap no-op path,
// full rotations with culling, and the failure accounting that separates
// connectivity blips from service-classified rejections.

use async_trait::async_trait;
use prekey_engine::config::{EngineConfig, RetentionPolicy};
use prekey_engine::crypto::key_pair::verify_prekey_signature;
use prekey_engine::directory::{DirectoryClient, KeyUploadBundle, ServiceError};
use prekey_engine::engine::{ReplenishmentEngine, RotationError};
use prekey_engine::keyhelper;
use prekey_engine::pipeline::ProcessingGate;
use prekey_engine::state::SignedPreKeyState;
use prekey_engine::store::memory::MemoryStore;
use prekey_engine::store::traits::PreKeyStore;
use prekey_engine::types::Identity;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Copy)]
enum UploadBehavior {
    Succeed,
    Connectivity,
    Status(u16),
}

/// Directory client double with a scripted remote count and upload outcome.
struct ScriptedDirectory {
    count: AtomicU32,
    count_query_fails: AtomicBool,
    upload_behavior: Mutex<UploadBehavior>,
    uploads: Mutex<Vec<KeyUploadBundle>>,
}

impl ScriptedDirectory {
    fn new(count: u32) -> Self {
        Self {
            count: AtomicU32::new(count),
            count_query_fails: AtomicBool::new(false),
            upload_behavior: Mutex::new(UploadBehavior::Succeed),
            uploads: Mutex::new(Vec::new()),
        }
    }

    fn set_count(&self, count: u32) {
        self.count.store(count, Ordering::SeqCst);
    }

    fn fail_count_queries(&self) {
        self.count_query_fails.store(true, Ordering::SeqCst);
    }

    async fn set_upload_behavior(&self, behavior: UploadBehavior) {
        *self.upload_behavior.lock().await = behavior;
    }

    async fn recorded_uploads(&self) -> Vec<KeyUploadBundle> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl DirectoryClient for ScriptedDirectory {
    async fn get_one_time_prekey_count(&self, _identity: Identity) -> Result<u32, ServiceError> {
        if self.count_query_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Connectivity("directory unreachable".into()));
        }
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn upload_keys(
        &self,
        _identity: Identity,
        bundle: KeyUploadBundle,
    ) -> Result<(), ServiceError> {
        match *self.upload_behavior.lock().await {
            UploadBehavior::Succeed => {
                self.uploads.lock().await.push(bundle);
                Ok(())
            }
            UploadBehavior::Connectivity => {
                Err(ServiceError::Connectivity("socket closed".into()))
            }
            UploadBehavior::Status(code) => Err(ServiceError::Status(code)),
        }
    }
}

struct Harness {
    engine: Arc<ReplenishmentEngine>,
    store: Arc<MemoryStore>,
    directory: Arc<ScriptedDirectory>,
    registered: Arc<AtomicBool>,
    gate: Arc<ProcessingGate>,
}

async fn harness(remote_count: u32) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = Arc::new(MemoryStore::new());
    store
        .set_identity_key_pair(Identity::Account, &keyhelper::generate_identity_key_pair())
        .await
        .unwrap();

    let directory = Arc::new(ScriptedDirectory::new(remote_count));
    let registered = Arc::new(AtomicBool::new(true));
    let gate = Arc::new(ProcessingGate::new());

    let engine = Arc::new(ReplenishmentEngine::new(
        store.clone(),
        directory.clone(),
        registered.clone(),
        gate.clone(),
        EngineConfig::default(),
    ));

    Harness {
        engine,
        store,
        directory,
        registered,
        gate,
    }
}

#[tokio::test]
async fn low_count_with_no_current_key_rotates_fully() {
    let h = harness(10).await;

    h.engine.run(Identity::Account).await.unwrap();

    let signed = h.store.load_signed_prekeys(Identity::Account).await.unwrap();
    assert_eq!(signed.len(), 1);
    assert!(signed[0].accepted_by_service);
    assert_eq!(
        h.store
            .signed_prekey_state(Identity::Account, signed[0].id)
            .await
            .unwrap(),
        Some(SignedPreKeyState::Current)
    );

    let one_time = h
        .store
        .load_one_time_prekeys(Identity::Account)
        .await
        .unwrap();
    assert_eq!(one_time.len(), 100);
    assert!(one_time.iter().all(|record| record.uploaded));

    let uploads = h.directory.recorded_uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].one_time_prekeys.len(), 100);

    // The uploaded signature must verify against the uploaded identity key.
    assert!(verify_prekey_signature(
        &uploads[0].identity_key,
        &uploads[0].signed_prekey.public_key,
        &uploads[0].signed_prekey.signature,
    ));

    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 0);
}

#[tokio::test]
async fn sufficient_count_with_current_key_is_a_noop() {
    let h = harness(10).await;
    h.engine.run(Identity::Account).await.unwrap();

    h.directory.set_count(50);
    h.engine.run(Identity::Account).await.unwrap();

    // No second upload, no new records.
    assert_eq!(h.directory.recorded_uploads().await.len(), 1);
    assert_eq!(
        h.store
            .load_signed_prekeys(Identity::Account)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        h.store
            .load_one_time_prekeys(Identity::Account)
            .await
            .unwrap()
            .len(),
        100
    );
}

#[tokio::test]
async fn missing_current_key_rotates_even_with_plenty_of_one_time_keys() {
    let h = harness(50).await;

    h.engine.run(Identity::Account).await.unwrap();

    // Both generation actions run together: a fresh signed record and a full
    // one-time batch.
    let uploads = h.directory.recorded_uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].one_time_prekeys.len(), 100);
    assert!(
        h.store
            .current_signed_prekey_id(Identity::Account)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn unregistered_account_is_a_silent_noop() {
    let h = harness(0).await;
    h.registered.store(false, Ordering::SeqCst);

    h.engine.run(Identity::Account).await.unwrap();

    assert!(h.directory.recorded_uploads().await.is_empty());
    assert!(
        h.store
            .load_signed_prekeys(Identity::Account)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn count_query_failure_aborts_before_any_mutation() {
    let h = harness(0).await;
    h.directory.fail_count_queries();

    let err = h.engine.run(Identity::Account).await.unwrap_err();
    assert!(matches!(err, RotationError::CountQuery(_)));
    assert!(err.is_retryable());

    assert!(
        h.store
            .load_signed_prekeys(Identity::Account)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        h.store
            .load_one_time_prekeys(Identity::Account)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn connectivity_failure_is_not_counted_and_leaves_retryable_state() {
    let h = harness(0).await;
    h.directory
        .set_upload_behavior(UploadBehavior::Connectivity)
        .await;

    let err = h.engine.run(Identity::Account).await.unwrap_err();
    assert!(matches!(err, RotationError::Upload(_)));
    assert!(!err.should_alert());
    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 0);

    // Generated records persist unaccepted, ready for the next attempt.
    let signed = h.store.load_signed_prekeys(Identity::Account).await.unwrap();
    assert_eq!(signed.len(), 1);
    assert!(!signed[0].accepted_by_service);
    assert_eq!(
        h.store
            .signed_prekey_state(Identity::Account, signed[0].id)
            .await
            .unwrap(),
        Some(SignedPreKeyState::Generated)
    );
    assert!(
        h.store
            .current_signed_prekey_id(Identity::Account)
            .await
            .unwrap()
            .is_none()
    );

    // The retry generates a fresh batch and succeeds with a new id.
    h.directory
        .set_upload_behavior(UploadBehavior::Succeed)
        .await;
    h.engine.run(Identity::Account).await.unwrap();

    let current = h
        .store
        .current_signed_prekey_id(Identity::Account)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current, 2);
    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 0);
}

#[tokio::test]
async fn service_rejection_increments_counter_until_success_resets_it() {
    let h = harness(0).await;
    h.directory
        .set_upload_behavior(UploadBehavior::Status(500))
        .await;

    let err = h.engine.run(Identity::Account).await.unwrap_err();
    assert!(err.should_alert());
    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 1);

    h.engine.run(Identity::Account).await.unwrap_err();
    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 2);

    h.directory
        .set_upload_behavior(UploadBehavior::Succeed)
        .await;
    h.engine.run(Identity::Account).await.unwrap();
    assert_eq!(h.store.failure_count(Identity::Account).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_identity_key_is_fatal_without_side_effects() {
    let h = harness(0).await;

    let err = h.engine.run(Identity::Phone).await.unwrap_err();
    assert!(matches!(err, RotationError::MissingIdentityKey(Identity::Phone)));
    assert!(!err.is_retryable());

    assert!(h.directory.recorded_uploads().await.is_empty());
    assert!(
        h.store
            .load_signed_prekeys(Identity::Phone)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn engine_waits_for_message_pipeline_to_drain() {
    let h = harness(0).await;
    h.gate.task_started();

    let engine = h.engine.clone();
    let run = tokio::spawn(async move { engine.run(Identity::Account).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!run.is_finished());
    assert!(h.directory.recorded_uploads().await.is_empty());

    h.gate.task_finished();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("engine should finish once the pipeline drains")
        .unwrap()
        .unwrap();
    assert_eq!(h.directory.recorded_uploads().await.len(), 1);
}

#[tokio::test]
async fn repeated_rotations_cull_beyond_the_retention_window() {
    let h = harness(0).await;
    let retention = RetentionPolicy::default().retained_signed_prekeys;

    for _ in 0..6 {
        // Remote count stays at 0, so every run rotates.
        h.engine.run(Identity::Account).await.unwrap();
    }

    let signed = h.store.load_signed_prekeys(Identity::Account).await.unwrap();
    assert_eq!(signed.len(), retention + 1);

    let current = h
        .store
        .current_signed_prekey_id(Identity::Account)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current, 6);
    for record in &signed {
        let state = h
            .store
            .signed_prekey_state(Identity::Account, record.id)
            .await
            .unwrap()
            .unwrap();
        if record.id == current {
            assert_eq!(state, SignedPreKeyState::Current);
        } else {
            assert_eq!(state, SignedPreKeyState::Superseded);
        }
    }
}

#[tokio::test]
async fn upload_bundles_never_carry_private_key_material() {
    let h = harness(0).await;
    h.engine.run(Identity::Account).await.unwrap();

    let uploads = h.directory.recorded_uploads().await;
    let serialized = serde_json::to_string(&uploads[0]).unwrap();
    assert!(!serialized.contains("private"));

    let signed = h.store.load_signed_prekeys(Identity::Account).await.unwrap();
    assert_eq!(
        uploads[0].signed_prekey.public_key,
        signed[0].key_pair.public_key
    );
}
