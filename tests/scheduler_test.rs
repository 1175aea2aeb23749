// tests/scheduler_test.rs
//
// Scheduler plumbing: an immediate first pass over every identity, early
// passes on a refresh nudge, outcome events for alerting collaborators, and
// a clean shutdown.

use async_trait::async_trait;
use prekey_engine::config::EngineConfig;
use prekey_engine::directory::{DirectoryClient, KeyUploadBundle, ServiceError};
use prekey_engine::engine::ReplenishmentEngine;
use prekey_engine::keyhelper;
use prekey_engine::pipeline::ProcessingGate;
use prekey_engine::scheduler::ReplenishmentScheduler;
use prekey_engine::store::memory::MemoryStore;
use prekey_engine::store::traits::PreKeyStore;
use prekey_engine::types::Identity;
use prekey_engine::types::events::RotationEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Always-empty directory that accepts every upload and counts them.
#[derive(Default)]
struct CountingDirectory {
    uploads: AtomicUsize,
}

#[async_trait]
impl DirectoryClient for CountingDirectory {
    async fn get_one_time_prekey_count(&self, _identity: Identity) -> Result<u32, ServiceError> {
        Ok(0)
    }

    async fn upload_keys(
        &self,
        _identity: Identity,
        _bundle: KeyUploadBundle,
    ) -> Result<(), ServiceError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<RotationEvent>) -> RotationEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("scheduler should emit an event")
        .expect("event channel should stay open")
}

#[tokio::test]
async fn first_pass_runs_immediately_and_emits_per_identity_events() {
    let store = Arc::new(MemoryStore::new());
    for identity in Identity::ALL {
        store
            .set_identity_key_pair(identity, &keyhelper::generate_identity_key_pair())
            .await
            .unwrap();
    }
    let directory = Arc::new(CountingDirectory::default());

    let engine = Arc::new(ReplenishmentEngine::new(
        store.clone(),
        directory.clone(),
        Arc::new(AtomicBool::new(true)),
        Arc::new(ProcessingGate::new()),
        EngineConfig::default(),
    ));
    let (scheduler, mut events) =
        ReplenishmentScheduler::new(engine, Identity::ALL.to_vec());
    let shutdown = scheduler.shutdown_handle();
    let refresh = scheduler.refresh_handle();
    let task = tokio::spawn(scheduler.run());

    for expected in Identity::ALL {
        match next_event(&mut events).await {
            RotationEvent::Succeeded { identity } => assert_eq!(identity, expected),
            other => panic!("expected success for {expected}, got {other:?}"),
        }
    }
    assert_eq!(directory.uploads.load(Ordering::SeqCst), 2);

    // A nudge starts the next pass long before the interval elapses.
    refresh.notify_one();
    for _ in Identity::ALL {
        match next_event(&mut events).await {
            RotationEvent::Succeeded { .. } => {}
            other => panic!("expected success on refresh pass, got {other:?}"),
        }
    }

    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler should exit on shutdown")
        .unwrap();
}

#[tokio::test]
async fn failures_are_reported_with_their_classification() {
    // No identity key for either identity: every run fails fatally.
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ReplenishmentEngine::new(
        store,
        Arc::new(CountingDirectory::default()),
        Arc::new(AtomicBool::new(true)),
        Arc::new(ProcessingGate::new()),
        EngineConfig::default(),
    ));
    let (scheduler, mut events) =
        ReplenishmentScheduler::new(engine, vec![Identity::Account]);
    let shutdown = scheduler.shutdown_handle();
    let task = tokio::spawn(scheduler.run());

    match next_event(&mut events).await {
        RotationEvent::Failed {
            identity,
            reportable,
            ..
        } => {
            assert_eq!(identity, Identity::Account);
            assert!(reportable);
        }
        other => panic!("expected a failure event, got {other:?}"),
    }

    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler should exit on shutdown")
        .unwrap();
}
