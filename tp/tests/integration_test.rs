//! Integration tests for Tapdinner
//!
//! Sessions wired to shared in-memory and on-disk collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tapdinner::codec::Status;
use tapdinner::session::{PlannerHandle, PlannerSession};
use tapdinner::store::{FileSlots, LocalStore, MemorySlots};
use tapdinner::sync::{ChannelId, LogObserver, MemoryRemote, RemoteStore, SyncEvent, SyncEventBus, SyncState};
use tempfile::TempDir;

fn spawn(remote: &MemoryRemote) -> PlannerHandle {
    PlannerSession::spawn(
        LocalStore::new(MemorySlots::new()),
        Arc::new(remote.clone()),
        Arc::new(LogObserver),
    )
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

async fn member_names(session: &PlannerHandle) -> Vec<String> {
    session
        .members()
        .await
        .expect("session alive")
        .into_iter()
        .map(|m| m.name)
        .collect()
}

/// Poll until the session's member names match `expected`
async fn wait_for_members(session: &PlannerHandle, expected: &[&str]) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if member_names(session).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "members never became {:?}, still {:?}",
        expected,
        member_names(session).await
    );
}

// =============================================================================
// Sync convergence
// =============================================================================

#[tokio::test]
async fn test_two_sessions_converge_to_last_writer() {
    let remote = MemoryRemote::new();
    let a = spawn(&remote);
    let b = spawn(&remote);

    a.add_member("Mom").await.unwrap();
    a.set_channel_secret("Family Chat!").await.unwrap();
    a.flush().await.unwrap();

    // B joins later with its own data and overwrites the channel
    b.add_member("Dad").await.unwrap();
    b.set_channel_secret("family chat?").await.unwrap();
    b.flush().await.unwrap();

    wait_for_members(&a, &["Dad"]).await;
    wait_for_members(&b, &["Dad"]).await;

    // A later edit on A flows back to B
    let dad = a.find_member("Dad").await.unwrap().expect("Dad on A");
    a.set_status(&dad.id, day("2024-01-07")).await.unwrap();
    a.flush().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = b.snapshot().await.unwrap();
            if !snapshot.status_grid.is_empty() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("grid change reaches B");
    assert_eq!(
        result.status_grid.get(&format!("{}_2024-01-07", dad.id)),
        Some(&Status::Eating)
    );

    let info = b.sync_info().await.unwrap();
    assert_eq!(info.state, SyncState::Synced);
    assert_eq!(info.channel, Some(ChannelId::derive("Family Chat!")));
}

#[tokio::test]
async fn test_malformed_remote_leaves_local_state() {
    let remote = MemoryRemote::new();
    let bus = SyncEventBus::default();
    let mut events = bus.subscribe();
    let session = PlannerSession::spawn(
        LocalStore::new(MemorySlots::new()),
        Arc::new(remote.clone()),
        Arc::new(bus.clone()),
    );

    session.add_member("Mom").await.unwrap();
    let channel = session.set_channel_secret("family").await.unwrap();
    session.flush().await.unwrap();

    remote
        .write(
            &channel,
            json!({
                "members": [{"id": "x", "name": "Intruder"}, {"id": "x", "name": "Twin"}],
                "dinnerData": {},
            }),
        )
        .await
        .unwrap();

    let ignored = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SyncEvent::RemoteIgnored { reason, .. } = events.recv().await.unwrap() {
                return reason;
            }
        }
    })
    .await
    .expect("malformed snapshot reported");
    assert!(ignored.contains("duplicate"));
    assert_eq!(member_names(&session).await, vec!["Mom"]);
}

#[tokio::test]
async fn test_rekey_ignores_old_channel() {
    let remote = MemoryRemote::new();
    let session = spawn(&remote);
    session.add_member("Mom").await.unwrap();

    let old = session.set_channel_secret("old-house").await.unwrap();
    session.flush().await.unwrap();
    let new = session.set_channel_secret("new-house").await.unwrap();
    session.flush().await.unwrap();
    assert_ne!(old, new);

    remote
        .write(&old, json!({"members": [{"id": "o1", "name": "OldNeighbor"}]}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(member_names(&session).await, vec!["Mom"]);
    assert_eq!(remote.subscriber_count(&old), 0);

    remote
        .write(&new, json!({"members": [{"id": "n1", "name": "NewNeighbor"}]}))
        .await
        .unwrap();
    wait_for_members(&session, &["NewNeighbor"]).await;
}

#[tokio::test]
async fn test_push_failure_keeps_local_state() {
    let remote = MemoryRemote::new();
    remote.set_fail_writes(true);
    let bus = SyncEventBus::default();
    let mut events = bus.subscribe();
    let session = PlannerSession::spawn(
        LocalStore::new(MemorySlots::new()),
        Arc::new(remote.clone()),
        Arc::new(bus.clone()),
    );

    session.set_channel_secret("family").await.unwrap();
    session.add_member("Mom").await.unwrap();
    session.flush().await.unwrap();

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::PushFailed { .. }) {
            failures += 1;
        }
    }
    assert_eq!(failures, 2);
    assert_eq!(member_names(&session).await, vec!["Mom"]);
    assert_eq!(session.sync_info().await.unwrap().state, SyncState::Subscribed);
}

// =============================================================================
// Local persistence
// =============================================================================

#[tokio::test]
async fn test_file_backed_session_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let remote = MemoryRemote::new();

    let first = PlannerSession::spawn(
        LocalStore::new(FileSlots::open(temp_dir.path()).unwrap()),
        Arc::new(remote.clone()),
        Arc::new(LogObserver),
    );
    let mom = first.add_member("Mom").await.unwrap();
    first.set_status(&mom.id, day("2024-01-07")).await.unwrap();
    first.set_channel_secret("family").await.unwrap();
    first.flush().await.unwrap();
    first.shutdown().await.unwrap();

    let second = PlannerSession::spawn(
        LocalStore::new(FileSlots::open(temp_dir.path()).unwrap()),
        Arc::new(remote.clone()),
        Arc::new(LogObserver),
    );
    let snapshot = second.snapshot().await.unwrap();
    assert_eq!(snapshot.members, vec![mom.clone()]);
    assert_eq!(snapshot.status_grid.len(), 1);

    let info = second.sync_info().await.unwrap();
    assert_eq!(info.secret.as_deref(), Some("family"));
    assert_eq!(info.channel, Some(ChannelId::derive("family")));
}
