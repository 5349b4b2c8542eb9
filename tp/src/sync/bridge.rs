//! SyncBridge - channel lifecycle, push-on-write and remote overwrite
//!
//! The bridge never touches planner state itself. Its background link task
//! reports back through a [`LinkEvent`] channel that the owning session reads
//! on its own task, and [`SyncBridge::handle`] turns those reports into
//! state transitions plus, for accepted remote documents, a snapshot to
//! apply.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::document;
use super::{ChannelId, RemoteStore, RemoteStream, SyncError, SyncEvent, SyncObserver};
use crate::domain::Snapshot;
use crate::error::ValidationError;

/// Bridge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No channel secret set
    #[default]
    Disconnected,
    /// Listening on a channel, nothing confirmed yet
    Subscribed,
    /// At least one push or pull completed
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Report from a link task, tagged with the subscription it belongs to
#[derive(Debug)]
pub struct LinkEvent {
    pub generation: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug)]
pub enum LinkEventKind {
    Pushed { at: DateTime<Utc> },
    PushFailed { error: String },
    Remote(Option<Value>),
    SubscribeFailed { error: String },
    /// Every job queued before the flush request has been processed
    Flushed(oneshot::Sender<()>),
}

/// Work queued for the link task, processed in order
enum LinkJob {
    Push(Value),
    Flush(oneshot::Sender<()>),
}

/// Own writes remembered while waiting for their echo
const ECHO_WINDOW: usize = 64;

/// A document this bridge wrote, kept until the listener hands it back
struct SentWrite {
    seq: u64,
    document: Value,
    confirmed: bool,
}

/// One live subscription; dropping it stops the listener
struct Link {
    channel: ChannelId,
    jobs: mpsc::UnboundedSender<LinkJob>,
    task: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Passphrase-keyed mirror of the planner on a remote store
///
/// Holds at most one subscription. Each subscription gets a new generation
/// number and reports from older generations are discarded.
pub struct SyncBridge {
    remote: Arc<dyn RemoteStore>,
    observer: Arc<dyn SyncObserver>,
    link_tx: mpsc::Sender<LinkEvent>,
    state: SyncState,
    secret: Option<String>,
    generation: u64,
    link: Option<Link>,
    sent: VecDeque<SentWrite>,
    last_seq: u64,
}

impl SyncBridge {
    /// Create a disconnected bridge reporting on `link_tx`
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        observer: Arc<dyn SyncObserver>,
        link_tx: mpsc::Sender<LinkEvent>,
    ) -> Self {
        debug!(backend = remote.name(), "SyncBridge::new: called");
        Self {
            remote,
            observer,
            link_tx,
            state: SyncState::Disconnected,
            secret: None,
            generation: 0,
            link: None,
            sent: VecDeque::new(),
            last_seq: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn channel(&self) -> Option<&ChannelId> {
        self.link.as_ref().map(|link| &link.channel)
    }

    /// Current subscription generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn backend(&self) -> &'static str {
        self.remote.name()
    }

    /// Pushes queued on the link that have not reported back yet
    pub fn pending_pushes(&self) -> usize {
        self.sent.iter().filter(|write| !write.confirmed).count()
    }

    /// Switch to the channel for `secret`
    ///
    /// Tears down the previous subscription first, then pushes `initial` and
    /// starts listening. Must be called inside a tokio runtime.
    pub fn connect(&mut self, secret: &str, initial: &Snapshot) -> Result<ChannelId, ValidationError> {
        let secret = secret.trim();
        if secret.is_empty() {
            debug!("connect: empty secret");
            return Err(ValidationError::EmptySecret);
        }

        self.teardown();
        self.generation += 1;
        let channel = ChannelId::derive(secret);
        info!(%channel, generation = self.generation, backend = self.remote.name(), "Connecting sync channel");

        self.sent.clear();
        let initial = document::encode(initial);
        self.record(&initial);

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let reporter = Reporter {
            generation: self.generation,
            tx: self.link_tx.clone(),
        };
        let task = tokio::spawn(run_link(
            self.remote.clone(),
            channel.clone(),
            initial,
            jobs_rx,
            reporter,
        ));

        self.link = Some(Link {
            channel: channel.clone(),
            jobs: jobs_tx,
            task,
        });
        self.secret = Some(secret.to_string());
        self.state = SyncState::Subscribed;
        self.observer.on_sync_event(&SyncEvent::Connected {
            channel: channel.clone(),
        });
        Ok(channel)
    }

    /// Queue a full snapshot for delivery
    ///
    /// Returns false when there is no active channel.
    pub fn push(&mut self, snapshot: &Snapshot) -> bool {
        let Some(link) = &self.link else {
            debug!("push: not connected, skipping");
            return false;
        };
        debug!(channel = %link.channel, members = snapshot.members.len(), "push: called");
        let document = document::encode(snapshot);
        if link.jobs.send(LinkJob::Push(document.clone())).is_err() {
            warn!(channel = %link.channel, "push: link task is gone");
            self.observer.on_sync_event(&SyncEvent::PushFailed {
                channel: link.channel.clone(),
                error: "sync link stopped".to_string(),
            });
            return false;
        }
        self.record(&document);
        true
    }

    fn record(&mut self, document: &Value) {
        self.last_seq += 1;
        if self.sent.len() == ECHO_WINDOW {
            self.sent.pop_front();
        }
        self.sent.push_back(SentWrite {
            seq: self.last_seq,
            document: document.clone(),
            confirmed: false,
        });
    }

    /// Whether `snapshot` is one of our own writes that a later local write superseded
    ///
    /// Forgets every remembered write up to the match, since the listener
    /// delivers in write order.
    fn is_stale_echo(&mut self, snapshot: &Snapshot) -> bool {
        let document = document::encode(snapshot);
        let Some(pos) = self.sent.iter().position(|write| write.document == document) else {
            return false;
        };
        let seq = self.sent[pos].seq;
        self.sent.drain(..=pos);
        seq < self.last_seq
    }

    /// Signal `reply` once every push queued so far has been attempted
    ///
    /// The reply travels back as a link event, so reports for those pushes
    /// are handled before it fires.
    pub fn flush(&self, reply: oneshot::Sender<()>) {
        match &self.link {
            Some(link) => {
                if let Err(mpsc::error::SendError(LinkJob::Flush(reply))) = link.jobs.send(LinkJob::Flush(reply)) {
                    let _ = reply.send(());
                }
            }
            None => {
                let _ = reply.send(());
            }
        }
    }

    /// Stop listening and forget the channel
    pub fn disconnect(&mut self) {
        debug!(state = %self.state, "disconnect: called");
        let was_connected = self.link.is_some();
        self.teardown();
        self.secret = None;
        self.state = SyncState::Disconnected;
        if was_connected {
            self.observer.on_sync_event(&SyncEvent::Disconnected);
        }
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            info!(channel = %link.channel, generation = self.generation, "Stopping sync channel");
            drop(link);
        }
    }

    /// Process a link report
    ///
    /// Returns the snapshot to apply when a remote document was accepted.
    pub fn handle(&mut self, event: LinkEvent) -> Option<Snapshot> {
        let LinkEvent { generation, kind } = event;
        let kind = match kind {
            LinkEventKind::Flushed(reply) => {
                let _ = reply.send(());
                return None;
            }
            other => other,
        };

        let Some(link) = &self.link else {
            debug!(generation, "handle: no active link, dropping event");
            return None;
        };
        if generation != self.generation {
            debug!(generation, current = self.generation, "handle: stale link event dropped");
            return None;
        }
        let channel = link.channel.clone();

        match kind {
            LinkEventKind::Flushed(_) => None,
            LinkEventKind::Pushed { at } => {
                if let Some(write) = self.sent.iter_mut().find(|write| !write.confirmed) {
                    write.confirmed = true;
                }
                self.state = SyncState::Synced;
                self.observer.on_sync_event(&SyncEvent::Pushed { channel, at });
                None
            }
            LinkEventKind::PushFailed { error } => {
                // Never written, so never echoed
                if let Some(pos) = self.sent.iter().position(|write| !write.confirmed) {
                    self.sent.remove(pos);
                }
                warn!(%channel, %error, "Push failed, keeping local state");
                self.observer.on_sync_event(&SyncEvent::PushFailed { channel, error });
                None
            }
            LinkEventKind::SubscribeFailed { error } => {
                warn!(%channel, %error, "Remote listener failed");
                self.observer.on_sync_event(&SyncEvent::SubscribeFailed { channel, error });
                None
            }
            LinkEventKind::Remote(None) => {
                debug!(%channel, "handle: channel is empty");
                self.ignore(channel, "channel is empty".to_string());
                None
            }
            LinkEventKind::Remote(Some(value)) => match document::decode(value) {
                Ok(snapshot) if snapshot.is_blank() => {
                    self.ignore(channel, "snapshot has no members or marks".to_string());
                    None
                }
                Ok(snapshot) if self.is_stale_echo(&snapshot) => {
                    debug!(%channel, "handle: echo of a superseded local write");
                    self.ignore(channel, "echo of an earlier local write".to_string());
                    None
                }
                Ok(snapshot) => {
                    self.state = SyncState::Synced;
                    self.observer.on_sync_event(&SyncEvent::RemoteApplied {
                        channel,
                        at: Utc::now(),
                        members: snapshot.members.len(),
                        entries: snapshot.status_grid.len(),
                    });
                    Some(snapshot)
                }
                Err(e) => {
                    warn!(%channel, error = %e, "Rejected remote snapshot, keeping local state");
                    self.ignore(channel, e.to_string());
                    None
                }
            },
        }
    }

    fn ignore(&self, channel: ChannelId, reason: String) {
        self.observer.on_sync_event(&SyncEvent::RemoteIgnored { channel, reason });
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Sends link reports for one generation
struct Reporter {
    generation: u64,
    tx: mpsc::Sender<LinkEvent>,
}

impl Reporter {
    async fn send(&self, kind: LinkEventKind) {
        let event = LinkEvent {
            generation: self.generation,
            kind,
        };
        // The session is gone; nothing left to report to
        let _ = self.tx.send(event).await;
    }
}

async fn deliver(remote: &dyn RemoteStore, channel: &ChannelId, document: Value, reporter: &Reporter) {
    match remote.write(channel, document).await {
        Ok(()) => {
            debug!(%channel, "deliver: pushed");
            reporter.send(LinkEventKind::Pushed { at: Utc::now() }).await;
        }
        Err(e) => {
            debug!(%channel, error = %e, "deliver: failed");
            reporter.send(LinkEventKind::PushFailed { error: e.to_string() }).await;
        }
    }
}

async fn next_remote(stream: &mut Option<RemoteStream>) -> Option<Result<Option<Value>, SyncError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Background task for one subscription
///
/// Pushes the initial snapshot, registers the listener, then serves queued
/// pushes and remote changes until aborted.
async fn run_link(
    remote: Arc<dyn RemoteStore>,
    channel: ChannelId,
    initial: Value,
    mut jobs: mpsc::UnboundedReceiver<LinkJob>,
    reporter: Reporter,
) {
    debug!(%channel, generation = reporter.generation, "run_link: started");
    deliver(remote.as_ref(), &channel, initial, &reporter).await;

    let mut stream = match remote.subscribe(&channel).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            reporter
                .send(LinkEventKind::SubscribeFailed { error: e.to_string() })
                .await;
            None
        }
    };

    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(LinkJob::Push(document)) => deliver(remote.as_ref(), &channel, document, &reporter).await,
                Some(LinkJob::Flush(reply)) => reporter.send(LinkEventKind::Flushed(reply)).await,
                None => break,
            },
            item = next_remote(&mut stream) => match item {
                Some(Ok(value)) => reporter.send(LinkEventKind::Remote(value)).await,
                Some(Err(e)) => {
                    reporter.send(LinkEventKind::SubscribeFailed { error: e.to_string() }).await;
                    stream = None;
                }
                None => {
                    reporter
                        .send(LinkEventKind::SubscribeFailed {
                            error: "remote closed the stream".to_string(),
                        })
                        .await;
                    stream = None;
                }
            },
        }
    }
    debug!(%channel, "run_link: finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Status;
    use crate::domain::{Member, StatusGrid};
    use crate::sync::MemoryRemote;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<SyncEvent>>,
    }

    impl RecordingObserver {
        fn types(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(SyncEvent::event_type).collect()
        }
    }

    impl SyncObserver for RecordingObserver {
        fn on_sync_event(&self, event: &SyncEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn snapshot_with(name: &str) -> Snapshot {
        let member = Member::with_id(format!("id-{name}"), name);
        let mut grid = StatusGrid::new();
        grid.insert(format!("{}_2024-01-07", member.id), Status::Eating);
        Snapshot {
            members: vec![member],
            status_grid: grid,
            last_update: Utc::now(),
        }
    }

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            members: Vec::new(),
            status_grid: StatusGrid::new(),
            last_update: Utc::now(),
        }
    }

    struct Harness {
        remote: MemoryRemote,
        observer: Arc<RecordingObserver>,
        bridge: SyncBridge,
        rx: mpsc::Receiver<LinkEvent>,
    }

    fn harness() -> Harness {
        let remote = MemoryRemote::new();
        let observer = Arc::new(RecordingObserver::default());
        let (tx, rx) = mpsc::channel(64);
        let bridge = SyncBridge::new(Arc::new(remote.clone()), observer.clone(), tx);
        Harness {
            remote,
            observer,
            bridge,
            rx,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("link event in time")
            .expect("link channel open")
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let mut h = harness();
        assert_eq!(
            h.bridge.connect("   ", &empty_snapshot()),
            Err(ValidationError::EmptySecret)
        );
        assert_eq!(h.bridge.state(), SyncState::Disconnected);
        assert!(h.observer.types().is_empty());
    }

    #[tokio::test]
    async fn test_connect_pushes_then_listens() {
        let mut h = harness();
        let channel = h.bridge.connect(" Family Chat! ", &snapshot_with("Mom")).unwrap();
        assert_eq!(channel.as_str(), "family_chat_");
        assert_eq!(h.bridge.secret(), Some("Family Chat!"));
        assert_eq!(h.bridge.state(), SyncState::Subscribed);

        let pushed = next_event(&mut h.rx).await;
        assert!(matches!(pushed.kind, LinkEventKind::Pushed { .. }));
        assert!(h.bridge.handle(pushed).is_none());
        assert_eq!(h.bridge.state(), SyncState::Synced);

        // Listener starts with the value just pushed
        let echo = next_event(&mut h.rx).await;
        let applied = h.bridge.handle(echo).expect("echo is applied");
        assert_eq!(applied.members[0].name, "Mom");
        assert!(h.remote.document(&channel).is_some());
        assert_eq!(h.observer.types(), vec!["connected", "pushed", "remote_applied"]);
    }

    #[tokio::test]
    async fn test_blank_remote_is_ignored() {
        let mut h = harness();
        h.bridge.connect("family", &empty_snapshot()).unwrap();
        let pushed = next_event(&mut h.rx).await;
        h.bridge.handle(pushed);
        let echo = next_event(&mut h.rx).await;
        assert!(h.bridge.handle(echo).is_none());
        assert_eq!(h.observer.types().last(), Some(&"remote_ignored"));
    }

    #[tokio::test]
    async fn test_malformed_remote_is_rejected_whole() {
        let mut h = harness();
        let channel = h.bridge.connect("family", &snapshot_with("Mom")).unwrap();
        for _ in 0..2 {
            let event = next_event(&mut h.rx).await;
            h.bridge.handle(event);
        }

        h.remote
            .write(
                &channel,
                json!({"members": [{"id": "x", "name": "X"}], "dinnerData": {"x_2024-01-07": "nope"}}),
            )
            .await
            .unwrap();
        let event = next_event(&mut h.rx).await;
        assert!(h.bridge.handle(event).is_none());
        assert_eq!(h.observer.types().last(), Some(&"remote_ignored"));
    }

    /// Handle events until two remote documents arrived; returns the applied member names
    async fn applied_until_second_remote(h: &mut Harness) -> Vec<String> {
        let mut applied = Vec::new();
        let mut remotes = 0;
        while remotes < 2 {
            let event = next_event(&mut h.rx).await;
            if matches!(event.kind, LinkEventKind::Remote(_)) {
                remotes += 1;
            }
            if let Some(snapshot) = h.bridge.handle(event) {
                applied.extend(snapshot.members.into_iter().map(|m| m.name));
            }
        }
        applied
    }

    #[tokio::test]
    async fn test_superseded_own_echo_is_ignored() {
        let mut h = harness();
        h.bridge.connect("family", &snapshot_with("Dad")).unwrap();
        // Local edit queued before the listener reports the initial document
        h.bridge.push(&snapshot_with("Mom"));

        assert_eq!(applied_until_second_remote(&mut h).await, vec!["Mom"]);
        assert!(h.observer.types().contains(&"remote_ignored"));
    }

    #[tokio::test]
    async fn test_echo_after_failed_push_is_ignored() {
        let mut h = harness();
        h.bridge.connect("family", &snapshot_with("Dad")).unwrap();
        let pushed = next_event(&mut h.rx).await;
        assert!(matches!(pushed.kind, LinkEventKind::Pushed { .. }));
        h.bridge.handle(pushed);

        h.remote.set_fail_writes(true);
        h.bridge.push(&snapshot_with("Mom"));
        let mut failed = false;
        let mut remote_seen = false;
        while !(failed && remote_seen) {
            let event = next_event(&mut h.rx).await;
            match &event.kind {
                LinkEventKind::PushFailed { .. } => failed = true,
                LinkEventKind::Remote(_) => remote_seen = true,
                _ => {}
            }
            assert!(h.bridge.handle(event).is_none());
        }
    }

    #[tokio::test]
    async fn test_foreign_write_is_applied() {
        let mut h = harness();
        let channel = h.bridge.connect("family", &snapshot_with("Dad")).unwrap();
        h.bridge.push(&snapshot_with("Mom"));
        applied_until_second_remote(&mut h).await;

        h.remote
            .write(&channel, document::encode(&snapshot_with("Dad")))
            .await
            .unwrap();
        let event = next_event(&mut h.rx).await;
        let applied = h.bridge.handle(event).expect("other device's write applies");
        assert_eq!(applied.members[0].name, "Dad");
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let mut h = harness();
        h.remote.set_fail_writes(true);
        h.bridge.connect("family", &snapshot_with("Mom")).unwrap();
        let event = next_event(&mut h.rx).await;
        assert!(matches!(event.kind, LinkEventKind::PushFailed { .. }));
        h.bridge.handle(event);
        assert_eq!(h.bridge.state(), SyncState::Subscribed);
        assert!(h.observer.types().contains(&"push_failed"));
    }

    #[tokio::test]
    async fn test_reconnect_drops_old_generation() {
        let mut h = harness();
        h.bridge.connect("first", &snapshot_with("Mom")).unwrap();
        let old = next_event(&mut h.rx).await;
        assert_eq!(old.generation, 1);

        h.bridge.connect("second", &snapshot_with("Dad")).unwrap();
        assert_eq!(h.bridge.generation(), 2);
        assert!(h.bridge.handle(old).is_none());
        assert_eq!(h.bridge.channel().map(ChannelId::as_str), Some("second"));
    }

    #[tokio::test]
    async fn test_reconnect_stops_old_listener() {
        let mut h = harness();
        let first = h.bridge.connect("first", &snapshot_with("Mom")).unwrap();
        // Wait until the first listener is registered
        for _ in 0..2 {
            next_event(&mut h.rx).await;
        }
        assert_eq!(h.remote.subscriber_count(&first), 1);

        h.bridge.connect("second", &snapshot_with("Dad")).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while h.remote.subscriber_count(&first) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.remote.subscriber_count(&first), 0);
    }

    #[tokio::test]
    async fn test_push_requires_connection() {
        let mut h = harness();
        assert!(!h.bridge.push(&snapshot_with("Mom")));
        h.bridge.connect("family", &empty_snapshot()).unwrap();
        assert!(h.bridge.push(&snapshot_with("Mom")));
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_pushes() {
        let mut h = harness();
        let channel = h.bridge.connect("family", &empty_snapshot()).unwrap();
        h.bridge.push(&snapshot_with("Mom"));
        assert_eq!(h.bridge.pending_pushes(), 2);
        let (tx, mut done) = oneshot::channel();
        h.bridge.flush(tx);
        let mut pushes = 0;
        while done.try_recv().is_err() {
            let event = next_event(&mut h.rx).await;
            if matches!(event.kind, LinkEventKind::Pushed { .. }) {
                pushes += 1;
            }
            h.bridge.handle(event);
        }
        assert_eq!(pushes, 2);
        assert_eq!(h.bridge.pending_pushes(), 0);
        let document = h.remote.document(&channel).unwrap();
        assert_eq!(document["members"][0]["name"], "Mom");
    }

    #[tokio::test]
    async fn test_flush_when_disconnected_returns_immediately() {
        let h = harness();
        let (tx, rx) = oneshot::channel();
        h.bridge.flush(tx);
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mut h = harness();
        h.bridge.connect("family", &empty_snapshot()).unwrap();
        h.bridge.disconnect();
        assert_eq!(h.bridge.state(), SyncState::Disconnected);
        assert!(h.bridge.secret().is_none());
        assert!(h.bridge.channel().is_none());
        assert_eq!(h.observer.types(), vec!["connected", "disconnected"]);
    }
}
