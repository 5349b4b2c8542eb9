//! PlannerSession - actor that owns the planner, the local store and the sync bridge
//!
//! UI commands and remote notifications arrive on the same task and are
//! handled one at a time, so planner state needs no locking.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{PlannerEvent, SessionCommand, SessionError, SessionResponse, SyncInfo};
use crate::codec::Status;
use crate::domain::{Member, Snapshot};
use crate::planner::{Planner, Removal, WeekView};
use crate::store::LocalStore;
use crate::sync::{ChannelId, LinkEvent, RemoteStore, SyncBridge, SyncObserver};
use crate::week::{WeekDirection, WeekWindow};

const COMMAND_CAPACITY: usize = 256;
const LINK_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 64;

/// Actor state
pub struct PlannerSession {
    planner: Planner,
    local: LocalStore,
    bridge: SyncBridge,
    events: broadcast::Sender<PlannerEvent>,
}

impl PlannerSession {
    /// Load local state and spawn the actor
    ///
    /// Reconnects to the persisted channel if a passphrase was saved. Must be
    /// called inside a tokio runtime.
    pub fn spawn(local: LocalStore, remote: Arc<dyn RemoteStore>, observer: Arc<dyn SyncObserver>) -> PlannerHandle {
        debug!(backend = remote.name(), "spawn: called");
        let state = local.load();
        let planner = Planner::from_parts(state.members, state.status_grid, WeekWindow::current());

        let (link_tx, link_rx) = mpsc::channel(LINK_CAPACITY);
        let mut bridge = SyncBridge::new(remote, observer, link_tx);
        if let Some(secret) = &state.sync_secret {
            info!("Restoring saved sync channel");
            if let Err(e) = bridge.connect(secret, &planner.snapshot()) {
                debug!(error = %e, "spawn: saved secret rejected");
            }
        }

        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Self {
            planner,
            local,
            bridge,
            events: events.clone(),
        };
        tokio::spawn(session.run(rx, link_rx));

        info!("PlannerSession spawned");
        PlannerHandle { tx, events }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>, mut link_rx: mpsc::Receiver<LinkEvent>) {
        debug!("PlannerSession actor started");
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(SessionCommand::Shutdown { reply }) => {
                        debug!("run: Shutdown command");
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = link_rx.recv() => self.handle_link(event),
            }
        }
        info!("PlannerSession actor stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::AddMember { name, reply } => {
                debug!(%name, "handle_command: AddMember command");
                let result = self.planner.add_member(&name).map_err(SessionError::from);
                if result.is_ok() {
                    self.commit(PlannerEvent::MembersChanged);
                }
                let _ = reply.send(result);
            }

            SessionCommand::RemoveMember { id, reply } => {
                debug!(%id, "handle_command: RemoveMember command");
                let removal = self.planner.remove_member(&id);
                if removal.is_some() {
                    self.commit(PlannerEvent::MembersChanged);
                }
                let _ = reply.send(Ok(removal));
            }

            SessionCommand::SetStatus { member_id, date, reply } => {
                debug!(%member_id, %date, "handle_command: SetStatus command");
                let status = self.planner.set_status(&member_id, date);
                self.commit(PlannerEvent::GridChanged);
                let _ = reply.send(Ok(status));
            }

            SessionCommand::SetWeek { direction, reply } => {
                debug!(?direction, "handle_command: SetWeek command");
                let start = self.planner.set_week(direction);
                self.emit(PlannerEvent::WeekChanged { start });
                let _ = reply.send(Ok(start));
            }

            SessionCommand::ShowWeekOf { date, reply } => {
                debug!(%date, "handle_command: ShowWeekOf command");
                let start = self.planner.show_week_of(date);
                self.emit(PlannerEvent::WeekChanged { start });
                let _ = reply.send(Ok(start));
            }

            SessionCommand::SetChannelSecret { secret, reply } => {
                debug!("handle_command: SetChannelSecret command");
                let result = self.bridge.connect(&secret, &self.planner.snapshot());
                if result.is_ok() {
                    self.local
                        .save(self.planner.members(), self.planner.grid(), self.bridge.secret());
                }
                let _ = reply.send(result.map_err(SessionError::from));
            }

            SessionCommand::Disconnect { reply } => {
                debug!("handle_command: Disconnect command");
                self.bridge.disconnect();
                self.local.save(self.planner.members(), self.planner.grid(), Some(""));
                let _ = reply.send(Ok(()));
            }

            SessionCommand::Flush { reply } => {
                debug!("handle_command: Flush command");
                self.bridge.flush(reply);
            }

            SessionCommand::Members { reply } => {
                let _ = reply.send(Ok(self.planner.members().to_vec()));
            }

            SessionCommand::FindMember { id_or_name, reply } => {
                let _ = reply.send(Ok(self.planner.find_member(&id_or_name).cloned()));
            }

            SessionCommand::WeekView { today, reply } => {
                let _ = reply.send(Ok(self.planner.week_view(today)));
            }

            SessionCommand::SyncInfo { reply } => {
                let info = SyncInfo {
                    secret: self.bridge.secret().map(str::to_string),
                    channel: self.bridge.channel().cloned(),
                    state: self.bridge.state(),
                    backend: self.bridge.backend(),
                    pending_pushes: self.bridge.pending_pushes(),
                };
                let _ = reply.send(Ok(info));
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.planner.snapshot()));
            }

            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Persist, then push, then notify
    fn commit(&mut self, event: PlannerEvent) {
        self.local.save(self.planner.members(), self.planner.grid(), None);
        self.bridge.push(&self.planner.snapshot());
        self.emit(event);
    }

    fn handle_link(&mut self, event: LinkEvent) {
        if let Some(snapshot) = self.bridge.handle(event) {
            let members = snapshot.members.len();
            let entries = snapshot.status_grid.len();
            self.planner.replace_from(snapshot);
            self.local.save(self.planner.members(), self.planner.grid(), None);
            info!(members, entries, "Applied remote snapshot");
            self.emit(PlannerEvent::RemoteApplied { members, entries });
        }
    }

    fn emit(&self, event: PlannerEvent) {
        debug!(?event, "emit: called");
        let _ = self.events.send(event);
    }
}

/// Handle to send commands to the PlannerSession
#[derive(Clone)]
pub struct PlannerHandle {
    tx: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<PlannerEvent>,
}

impl PlannerHandle {
    /// Subscribe to change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PlannerEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<SessionResponse<T>>) -> SessionCommand,
    ) -> SessionResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Add a member by display name
    pub async fn add_member(&self, name: &str) -> SessionResponse<Member> {
        debug!(%name, "add_member: called");
        let name = name.to_string();
        self.request(|reply| SessionCommand::AddMember { name, reply }).await
    }

    /// Remove a member by id; `None` if no such member
    pub async fn remove_member(&self, id: &str) -> SessionResponse<Option<Removal>> {
        debug!(%id, "remove_member: called");
        let id = id.to_string();
        self.request(|reply| SessionCommand::RemoveMember { id, reply }).await
    }

    /// Cycle one cell and return its new mark
    pub async fn set_status(&self, member_id: &str, date: NaiveDate) -> SessionResponse<Option<Status>> {
        debug!(%member_id, %date, "set_status: called");
        let member_id = member_id.to_string();
        self.request(|reply| SessionCommand::SetStatus { member_id, date, reply })
            .await
    }

    pub async fn set_week(&self, direction: WeekDirection) -> SessionResponse<NaiveDate> {
        debug!(?direction, "set_week: called");
        self.request(|reply| SessionCommand::SetWeek { direction, reply }).await
    }

    pub async fn show_week_of(&self, date: NaiveDate) -> SessionResponse<NaiveDate> {
        debug!(%date, "show_week_of: called");
        self.request(|reply| SessionCommand::ShowWeekOf { date, reply }).await
    }

    /// Persist the passphrase and switch to its channel
    pub async fn set_channel_secret(&self, secret: &str) -> SessionResponse<ChannelId> {
        debug!("set_channel_secret: called");
        let secret = secret.to_string();
        self.request(|reply| SessionCommand::SetChannelSecret { secret, reply })
            .await
    }

    /// Stop syncing and forget the saved passphrase
    pub async fn disconnect(&self) -> SessionResponse<()> {
        debug!("disconnect: called");
        self.request(|reply| SessionCommand::Disconnect { reply }).await
    }

    /// Wait until every push queued so far has been attempted
    pub async fn flush(&self) -> SessionResponse<()> {
        debug!("flush: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Flush { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn members(&self) -> SessionResponse<Vec<Member>> {
        self.request(|reply| SessionCommand::Members { reply }).await
    }

    /// Resolve a member by id, then by exact name
    pub async fn find_member(&self, id_or_name: &str) -> SessionResponse<Option<Member>> {
        let id_or_name = id_or_name.to_string();
        self.request(|reply| SessionCommand::FindMember { id_or_name, reply })
            .await
    }

    pub async fn week_view(&self, today: NaiveDate) -> SessionResponse<WeekView> {
        self.request(|reply| SessionCommand::WeekView { today, reply }).await
    }

    pub async fn sync_info(&self) -> SessionResponse<SyncInfo> {
        self.request(|reply| SessionCommand::SyncInfo { reply }).await
    }

    pub async fn snapshot(&self) -> SessionResponse<Snapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Stop the actor and its sync link
    pub async fn shutdown(&self) -> SessionResponse<()> {
        debug!("shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}
