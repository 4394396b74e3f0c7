//! The conductor/follower role machine.
//!
//! One [`LiveReplicator`] per device, constructed once and passed by
//! reference. The conductor owns the state and broadcasts every mutation as
//! a full-state message; followers mirror the conductor and resolve
//! conflicts by payload timestamp alone.

use crate::device::DeviceId;
use crate::error::{LiveError, Result};
use crate::state::{now_millis, LiveState, MessageKind, StateChange, SyncMessage};
use crate::transport::{session_scope, BroadcastTransport, TransportLink};
use core_store::OfflineStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// What to do when a mutation arrives with no existing state.
///
/// `Lenient` keeps a live show moving by synthesizing a zeroed default and
/// logging a warning; `Strict` refuses so a device without a clear role
/// cannot mutate as if it were the conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolePolicy {
    Strict,
    #[default]
    Lenient,
}

/// Replicator configuration.
#[derive(Debug, Clone, Default)]
pub struct ReplicatorConfig {
    pub role_policy: RolePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Idle,
    Conductor,
    Follower,
}

type Handler = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

struct Inner {
    role: Role,
    state: Option<LiveState>,
    /// Highest payload timestamp accepted so far; the staleness cutoff
    last_seen: Option<i64>,
    tx: Option<broadcast::Sender<SyncMessage>>,
    handlers: HashMap<u64, Handler>,
    next_handler_id: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            role: Role::Idle,
            state: None,
            last_seen: None,
            tx: None,
            handlers: HashMap::new(),
            next_handler_id: 0,
        }
    }
}

/// Replicates the live-performance position across devices.
pub struct LiveReplicator {
    transport: Arc<dyn BroadcastTransport>,
    device_id: DeviceId,
    config: ReplicatorConfig,
    inner: Arc<Mutex<Inner>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveReplicator {
    pub fn new(
        transport: Arc<dyn BroadcastTransport>,
        device_id: DeviceId,
        config: ReplicatorConfig,
    ) -> Self {
        Self {
            transport,
            device_id,
            config,
            inner: Arc::new(Mutex::new(Inner::new())),
            recv_task: Mutex::new(None),
        }
    }

    /// Claim conductor authority for the session keyed by the state's
    /// setlist id, storing `initial_state` as truth.
    #[instrument(skip(self, initial_state), fields(setlist_id = %initial_state.setlist_id))]
    pub async fn start_as_conductor(&self, initial_state: LiveState) -> Result<()> {
        self.ensure_idle()?;

        let scope = session_scope(&initial_state.setlist_id);
        let link = self.transport.attach(&scope).await?;

        {
            let mut inner = lock(&self.inner);
            inner.role = Role::Conductor;
            inner.last_seen = Some(initial_state.timestamp);
            inner.state = Some(initial_state);
            inner.tx = Some(link.sender());
        }
        self.spawn_recv(link);

        info!(device_id = %self.device_id, "Claimed conductor authority");
        Ok(())
    }

    /// Attach to a session as a follower and request the current state.
    ///
    /// The mirror is seeded by the conductor's sync_response. No timeout is
    /// enforced here; callers impose their own around the initial exchange.
    #[instrument(skip(self))]
    pub async fn connect_as_follower(&self, setlist_id: &str) -> Result<()> {
        self.ensure_idle()?;

        let link = self.transport.attach(&session_scope(setlist_id)).await?;
        let tx = link.sender();

        {
            let mut inner = lock(&self.inner);
            inner.role = Role::Follower;
            inner.tx = Some(tx.clone());
        }
        self.spawn_recv(link);

        let _ = tx.send(SyncMessage {
            kind: MessageKind::SyncRequest,
            payload: None,
            sender_id: self.device_id.to_string(),
            sent_at: now_millis(),
        });

        info!(device_id = %self.device_id, "Following live session");
        Ok(())
    }

    /// Detach from the session, clearing state and subscribers.
    ///
    /// The only cancellation primitive; takes effect immediately and drops
    /// all future inbound messages.
    pub fn disconnect(&self) {
        if let Some(task) = lock(&self.recv_task).take() {
            task.abort();
        }

        let mut inner = lock(&self.inner);
        inner.role = Role::Idle;
        inner.state = None;
        inner.last_seen = None;
        inner.tx = None;
        inner.handlers.clear();

        info!(device_id = %self.device_id, "Live session disconnected");
    }

    /// Apply a conductor mutation and broadcast the full merged state.
    ///
    /// The outgoing message kind is the intent carried by `change`; the
    /// payload is always the complete state so any subscriber applies it
    /// statelessly.
    pub fn update_state(&self, change: StateChange) -> Result<()> {
        let (kind, payload, tx) = {
            let mut inner = lock(&self.inner);

            if inner.state.is_none() {
                match self.config.role_policy {
                    RolePolicy::Lenient => {
                        warn!("No live state to update; synthesizing a zeroed default");
                        inner.state = Some(LiveState::zeroed(""));
                    }
                    RolePolicy::Strict => return Err(LiveError::NoActiveState),
                }
            }
            let Some(state) = inner.state.as_mut() else {
                return Err(LiveError::NoActiveState);
            };

            change.apply(state);
            state.timestamp = next_timestamp(state.timestamp);
            let ts = state.timestamp;
            let snapshot = state.clone();
            let kind = change.kind();
            inner.last_seen = Some(ts);

            (kind, snapshot, inner.tx.clone())
        };

        match tx {
            Some(tx) => {
                let _ = tx.send(SyncMessage {
                    kind,
                    payload: Some(payload),
                    sender_id: self.device_id.to_string(),
                    sent_at: now_millis(),
                });
            }
            None => debug!(kind = %kind, "No transport attached; state updated locally only"),
        }

        Ok(())
    }

    /// Jump to a song. Section and bar reset to 0.
    pub fn change_song(&self, song_index: u32) -> Result<()> {
        self.update_state(StateChange::Song(song_index))
    }

    /// Jump to a section. Bar resets to 0.
    pub fn change_section(&self, section_index: u32) -> Result<()> {
        self.update_state(StateChange::Section(section_index))
    }

    /// Move to a bar within the current section.
    pub fn update_bar(&self, bar: u32) -> Result<()> {
        self.update_state(StateChange::Bar(bar))
    }

    /// Set the transpose offset in semitones.
    pub fn set_transpose(&self, transpose: i32) -> Result<()> {
        self.update_state(StateChange::Transpose(transpose))
    }

    /// Start or pause playback.
    pub fn set_playing(&self, playing: bool) -> Result<()> {
        self.update_state(StateChange::Playing(playing))
    }

    /// Signal the end of the session's playback.
    pub fn stop(&self) -> Result<()> {
        self.update_state(StateChange::Stop)
    }

    /// Register a message handler. Handlers receive every fresh inbound
    /// message regardless of kind; applying non-sync_response payloads to
    /// any local view is the handler's choice.
    ///
    /// The handler stays registered until [`Subscription::unsubscribe`] is
    /// called or the session disconnects.
    pub fn on_message(&self, handler: impl Fn(&SyncMessage) + Send + Sync + 'static) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_handler_id;
        inner.next_handler_id += 1;
        inner.handlers.insert(id, Arc::new(handler));

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The current state (conductor truth or follower mirror).
    pub fn state(&self) -> Option<LiveState> {
        lock(&self.inner).state.clone()
    }

    /// Whether this device holds conductor authority.
    pub fn is_conductor(&self) -> bool {
        lock(&self.inner).role == Role::Conductor
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Persist the current state as the crash-recovery checkpoint.
    pub async fn checkpoint(&self, store: &OfflineStore) -> Result<()> {
        let state = self.state().ok_or(LiveError::NoActiveState)?;
        store
            .save_live_checkpoint(&state.to_checkpoint())
            .await
            .map_err(|e| LiveError::Checkpoint(e.to_string()))
    }

    fn ensure_idle(&self) -> Result<()> {
        if lock(&self.inner).role != Role::Idle {
            return Err(LiveError::AlreadyAttached);
        }
        Ok(())
    }

    fn spawn_recv(&self, mut link: TransportLink) {
        let inner = Arc::clone(&self.inner);
        let device_id = self.device_id.clone();

        let handle = tokio::spawn(async move {
            while let Some(message) = link.recv().await {
                dispatch(&inner, &device_id, message);
            }
        });

        if let Some(previous) = lock(&self.recv_task).replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for LiveReplicator {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.recv_task).take() {
            task.abort();
        }
    }
}

/// Load the crash-recovery checkpoint as a seed state for a new session.
pub async fn restore_checkpoint(store: &OfflineStore) -> Result<Option<LiveState>> {
    let checkpoint = store
        .live_checkpoint()
        .await
        .map_err(|e| LiveError::Checkpoint(e.to_string()))?;

    Ok(checkpoint.map(LiveState::from))
}

/// Handle to an installed message handler.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Remove the handler. Dropping the subscription without calling this
    /// leaves the handler installed for the rest of the session.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner).handlers.remove(&self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Next strictly-increasing timestamp after `prev`.
fn next_timestamp(prev: i64) -> i64 {
    now_millis().max(prev + 1)
}

/// Process one inbound message: filter self-echoes and stale payloads,
/// run the protocol's automatic reactions, then fan out to handlers.
fn dispatch(inner: &Mutex<Inner>, device_id: &DeviceId, message: SyncMessage) {
    let mut reply: Option<(broadcast::Sender<SyncMessage>, SyncMessage)> = None;

    let handlers: Vec<Handler> = {
        let mut guard = lock(inner);

        if guard.role == Role::Idle {
            return;
        }
        if message.sender_id == device_id.as_str() {
            return;
        }

        // Last writer wins on the payload timestamp, never on arrival order.
        if let Some(payload) = &message.payload {
            if let Some(seen) = guard.last_seen {
                if payload.timestamp <= seen {
                    debug!(
                        kind = %message.kind,
                        timestamp = payload.timestamp,
                        cutoff = seen,
                        "Dropping stale message"
                    );
                    return;
                }
            }
            guard.last_seen = Some(payload.timestamp);
        }

        match (guard.role, message.kind) {
            // Late joiners converge without waiting for the next natural
            // update: answer every sync_request with the full current state.
            (Role::Conductor, MessageKind::SyncRequest) => {
                if let (Some(state), Some(tx)) = (guard.state.clone(), guard.tx.clone()) {
                    reply = Some((
                        tx,
                        SyncMessage {
                            kind: MessageKind::SyncResponse,
                            payload: Some(state),
                            sender_id: device_id.to_string(),
                            sent_at: now_millis(),
                        },
                    ));
                }
            }
            // The mirror updates automatically only on sync_response.
            (Role::Follower, MessageKind::SyncResponse) => {
                if let Some(payload) = &message.payload {
                    guard.state = Some(payload.clone());
                }
            }
            _ => {}
        }

        guard.handlers.values().cloned().collect()
    };

    if let Some((tx, response)) = reply {
        let _ = tx.send(response);
    }

    for handler in &handlers {
        handler(&message);
    }
}
