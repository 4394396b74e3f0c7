//! # Live Session Replicator Module
//!
//! Keeps follower devices converged on the conductor's live-performance
//! position over an abstract broadcast transport.
//!
//! ## Overview
//!
//! One device per session acts as the **conductor** and holds write
//! authority over the shared position (song/section/bar/transpose).
//! **Followers** attach to the same broadcast scope, request the current
//! state once, and mirror every full-state broadcast after that. Conflicts
//! are resolved purely by payload timestamps — never by arrival order — so
//! the protocol tolerates transports with no cross-sender ordering.
//!
//! ## Components
//!
//! - **State & Messages** (`state`): the replicated position, conductor
//!   intents, and the wire message
//! - **Transport** (`transport`): the broadcast channel abstraction and the
//!   in-process bus backend
//! - **Device Identity** (`device`): the persisted per-device id used to
//!   filter self-echoes
//! - **Replicator** (`replicator`): the conductor/follower role machine

pub mod device;
pub mod error;
pub mod replicator;
pub mod state;
pub mod transport;

pub use device::DeviceId;
pub use error::{LiveError, Result};
pub use replicator::{
    restore_checkpoint, LiveReplicator, ReplicatorConfig, RolePolicy, Subscription,
};
pub use state::{LiveState, MessageKind, StateChange, SyncMessage};
pub use transport::{session_scope, BroadcastTransport, LocalBus, TransportLink};
