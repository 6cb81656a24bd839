//! Connection state and the channel seam to the protocol codec.
//!
//! The codec collaborator owns sockets and frame parsing; this module
//! defines what it hands us: an [`UpstreamLink`] for the automated
//! participant's session and [`ObserverLogin`]s for downstream connections,
//! both speaking typed [`Packet`]s over channels. The [`ObserverRegistry`]
//! tracks live observers and their per-connection pipeline context.

use async_trait::async_trait;
use log::info;
use shared::{Identity, Packet, Vec3};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub use crate::control::ObserverId;

#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    #[error("upstream handshake failed: {0}")]
    Handshake(String),
}

#[derive(Debug, Clone, Error)]
pub enum ListenError {
    #[error("failed to acquire listen address {addr}: {message}")]
    Bind { addr: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Connecting,
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverStatus {
    LoggingIn,
    Active,
    Ended,
}

/// Read-only snapshot of the upstream session handed to pipeline stages.
#[derive(Debug, Clone)]
pub struct UpstreamView {
    pub identity: Identity,
    pub entity_id: i32,
    pub position: Vec3,
}

/// Events the codec reports for the upstream session.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// Spawn-dependent state is available; the session is fully live.
    Ready {
        position: Vec3,
        chunks: Vec<(i32, i32)>,
    },
    Packet(Packet),
    Position(Vec3),
    Ended { reason: String },
    Errored { message: String },
}

/// What a successful upstream login hands back. Dropping `to_server` tells
/// the codec to tear the connection down.
pub struct UpstreamLink {
    pub identity: Identity,
    pub entity_id: i32,
    pub to_server: mpsc::UnboundedSender<Packet>,
    pub events: mpsc::UnboundedReceiver<UpstreamEvent>,
}

#[async_trait]
pub trait UpstreamConnector: Send {
    /// Resolves once the remote login completes, or fails.
    async fn connect(&mut self) -> Result<UpstreamLink, ConnectError>;
}

/// Writes the proxy pushes toward one observer's client.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverWrite {
    Packet(Packet),
    End { reason: String },
}

/// A downstream connection that completed its login with the codec.
pub struct ObserverLogin {
    pub identity: Identity,
    pub writes: mpsc::UnboundedSender<ObserverWrite>,
    /// Closed by the codec when the observer disconnects.
    pub packets: mpsc::UnboundedReceiver<Packet>,
}

/// A live listening endpoint. A message on `shutdown` (or its closure)
/// tells the codec to stop accepting; `motd` is watched for updates.
pub struct ListenerLink {
    pub local_addr: String,
    pub logins: mpsc::UnboundedReceiver<ObserverLogin>,
    pub motd: watch::Sender<String>,
    pub shutdown: mpsc::UnboundedSender<String>,
}

#[async_trait]
pub trait ObserverListener: Send {
    async fn listen(&mut self) -> Result<ListenerLink, ListenError>;
}

/// Per-observer pipeline context, mutated only through the orchestrator's
/// single-threaded loop.
#[derive(Debug, Clone, Default)]
pub struct ObserverCtx {
    pub in_camera: bool,
    pub fake_entity_shown: bool,
}

pub struct ObserverConnection {
    pub id: ObserverId,
    pub identity: Identity,
    pub status: ObserverStatus,
    pub ctx: ObserverCtx,
    writes: mpsc::UnboundedSender<ObserverWrite>,
}

impl ObserverConnection {
    /// Queues a packet toward the observer's client. A send to a connection
    /// the codec already tore down is silently dropped; the `Ended` event is
    /// on its way.
    pub fn write(&self, packet: Packet) {
        let _ = self.writes.send(ObserverWrite::Packet(packet));
    }

    pub fn write_all(&self, packets: Vec<Packet>) {
        for packet in packets {
            self.write(packet);
        }
    }

    pub fn end(&self, reason: &str) {
        let _ = self.writes.send(ObserverWrite::End {
            reason: reason.to_string(),
        });
    }
}

/// Live observers keyed by their sequential id.
pub struct ObserverRegistry {
    observers: HashMap<ObserverId, ObserverConnection>,
    next_id: ObserverId,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn add(
        &mut self,
        identity: Identity,
        writes: mpsc::UnboundedSender<ObserverWrite>,
    ) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;

        info!("Observer {} ({}) attached", id, identity.username);
        self.observers.insert(
            id,
            ObserverConnection {
                id,
                identity,
                status: ObserverStatus::Active,
                ctx: ObserverCtx::default(),
                writes,
            },
        );
        id
    }

    pub fn remove(&mut self, id: ObserverId) -> Option<ObserverConnection> {
        let mut conn = self.observers.remove(&id)?;
        conn.status = ObserverStatus::Ended;
        info!("Observer {} ({}) detached", id, conn.identity.username);
        Some(conn)
    }

    pub fn get(&self, id: ObserverId) -> Option<&ObserverConnection> {
        self.observers.get(&id)
    }

    pub fn get_mut(&mut self, id: ObserverId) -> Option<&mut ObserverConnection> {
        self.observers.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ObserverId> {
        let mut ids: Vec<ObserverId> = self.observers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObserverConnection> {
        self.observers.values()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// The orchestrator's live view of the upstream session.
pub struct UpstreamState {
    pub view: UpstreamView,
    pub status: UpstreamStatus,
    pub chunks: HashSet<(i32, i32)>,
    pub to_server: mpsc::UnboundedSender<Packet>,
}

impl UpstreamState {
    pub fn new(
        identity: Identity,
        entity_id: i32,
        to_server: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            view: UpstreamView {
                identity,
                entity_id,
                position: Vec3::zero(),
            },
            status: UpstreamStatus::Connecting,
            chunks: HashSet::new(),
            to_server,
        }
    }

    pub fn forward(&self, packet: Packet) {
        let _ = self.to_server.send(packet);
    }
}
