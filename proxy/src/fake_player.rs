//! Synthetic stand-in entity for the automated participant, shown to
//! observers who are not in control so the world keeps a consistent body at
//! the participant's position no matter who is driving.

use crate::session::{ObserverConnection, ObserverId};
use log::debug;
use shared::{Identity, Packet, PlayerInfoEntry, Vec3};
use std::collections::HashSet;

/// Entity id reserved for the stand-in. Well above anything the upstream
/// server allocates during a session.
pub const FAKE_ENTITY_ID: i32 = 9999;

/// Tab-list uuid for the stand-in. Distinct from the upstream identity's
/// uuid so removing the entry never touches the observer's own.
pub const FAKE_ENTITY_UUID: &str = "00000000-0000-4000-8000-00000000270f";

pub struct FakePlayer {
    identity: Identity,
    registered: HashSet<ObserverId>,
}

impl FakePlayer {
    /// The stand-in mirrors the upstream session's display name.
    pub fn new(upstream_identity: Identity) -> Self {
        Self {
            identity: upstream_identity,
            registered: HashSet::new(),
        }
    }

    pub fn entity_id(&self) -> i32 {
        FAKE_ENTITY_ID
    }

    pub fn is_registered(&self, id: ObserverId) -> bool {
        self.registered.contains(&id)
    }

    pub fn spawn_packets(&self, position: Vec3) -> Vec<Packet> {
        vec![
            Packet::PlayerInfo {
                entries: vec![PlayerInfoEntry {
                    uuid: FAKE_ENTITY_UUID.to_string(),
                    username: self.identity.username.clone(),
                    position: None,
                }],
            },
            Packet::SpawnPlayer {
                entity_id: FAKE_ENTITY_ID,
                uuid: FAKE_ENTITY_UUID.to_string(),
                x: position.x,
                y: position.y,
                z: position.z,
                yaw: 0,
                pitch: 0,
            },
        ]
    }

    pub fn despawn_packets(&self) -> Vec<Packet> {
        vec![
            Packet::DestroyEntities {
                entity_ids: vec![FAKE_ENTITY_ID],
            },
            Packet::PlayerInfoRemove {
                uuids: vec![FAKE_ENTITY_UUID.to_string()],
            },
        ]
    }

    /// Shows the stand-in to one observer. `position` is already in observer
    /// space. No-op if it is already visible there.
    pub fn register(&mut self, conn: &mut ObserverConnection, position: Vec3) {
        if !self.registered.insert(conn.id) {
            return;
        }
        debug!("registering stand-in for observer {}", conn.id);
        conn.write_all(self.spawn_packets(position));
        conn.ctx.fake_entity_shown = true;
    }

    /// Hides the stand-in from one observer. Idempotent.
    pub fn unregister(&mut self, conn: &mut ObserverConnection) {
        if !self.registered.remove(&conn.id) {
            return;
        }
        debug!("unregistering stand-in for observer {}", conn.id);
        conn.write_all(self.despawn_packets());
        conn.ctx.fake_entity_shown = false;
    }

    /// Drops bookkeeping for an observer that is already gone; nothing is
    /// written.
    pub fn forget(&mut self, id: ObserverId) {
        self.registered.remove(&id);
    }

    /// Keeps the stand-in in step with the upstream body for everyone it is
    /// shown to.
    pub fn movement_packet(&self, position: Vec3) -> Packet {
        Packet::EntityTeleport {
            entity_id: FAKE_ENTITY_ID,
            x: position.x,
            y: position.y,
            z: position.z,
            yaw: 0,
            pitch: 0,
            on_ground: true,
        }
    }
}
