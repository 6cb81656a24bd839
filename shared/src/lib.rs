use serde::{Deserialize, Serialize};

pub const CHUNK_WIDTH: i32 = 16;
pub const CHUNK_BIOME_VOLUME: usize = 1024;
pub const CHUNK_HEIGHTMAP_AREA: usize = 256;
pub const AIR_BLOCK_ID: i32 = 0;
pub const EMPTY_BIOME_ID: i8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn plus(&self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn minus(&self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub uuid: String,
}

impl Identity {
    pub fn new(username: &str, uuid: &str) -> Self {
        Self {
            username: username.to_string(),
            uuid: uuid.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub item_id: i32,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractAction {
    Interact,
    Attack,
    InteractAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChangeRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub block_id: i32,
}

/// Opaque section payload as produced by the protocol codec. The proxy only
/// cares whether a column carries any sections at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSection {
    pub block_count: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntity {
    pub pos: BlockPos,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heightmaps {
    pub motion_blocking: Vec<i8>,
    pub world_surface: Vec<i8>,
}

impl Heightmaps {
    pub fn flat() -> Self {
        Self {
            motion_blocking: vec![0; CHUNK_HEIGHTMAP_AREA],
            world_surface: vec![0; CHUNK_HEIGHTMAP_AREA],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkColumn {
    pub x: i32,
    pub z: i32,
    pub sections: Vec<ChunkSection>,
    pub biomes: Vec<i8>,
    pub block_entities: Vec<BlockEntity>,
    pub heightmaps: Heightmaps,
}

impl ChunkColumn {
    /// Same column slot with all content stripped: no sections, no block
    /// entities, neutral biome fill, flat heightmaps. The client still
    /// acknowledges the chunk, it just renders nothing there.
    pub fn emptied(&self) -> ChunkColumn {
        ChunkColumn {
            x: self.x,
            z: self.z,
            sections: Vec::new(),
            biomes: vec![EMPTY_BIOME_ID; CHUNK_BIOME_VOLUME],
            block_entities: Vec::new(),
            heightmaps: Heightmaps::flat(),
        }
    }

    pub fn is_emptied(&self) -> bool {
        self.sections.is_empty() && self.block_entities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfoEntry {
    pub uuid: String,
    pub username: String,
    pub position: Option<Vec3>,
}

/// Every packet kind this proxy inspects or rewrites, in either direction.
/// Anything the protocol carries beyond these flows through `Opaque`
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // observer -> upstream
    ChatFromObserver {
        message: String,
    },
    PlayerMove {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    EntityInteract {
        target_id: i32,
        action: InteractAction,
        sneaking: bool,
    },
    BlockPlace {
        location: BlockPos,
        held_item_id: i32,
    },
    UseItem {
        item_id: i32,
    },

    // upstream -> observer
    ChatToObserver {
        message: String,
        position: u8,
    },
    PlayerTeleport {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        flags: u8,
        teleport_id: i32,
    },
    Abilities {
        flags: u8,
        flying_speed: f32,
        walking_speed: f32,
    },
    ChunkData(ChunkColumn),
    BlockUpdate {
        location: BlockPos,
        block_id: i32,
    },
    MultiBlockChange {
        chunk_x: i32,
        chunk_z: i32,
        records: Vec<BlockChangeRecord>,
    },
    SetSlot {
        window_id: i8,
        slot: i16,
        item: Option<Slot>,
    },
    WindowItems {
        window_id: i8,
        items: Vec<Option<Slot>>,
    },
    UnlockRecipes {
        action: i32,
        recipes: Vec<String>,
    },
    Collect {
        collected_id: i32,
        collector_id: i32,
        count: i32,
    },
    EntityMetadata {
        entity_id: i32,
        metadata: Vec<u8>,
    },
    EntityAttributes {
        entity_id: i32,
        properties: Vec<u8>,
    },
    EntityTeleport {
        entity_id: i32,
        x: f64,
        y: f64,
        z: f64,
        yaw: i8,
        pitch: i8,
        on_ground: bool,
    },
    SpawnPosition {
        location: BlockPos,
        angle: f32,
    },
    PlayerInfo {
        entries: Vec<PlayerInfoEntry>,
    },
    SpawnPlayer {
        entity_id: i32,
        uuid: String,
        x: f64,
        y: f64,
        z: f64,
        yaw: i8,
        pitch: i8,
    },
    DestroyEntities {
        entity_ids: Vec<i32>,
    },
    PlayerInfoRemove {
        uuids: Vec<String>,
    },
    Camera {
        entity_id: i32,
    },
    GameStateChange {
        reason: u8,
        value: f32,
    },

    Opaque {
        name: String,
        data: Vec<u8>,
    },
}

impl Packet {
    /// Stable protocol-style name, used for logging and for the configured
    /// control-gate denylist.
    pub fn kind(&self) -> &str {
        match self {
            Packet::ChatFromObserver { .. } => "chat_message",
            Packet::PlayerMove { .. } => "position",
            Packet::EntityInteract { .. } => "use_entity",
            Packet::BlockPlace { .. } => "block_place",
            Packet::UseItem { .. } => "use_item",
            Packet::ChatToObserver { .. } => "chat",
            Packet::PlayerTeleport { .. } => "player_position",
            Packet::Abilities { .. } => "abilities",
            Packet::ChunkData(_) => "map_chunk",
            Packet::BlockUpdate { .. } => "block_update",
            Packet::MultiBlockChange { .. } => "multi_block_change",
            Packet::SetSlot { .. } => "set_slot",
            Packet::WindowItems { .. } => "window_items",
            Packet::UnlockRecipes { .. } => "unlock_recipes",
            Packet::Collect { .. } => "collect",
            Packet::EntityMetadata { .. } => "entity_metadata",
            Packet::EntityAttributes { .. } => "entity_update_attributes",
            Packet::EntityTeleport { .. } => "entity_teleport",
            Packet::SpawnPosition { .. } => "spawn_position",
            Packet::PlayerInfo { .. } => "player_info",
            Packet::SpawnPlayer { .. } => "named_entity_spawn",
            Packet::DestroyEntities { .. } => "entity_destroy",
            Packet::PlayerInfoRemove { .. } => "player_remove",
            Packet::Camera { .. } => "camera",
            Packet::GameStateChange { .. } => "game_state_change",
            Packet::Opaque { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_plus_minus_roundtrip() {
        let p = Vec3::new(120.5, 64.0, -340.25);
        let offset = Vec3::new(-1000.0, 0.0, 500.0);
        let shifted = p.minus(offset);
        let restored = shifted.plus(offset);
        assert_eq!(restored, p);
    }

    #[test]
    fn test_emptied_column_has_no_content() {
        let column = ChunkColumn {
            x: 4,
            z: -7,
            sections: vec![ChunkSection {
                block_count: 256,
                data: vec![1, 2, 3],
            }],
            biomes: vec![5; CHUNK_BIOME_VOLUME],
            block_entities: vec![BlockEntity {
                pos: BlockPos {
                    x: 64,
                    y: 70,
                    z: -112,
                },
                data: vec![9],
            }],
            heightmaps: Heightmaps::flat(),
        };

        let emptied = column.emptied();
        assert!(emptied.is_emptied());
        assert_eq!(emptied.x, column.x);
        assert_eq!(emptied.z, column.z);
        assert_eq!(emptied.biomes, vec![EMPTY_BIOME_ID; CHUNK_BIOME_VOLUME]);
    }

    #[test]
    fn test_emptied_is_idempotent() {
        let column = ChunkColumn {
            x: 0,
            z: 0,
            sections: vec![ChunkSection {
                block_count: 1,
                data: vec![1],
            }],
            biomes: vec![3; CHUNK_BIOME_VOLUME],
            block_entities: Vec::new(),
            heightmaps: Heightmaps::flat(),
        };

        let once = column.emptied();
        let twice = once.emptied();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_packet_serialization_player_move() {
        let packet = Packet::PlayerMove {
            x: 12.5,
            y: 64.0,
            z: -3.25,
            yaw: 90.0,
            pitch: -10.0,
            on_ground: true,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_packet_serialization_window_items() {
        let packet = Packet::WindowItems {
            window_id: 0,
            items: vec![
                None,
                Some(Slot {
                    item_id: 46,
                    count: 64,
                }),
                Some(Slot {
                    item_id: 1,
                    count: 32,
                }),
            ],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_opaque_packet_keeps_name_and_payload() {
        let packet = Packet::Opaque {
            name: "keep_alive".to_string(),
            data: vec![0, 1, 2, 3],
        };

        assert_eq!(packet.kind(), "keep_alive");

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(
            Packet::ChatFromObserver {
                message: String::new()
            }
            .kind(),
            "chat_message"
        );
        assert_eq!(
            Packet::Abilities {
                flags: 0,
                flying_speed: 0.05,
                walking_speed: 0.1,
            }
            .kind(),
            "abilities"
        );
        assert_eq!(
            Packet::UnlockRecipes {
                action: 0,
                recipes: vec![]
            }
            .kind(),
            "unlock_recipes"
        );
    }
}
