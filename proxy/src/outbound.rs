//! Upstream-to-observer stages, in pipeline order: control gating,
//! fake-entity id substitution, recipe-unlock suppression, region masking,
//! banned-content filtering, coordinate rebasing. Masking runs before
//! rebasing because the region is defined in world space.

use crate::fake_player::FAKE_ENTITY_ID;
use crate::pipeline::{Decision, Stage, StageContext, StageError};
use crate::region::{Offset, Region};
use shared::{Packet, Vec3, AIR_BLOCK_ID};

/// Non-controllers' clients must not receive state-authoritative packets;
/// they would fight the real controller's client-side prediction.
pub struct ControlGate;

impl Stage for ControlGate {
    fn name(&self) -> &'static str {
        "control_gate"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        if cx.is_controller {
            return Ok(Decision::Pass);
        }
        if cx
            .config
            .control_gated_packets
            .iter()
            .any(|kind| kind == packet.kind())
        {
            return Ok(Decision::Drop);
        }
        Ok(Decision::Pass)
    }
}

/// Packets referencing the automated participant's real entity are rewritten
/// to reference the synthetic stand-in for observers who are not in control,
/// so they never see a ghost entity id.
pub struct FakeEntitySwap;

impl Stage for FakeEntitySwap {
    fn name(&self) -> &'static str {
        "fake_entity_swap"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        if cx.is_controller {
            return Ok(Decision::Pass);
        }
        let real_id = cx.upstream.entity_id;

        match packet {
            Packet::Collect {
                collected_id,
                collector_id,
                count,
            } if *collector_id == real_id => Ok(Decision::Replace(Packet::Collect {
                collected_id: *collected_id,
                collector_id: FAKE_ENTITY_ID,
                count: *count,
            })),
            Packet::EntityMetadata {
                entity_id,
                metadata,
            } if *entity_id == real_id => Ok(Decision::Replace(Packet::EntityMetadata {
                entity_id: FAKE_ENTITY_ID,
                metadata: metadata.clone(),
            })),
            Packet::EntityAttributes {
                entity_id,
                properties,
            } if *entity_id == real_id => Ok(Decision::Replace(Packet::EntityAttributes {
                entity_id: FAKE_ENTITY_ID,
                properties: properties.clone(),
            })),
            _ => Ok(Decision::Pass),
        }
    }
}

/// Recipe unlock toasts would fire on every multiplexed client; drop them
/// outright.
pub struct RecipeUnlockSuppress;

impl Stage for RecipeUnlockSuppress {
    fn name(&self) -> &'static str {
        "recipe_unlock_suppress"
    }

    fn apply(&self, packet: &Packet, _: &mut StageContext<'_>) -> Result<Decision, StageError> {
        match packet {
            Packet::UnlockRecipes { .. } => Ok(Decision::Drop),
            _ => Ok(Decision::Pass),
        }
    }
}

/// Chunk columns fully outside the allowed region are emptied, not dropped:
/// the client still acknowledges the chunk slot.
pub struct RegionMask;

impl Stage for RegionMask {
    fn name(&self) -> &'static str {
        "region_mask"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let Packet::ChunkData(column) = packet else {
            return Ok(Decision::Pass);
        };

        let region = Region::new(cx.config.region_center, cx.config.region_half_extent);
        if region.chunk_fully_outside(column.x, column.z) {
            Ok(Decision::Replace(Packet::ChunkData(column.emptied())))
        } else {
            Ok(Decision::Pass)
        }
    }
}

/// Disallowed material is rewritten to empty/air wherever it appears. These
/// packets are never dropped; dropping would desynchronize inventory and
/// world state.
pub struct BannedContentFilter;

impl Stage for BannedContentFilter {
    fn name(&self) -> &'static str {
        "banned_content_filter"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let banned = &cx.config.banned_materials;

        match packet {
            Packet::BlockUpdate { location, block_id } if banned.contains(block_id) => {
                Ok(Decision::Replace(Packet::BlockUpdate {
                    location: *location,
                    block_id: AIR_BLOCK_ID,
                }))
            }
            Packet::MultiBlockChange {
                chunk_x,
                chunk_z,
                records,
            } if records.iter().any(|r| banned.contains(&r.block_id)) => {
                let records = records
                    .iter()
                    .map(|r| {
                        let mut record = *r;
                        if banned.contains(&record.block_id) {
                            record.block_id = AIR_BLOCK_ID;
                        }
                        record
                    })
                    .collect();
                Ok(Decision::Replace(Packet::MultiBlockChange {
                    chunk_x: *chunk_x,
                    chunk_z: *chunk_z,
                    records,
                }))
            }
            Packet::SetSlot {
                window_id,
                slot,
                item: Some(item),
            } if banned.contains(&item.item_id) => Ok(Decision::Replace(Packet::SetSlot {
                window_id: *window_id,
                slot: *slot,
                item: None,
            })),
            Packet::WindowItems { window_id, items }
                if items
                    .iter()
                    .flatten()
                    .any(|slot| banned.contains(&slot.item_id)) =>
            {
                let items = items
                    .iter()
                    .map(|entry| (*entry).filter(|slot| !banned.contains(&slot.item_id)))
                    .collect();
                Ok(Decision::Replace(Packet::WindowItems {
                    window_id: *window_id,
                    items,
                }))
            }
            _ => Ok(Decision::Pass),
        }
    }
}

/// Every position-bearing packet is shifted into observer space as the last
/// stage, after all world-space decisions have been made.
pub struct OutboundRebase;

impl Stage for OutboundRebase {
    fn name(&self) -> &'static str {
        "outbound_rebase"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let offset = Offset(cx.config.coordinate_offset);
        if offset.is_zero() {
            return Ok(Decision::Pass);
        }

        match packet {
            Packet::PlayerTeleport {
                x,
                y,
                z,
                yaw,
                pitch,
                flags,
                teleport_id,
            } => {
                let shown = offset.to_observer(Vec3::new(*x, *y, *z));
                Ok(Decision::Replace(Packet::PlayerTeleport {
                    x: shown.x,
                    y: shown.y,
                    z: shown.z,
                    yaw: *yaw,
                    pitch: *pitch,
                    flags: *flags,
                    teleport_id: *teleport_id,
                }))
            }
            Packet::EntityTeleport {
                entity_id,
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            } => {
                let shown = offset.to_observer(Vec3::new(*x, *y, *z));
                Ok(Decision::Replace(Packet::EntityTeleport {
                    entity_id: *entity_id,
                    x: shown.x,
                    y: shown.y,
                    z: shown.z,
                    yaw: *yaw,
                    pitch: *pitch,
                    on_ground: *on_ground,
                }))
            }
            Packet::SpawnPlayer {
                entity_id,
                uuid,
                x,
                y,
                z,
                yaw,
                pitch,
            } => {
                let shown = offset.to_observer(Vec3::new(*x, *y, *z));
                Ok(Decision::Replace(Packet::SpawnPlayer {
                    entity_id: *entity_id,
                    uuid: uuid.clone(),
                    x: shown.x,
                    y: shown.y,
                    z: shown.z,
                    yaw: *yaw,
                    pitch: *pitch,
                }))
            }
            Packet::SpawnPosition { location, angle } => {
                let (x, y, z) = offset.block_to_observer(location.x, location.y, location.z);
                Ok(Decision::Replace(Packet::SpawnPosition {
                    location: shared::BlockPos { x, y, z },
                    angle: *angle,
                }))
            }
            Packet::BlockUpdate { location, block_id } => {
                let (x, y, z) = offset.block_to_observer(location.x, location.y, location.z);
                Ok(Decision::Replace(Packet::BlockUpdate {
                    location: shared::BlockPos { x, y, z },
                    block_id: *block_id,
                }))
            }
            Packet::PlayerInfo { entries } => {
                let entries = entries
                    .iter()
                    .map(|entry| {
                        let mut entry = entry.clone();
                        entry.position = entry.position.map(|pos| offset.to_observer(pos));
                        entry
                    })
                    .collect();
                Ok(Decision::Replace(Packet::PlayerInfo { entries }))
            }
            Packet::ChunkData(column) => {
                let (shift_x, shift_z) = offset.chunk_shift();
                let mut column = column.clone();
                column.x -= shift_x;
                column.z -= shift_z;
                Ok(Decision::Replace(Packet::ChunkData(column)))
            }
            Packet::MultiBlockChange {
                chunk_x,
                chunk_z,
                records,
            } => {
                let (shift_x, shift_z) = offset.chunk_shift();
                Ok(Decision::Replace(Packet::MultiBlockChange {
                    chunk_x: chunk_x - shift_x,
                    chunk_z: chunk_z - shift_z,
                    records: records.clone(),
                }))
            }
            _ => Ok(Decision::Pass),
        }
    }
}

pub fn outbound_pipeline() -> crate::pipeline::Pipeline {
    crate::pipeline::Pipeline::new(vec![
        Box::new(ControlGate),
        Box::new(FakeEntitySwap),
        Box::new(RecipeUnlockSuppress),
        Box::new(RegionMask),
        Box::new(BannedContentFilter),
        Box::new(OutboundRebase),
    ])
}
