//! Spectator presentation for observers who are not in control: spectator
//! game mode, camera attachment to the automated participant's viewpoint,
//! and teleporting back to its position.

use crate::fake_player::FAKE_ENTITY_ID;
use crate::session::ObserverCtx;
use shared::{Packet, Vec3};
use thiserror::Error;

const GAMEMODE_CHANGE: u8 = 3;
const SPECTATOR_MODE: f32 = 3.0;
const NORMAL_MODE: f32 = 0.0;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpectatorError {
    #[error("cannot attach the camera while in control")]
    AlreadyInControl,
}

pub fn spectator_mode_packets() -> Vec<Packet> {
    vec![Packet::GameStateChange {
        reason: GAMEMODE_CHANGE,
        value: SPECTATOR_MODE,
    }]
}

pub fn normal_mode_packets() -> Vec<Packet> {
    vec![Packet::GameStateChange {
        reason: GAMEMODE_CHANGE,
        value: NORMAL_MODE,
    }]
}

/// Binds the observer's camera to the stand-in entity, i.e. the automated
/// participant's viewpoint. Fails for the control holder; their camera IS
/// the session.
pub fn attach_view(
    ctx: &mut ObserverCtx,
    is_controller: bool,
) -> Result<Vec<Packet>, SpectatorError> {
    if is_controller {
        return Err(SpectatorError::AlreadyInControl);
    }
    if ctx.in_camera {
        return Ok(Vec::new());
    }
    ctx.in_camera = true;
    Ok(vec![Packet::Camera {
        entity_id: FAKE_ENTITY_ID,
    }])
}

/// Releases a camera attachment, snapping the camera back to the observer's
/// own entity and re-syncing its position. Idempotent: `None` when no
/// attachment was active.
pub fn release_view(
    ctx: &mut ObserverCtx,
    own_entity_id: i32,
    upstream_pos: Vec3,
) -> Option<Vec<Packet>> {
    if !ctx.in_camera {
        return None;
    }
    ctx.in_camera = false;
    Some(vec![
        Packet::Camera {
            entity_id: own_entity_id,
        },
        teleport_packet(upstream_pos),
    ])
}

pub fn teleport_packet(pos: Vec3) -> Packet {
    Packet::PlayerTeleport {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        yaw: 0.0,
        pitch: 0.0,
        flags: 0,
        teleport_id: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_rejected_for_controller() {
        let mut ctx = ObserverCtx::default();
        let err = attach_view(&mut ctx, true).unwrap_err();
        assert_eq!(err, SpectatorError::AlreadyInControl);
        assert!(!ctx.in_camera);
    }

    #[test]
    fn test_attach_binds_camera_to_stand_in() {
        let mut ctx = ObserverCtx::default();
        let packets = attach_view(&mut ctx, false).unwrap();

        assert!(ctx.in_camera);
        assert_eq!(
            packets,
            vec![Packet::Camera {
                entity_id: FAKE_ENTITY_ID
            }]
        );
    }

    #[test]
    fn test_attach_twice_is_noop() {
        let mut ctx = ObserverCtx::default();
        attach_view(&mut ctx, false).unwrap();
        let packets = attach_view(&mut ctx, false).unwrap();
        assert!(packets.is_empty());
        assert!(ctx.in_camera);
    }

    #[test]
    fn test_release_restores_own_camera_and_position() {
        let mut ctx = ObserverCtx::default();
        attach_view(&mut ctx, false).unwrap();

        let packets = release_view(&mut ctx, 42, Vec3::new(1.0, 64.0, 2.0)).unwrap();
        assert!(!ctx.in_camera);
        assert_eq!(packets[0], Packet::Camera { entity_id: 42 });
        assert!(matches!(
            packets[1],
            Packet::PlayerTeleport { x, y, z, .. } if x == 1.0 && y == 64.0 && z == 2.0
        ));
    }

    #[test]
    fn test_release_without_attachment_is_noop() {
        let mut ctx = ObserverCtx::default();
        assert!(release_view(&mut ctx, 42, Vec3::zero()).is_none());
    }

    #[test]
    fn test_mode_packets() {
        assert_eq!(
            spectator_mode_packets(),
            vec![Packet::GameStateChange {
                reason: GAMEMODE_CHANGE,
                value: SPECTATOR_MODE
            }]
        );
        assert_eq!(
            normal_mode_packets(),
            vec![Packet::GameStateChange {
                reason: GAMEMODE_CHANGE,
                value: NORMAL_MODE
            }]
        );
    }
}
