//! Observer-to-upstream stages, in pipeline order: command interception,
//! chat relay, camera release, coordinate rebase, region guard, banned
//! interaction guard. Only the control holder's packets are forwarded
//! upstream, but the front of the pipeline (commands, chat, camera) applies
//! to every observer.

use crate::pipeline::{Decision, Stage, StageAction, StageContext, StageError};
use crate::region::{Offset, Region};
use shared::{InteractAction, Packet};

/// Chat starting with the command prefix is fully consumed here and handed
/// to the dispatcher; it never reaches the upstream server.
pub struct CommandIntercept;

impl Stage for CommandIntercept {
    fn name(&self) -> &'static str {
        "command_intercept"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let Packet::ChatFromObserver { message } = packet else {
            return Ok(Decision::Pass);
        };

        cx.act(StageAction::RawChat(message.clone()));

        if message.trim().starts_with(&cx.config.command_prefix) {
            cx.act(StageAction::DispatchCommand(message.trim().to_string()));
            return Ok(Decision::Drop);
        }
        Ok(Decision::Pass)
    }
}

/// Normal chat: clamp to the configured length and surface a chat event.
pub struct ChatRelay;

impl Stage for ChatRelay {
    fn name(&self) -> &'static str {
        "chat_relay"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let Packet::ChatFromObserver { message } = packet else {
            return Ok(Decision::Pass);
        };

        let clamped: String = message.chars().take(cx.config.max_chat_len).collect();
        cx.act(StageAction::ChatEvent(clamped.clone()));

        if clamped.len() != message.len() {
            Ok(Decision::Replace(Packet::ChatFromObserver {
                message: clamped,
            }))
        } else {
            Ok(Decision::Pass)
        }
    }
}

/// A spectator clicking while their camera is bound releases the view
/// instead of interacting with the world.
pub struct CameraReleaseGuard;

impl Stage for CameraReleaseGuard {
    fn name(&self) -> &'static str {
        "camera_release_guard"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let Packet::EntityInteract { action, .. } = packet else {
            return Ok(Decision::Pass);
        };

        if cx.observer.in_camera
            && matches!(action, InteractAction::Interact | InteractAction::Attack)
        {
            cx.act(StageAction::ReleaseCamera);
            return Ok(Decision::Drop);
        }
        Ok(Decision::Pass)
    }
}

/// Observers live in offset space; movement and placement coordinates are
/// translated back to world space before anything downstream looks at them.
pub struct InboundRebase;

impl Stage for InboundRebase {
    fn name(&self) -> &'static str {
        "inbound_rebase"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let offset = Offset(cx.config.coordinate_offset);
        if offset.is_zero() {
            return Ok(Decision::Pass);
        }

        match packet {
            Packet::PlayerMove {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            } => {
                let world = offset.to_world(shared::Vec3::new(*x, *y, *z));
                Ok(Decision::Replace(Packet::PlayerMove {
                    x: world.x,
                    y: world.y,
                    z: world.z,
                    yaw: *yaw,
                    pitch: *pitch,
                    on_ground: *on_ground,
                }))
            }
            Packet::BlockPlace {
                location,
                held_item_id,
            } => {
                let (x, y, z) = offset.block_to_world(location.x, location.y, location.z);
                Ok(Decision::Replace(Packet::BlockPlace {
                    location: shared::BlockPos { x, y, z },
                    held_item_id: *held_item_id,
                }))
            }
            _ => Ok(Decision::Pass),
        }
    }
}

/// Movement by the control holder outside the allowed region is refused:
/// the packet is dropped and the observer is snapped back to the automated
/// participant's last known position.
pub struct RegionGuard;

impl Stage for RegionGuard {
    fn name(&self) -> &'static str {
        "region_guard"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        if !cx.is_controller {
            return Ok(Decision::Pass);
        }

        let Packet::PlayerMove {
            x, y, z, yaw, pitch, ..
        } = packet
        else {
            return Ok(Decision::Pass);
        };

        let region = Region::new(cx.config.region_center, cx.config.region_half_extent);
        let candidate = shared::Vec3::new(*x, *y, *z);
        if region.contains(candidate) {
            return Ok(Decision::Pass);
        }

        let offset = Offset(cx.config.coordinate_offset);
        let safe = offset.to_observer(cx.upstream.position);
        cx.act(StageAction::SendToObserver(Packet::PlayerTeleport {
            x: safe.x,
            y: safe.y,
            z: safe.z,
            yaw: *yaw,
            pitch: *pitch,
            flags: 0,
            teleport_id: 1,
        }));
        cx.act(StageAction::Notice(cx.config.restrict_message.clone()));
        Ok(Decision::Drop)
    }
}

/// Placement or use of a disallowed material never reaches the server.
pub struct BannedInteractionGuard;

impl Stage for BannedInteractionGuard {
    fn name(&self) -> &'static str {
        "banned_interaction_guard"
    }

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError> {
        let item = match packet {
            Packet::BlockPlace { held_item_id, .. } => *held_item_id,
            Packet::UseItem { item_id } => *item_id,
            _ => return Ok(Decision::Pass),
        };

        if cx.config.banned_materials.contains(&item) {
            Ok(Decision::Drop)
        } else {
            Ok(Decision::Pass)
        }
    }
}

pub fn inbound_pipeline() -> crate::pipeline::Pipeline {
    crate::pipeline::Pipeline::new(vec![
        Box::new(CommandIntercept),
        Box::new(ChatRelay),
        Box::new(CameraReleaseGuard),
        Box::new(InboundRebase),
        Box::new(RegionGuard),
        Box::new(BannedInteractionGuard),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProxyOptions};
    use crate::session::{ObserverCtx, UpstreamView};
    use shared::{BlockPos, Identity, Vec3};

    fn config() -> Config {
        ProxyOptions {
            region_half_extent: Some(50.0),
            ..Default::default()
        }
        .resolve()
    }

    fn upstream() -> UpstreamView {
        UpstreamView {
            identity: Identity::new("bot", "u-bot"),
            entity_id: 1,
            position: Vec3::new(10.0, 64.0, 10.0),
        }
    }

    #[test]
    fn test_command_is_consumed_and_dispatched() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = inbound_pipeline().run(
            Packet::ChatFromObserver {
                message: "$link".to_string(),
            },
            &mut cx,
        );

        assert!(out.is_none());
        let actions = cx.take_actions();
        assert!(actions.contains(&StageAction::RawChat("$link".to_string())));
        assert!(actions.contains(&StageAction::DispatchCommand("$link".to_string())));
    }

    #[test]
    fn test_normal_chat_passes_with_event() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = inbound_pipeline().run(
            Packet::ChatFromObserver {
                message: "hello there".to_string(),
            },
            &mut cx,
        );

        assert_eq!(
            out,
            Some(Packet::ChatFromObserver {
                message: "hello there".to_string()
            })
        );
        assert!(cx
            .take_actions()
            .contains(&StageAction::ChatEvent("hello there".to_string())));
    }

    #[test]
    fn test_long_chat_is_clamped() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let long = "x".repeat(400);
        let out = inbound_pipeline().run(Packet::ChatFromObserver { message: long }, &mut cx);

        match out {
            Some(Packet::ChatFromObserver { message }) => {
                assert_eq!(message.len(), config.max_chat_len)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_interact_while_in_camera_releases_view() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx {
            in_camera: true,
            ..Default::default()
        };
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, false);

        let out = inbound_pipeline().run(
            Packet::EntityInteract {
                target_id: 5,
                action: InteractAction::Attack,
                sneaking: false,
            },
            &mut cx,
        );

        assert!(out.is_none());
        assert!(cx.take_actions().contains(&StageAction::ReleaseCamera));
    }

    #[test]
    fn test_interact_without_camera_passes() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let packet = Packet::EntityInteract {
            target_id: 5,
            action: InteractAction::Attack,
            sneaking: false,
        };
        let out = inbound_pipeline().run(packet.clone(), &mut cx);
        assert_eq!(out, Some(packet));
    }

    #[test]
    fn test_movement_outside_region_is_reset() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = inbound_pipeline().run(
            Packet::PlayerMove {
                x: 60.0,
                y: 64.0,
                z: 0.0,
                yaw: 0.0,
                pitch: 0.0,
                on_ground: true,
            },
            &mut cx,
        );

        assert!(out.is_none());
        let actions = cx.take_actions();
        assert!(actions.iter().any(|a| matches!(
            a,
            StageAction::SendToObserver(Packet::PlayerTeleport { x, y, z, .. })
                if *x == 10.0 && *y == 64.0 && *z == 10.0
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, StageAction::Notice(msg) if msg == &config.restrict_message)));
    }

    #[test]
    fn test_movement_inside_region_passes() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let packet = Packet::PlayerMove {
            x: 20.0,
            y: 64.0,
            z: -30.0,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
        };
        let out = inbound_pipeline().run(packet.clone(), &mut cx);
        assert_eq!(out, Some(packet));
    }

    #[test]
    fn test_region_guard_ignores_non_controller() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, false);

        // Spectator movement is never forwarded upstream, so the guard does
        // not fight it.
        let packet = Packet::PlayerMove {
            x: 500.0,
            y: 64.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
        };
        let out = inbound_pipeline().run(packet.clone(), &mut cx);
        assert_eq!(out, Some(packet));
        assert!(cx.take_actions().is_empty());
    }

    #[test]
    fn test_inbound_rebase_restores_world_coordinates() {
        let config = ProxyOptions {
            coordinate_offset: Some(Vec3::new(-1000.0, 0.0, 500.0)),
            region_half_extent: Some(10_000.0),
            ..Default::default()
        }
        .resolve();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        // The observer sees world (120, 64, -340) as (1120, 64, -840).
        let out = inbound_pipeline().run(
            Packet::PlayerMove {
                x: 1120.0,
                y: 64.0,
                z: -840.0,
                yaw: 0.0,
                pitch: 0.0,
                on_ground: true,
            },
            &mut cx,
        );

        match out {
            Some(Packet::PlayerMove { x, y, z, .. }) => {
                assert_eq!((x, y, z), (120.0, 64.0, -340.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_banned_placement_is_dropped() {
        let config = config();
        let upstream = upstream();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = inbound_pipeline().run(
            Packet::BlockPlace {
                location: BlockPos { x: 1, y: 64, z: 1 },
                held_item_id: 46,
            },
            &mut cx,
        );
        assert!(out.is_none());

        let out = inbound_pipeline().run(Packet::UseItem { item_id: 46 }, &mut cx);
        assert!(out.is_none());

        let allowed = Packet::UseItem { item_id: 3 };
        let out = inbound_pipeline().run(allowed.clone(), &mut cx);
        assert_eq!(out, Some(allowed));
    }
}
