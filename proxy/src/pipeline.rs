//! Packet transformation pipeline: an ordered list of stages evaluated per
//! packet, short-circuiting on the first `Drop`.
//!
//! Stages only communicate through the packet they return and through
//! [`StageAction`]s the orchestrator applies afterwards, so one stage can
//! never observe another's side effects mid-packet. A stage error never
//! kills the pipeline; the packet passes through unchanged with a warning.

use crate::config::Config;
use crate::session::{ObserverCtx, UpstreamView};
use log::{debug, warn};
use shared::Packet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Pass,
    Replace(Packet),
    Drop,
}

#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("stage invariant violated: {0}")]
    Invariant(String),
}

/// Deferred effects a stage requests; drained by the orchestrator after the
/// pipeline run so stages stay isolated from each other.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAction {
    /// Chat input carrying the command prefix; consume and dispatch.
    DispatchCommand(String),
    /// Chat text as typed, commands included.
    RawChat(String),
    /// Relayed (non-command) chat text.
    ChatEvent(String),
    /// Release this observer's camera attachment.
    ReleaseCamera,
    /// Deliver a packet straight back to this observer.
    SendToObserver(Packet),
    /// One proxy chat notice to this observer.
    Notice(String),
}

pub struct StageContext<'a> {
    pub config: &'a Config,
    pub upstream: &'a UpstreamView,
    pub observer: &'a mut ObserverCtx,
    pub is_controller: bool,
    actions: Vec<StageAction>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a Config,
        upstream: &'a UpstreamView,
        observer: &'a mut ObserverCtx,
        is_controller: bool,
    ) -> Self {
        Self {
            config,
            upstream,
            observer,
            is_controller,
            actions: Vec::new(),
        }
    }

    pub fn act(&mut self, action: StageAction) {
        self.actions.push(action);
    }

    pub fn take_actions(&mut self) -> Vec<StageAction> {
        std::mem::take(&mut self.actions)
    }
}

pub trait Stage: Send {
    fn name(&self) -> &'static str;

    fn apply(&self, packet: &Packet, cx: &mut StageContext<'_>) -> Result<Decision, StageError>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Runs the packet through every stage in order. Returns `None` when a
    /// stage dropped it; later stages are skipped.
    pub fn run(&self, packet: Packet, cx: &mut StageContext<'_>) -> Option<Packet> {
        let mut current = packet;
        for stage in &self.stages {
            match stage.apply(&current, cx) {
                Ok(Decision::Pass) => {}
                Ok(Decision::Replace(next)) => current = next,
                Ok(Decision::Drop) => {
                    debug!("stage {} dropped {}", stage.name(), current.kind());
                    return None;
                }
                Err(err) => {
                    warn!(
                        "stage {} failed on {}: {}; passing through",
                        stage.name(),
                        current.kind(),
                        err
                    );
                }
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyOptions;
    use shared::{Identity, Vec3};

    struct PassStage;
    impl Stage for PassStage {
        fn name(&self) -> &'static str {
            "pass"
        }
        fn apply(&self, _: &Packet, _: &mut StageContext<'_>) -> Result<Decision, StageError> {
            Ok(Decision::Pass)
        }
    }

    struct DropChat;
    impl Stage for DropChat {
        fn name(&self) -> &'static str {
            "drop_chat"
        }
        fn apply(&self, packet: &Packet, _: &mut StageContext<'_>) -> Result<Decision, StageError> {
            match packet {
                Packet::ChatFromObserver { .. } => Ok(Decision::Drop),
                _ => Ok(Decision::Pass),
            }
        }
    }

    struct RewriteCamera;
    impl Stage for RewriteCamera {
        fn name(&self) -> &'static str {
            "rewrite_camera"
        }
        fn apply(&self, packet: &Packet, _: &mut StageContext<'_>) -> Result<Decision, StageError> {
            match packet {
                Packet::Camera { .. } => Ok(Decision::Replace(Packet::Camera { entity_id: 42 })),
                _ => Ok(Decision::Pass),
            }
        }
    }

    struct FailingStage;
    impl Stage for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn apply(&self, _: &Packet, _: &mut StageContext<'_>) -> Result<Decision, StageError> {
            Err(StageError::Invariant("broken".to_string()))
        }
    }

    fn view() -> UpstreamView {
        UpstreamView {
            identity: Identity::new("bot", "u-bot"),
            entity_id: 1,
            position: Vec3::zero(),
        }
    }

    #[test]
    fn test_drop_short_circuits() {
        let pipeline = Pipeline::new(vec![Box::new(DropChat), Box::new(RewriteCamera)]);
        let config = ProxyOptions::default().resolve();
        let upstream = view();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = pipeline.run(
            Packet::ChatFromObserver {
                message: "hi".to_string(),
            },
            &mut cx,
        );
        assert!(out.is_none());
    }

    #[test]
    fn test_replace_feeds_next_stage() {
        let pipeline = Pipeline::new(vec![Box::new(RewriteCamera), Box::new(PassStage)]);
        let config = ProxyOptions::default().resolve();
        let upstream = view();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        let out = pipeline.run(Packet::Camera { entity_id: 7 }, &mut cx);
        assert_eq!(out, Some(Packet::Camera { entity_id: 42 }));
    }

    #[test]
    fn test_stage_error_is_treated_as_pass() {
        let pipeline = Pipeline::new(vec![Box::new(FailingStage), Box::new(RewriteCamera)]);
        let config = ProxyOptions::default().resolve();
        let upstream = view();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, true);

        // The failing stage is skipped; the rest of the pipeline still runs.
        let out = pipeline.run(Packet::Camera { entity_id: 7 }, &mut cx);
        assert_eq!(out, Some(Packet::Camera { entity_id: 42 }));
    }

    #[test]
    fn test_actions_accumulate() {
        let config = ProxyOptions::default().resolve();
        let upstream = view();
        let mut ctx = ObserverCtx::default();
        let mut cx = StageContext::new(&config, &upstream, &mut ctx, false);

        cx.act(StageAction::Notice("one".to_string()));
        cx.act(StageAction::ReleaseCamera);

        let actions = cx.take_actions();
        assert_eq!(actions.len(), 2);
        assert!(cx.take_actions().is_empty());
    }
}
