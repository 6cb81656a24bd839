//! Session orchestrator: owns the upstream session, the observer registry,
//! the control state machine and both packet pipelines.
//!
//! Everything funnels into one `select!` loop, so control transitions,
//! pipeline runs and fake-entity bookkeeping are serialized. A race between
//! an observer disconnect and a `link` command cannot leave control pointing
//! at a dead connection because both arrive on the same queue.

use crate::commands::{self, Command};
use crate::config::{Config, ProxyOptions};
use crate::control::{Control, ControlError};
use crate::events::{EventBus, ObserverInfo, ProxyEvent};
use crate::fake_player::FakePlayer;
use crate::inbound::inbound_pipeline;
use crate::outbound::outbound_pipeline;
use crate::pipeline::{Pipeline, StageAction, StageContext};
use crate::region::Offset;
use crate::session::{
    ListenerLink, ObserverId, ObserverListener, ObserverLogin, ObserverRegistry, ObserverWrite,
    UpstreamConnector, UpstreamEvent, UpstreamLink, UpstreamState, UpstreamStatus,
};
use crate::spectator;
use log::{error, info, warn};
use shared::{Packet, Vec3};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;

/// Commands an embedding application may issue at any time.
#[derive(Debug)]
pub enum AppCommand {
    StartUpstream,
    StopUpstream { reason: String },
    StartListener,
    StopListener { reason: String },
    Broadcast { text: String },
    Link { observer: ObserverId },
    Unlink { observer: Option<ObserverId> },
    SetMotd { line1: String, line2: String },
    Shutdown,
}

/// Cloneable surface handed to the embedding application.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<AppCommand>,
    events: EventBus,
}

impl OrchestratorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    pub fn start_upstream(&self) {
        let _ = self.tx.send(AppCommand::StartUpstream);
    }

    pub fn stop_upstream(&self, reason: &str) {
        let _ = self.tx.send(AppCommand::StopUpstream {
            reason: reason.to_string(),
        });
    }

    pub fn start_listener(&self) {
        let _ = self.tx.send(AppCommand::StartListener);
    }

    pub fn stop_listener(&self, reason: &str) {
        let _ = self.tx.send(AppCommand::StopListener {
            reason: reason.to_string(),
        });
    }

    pub fn broadcast(&self, text: &str) {
        let _ = self.tx.send(AppCommand::Broadcast {
            text: text.to_string(),
        });
    }

    pub fn link(&self, observer: ObserverId) {
        let _ = self.tx.send(AppCommand::Link { observer });
    }

    pub fn unlink(&self, observer: Option<ObserverId>) {
        let _ = self.tx.send(AppCommand::Unlink { observer });
    }

    pub fn set_motd(&self, line1: &str, line2: &str) {
        let _ = self.tx.send(AppCommand::SetMotd {
            line1: line1.to_string(),
            line2: line2.to_string(),
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(AppCommand::Shutdown);
    }
}

/// Messages funneled into the main loop by the per-connection forwarder
/// tasks. Generation counters fence off events from torn-down sessions.
enum Internal {
    Login { generation: u64, login: ObserverLogin },
    ListenerClosed { generation: u64 },
    FromObserver { id: ObserverId, packet: Packet },
    ObserverGone { id: ObserverId },
    Upstream { generation: u64, event: UpstreamEvent },
    UpstreamClosed { generation: u64 },
}

struct ListenerState {
    addr: String,
    motd: watch::Sender<String>,
    shutdown: mpsc::UnboundedSender<String>,
}

pub struct Orchestrator<C, L> {
    config: Arc<Config>,
    connector: C,
    listener_factory: L,
    control: Control,
    observers: ObserverRegistry,
    upstream: Option<UpstreamState>,
    upstream_gen: u64,
    upstream_ever_started: bool,
    fake_player: Option<FakePlayer>,
    inbound: Pipeline,
    outbound: Pipeline,
    events: EventBus,
    listener: Option<ListenerState>,
    listener_gen: u64,
    /// Logins held back until the upstream's spawn-dependent state exists.
    pending_logins: Vec<ObserverLogin>,
    motd_override: Option<String>,
    cmd_rx: mpsc::UnboundedReceiver<AppCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl<C, L> Orchestrator<C, L>
where
    C: UpstreamConnector,
    L: ObserverListener,
{
    pub fn new(options: ProxyOptions, connector: C, listener_factory: L) -> (Self, OrchestratorHandle) {
        let config = Arc::new(options.resolve());
        let events = EventBus::default();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let handle = OrchestratorHandle {
            tx: cmd_tx,
            events: events.clone(),
        };

        let orchestrator = Self {
            motd_override: config.motd.clone(),
            config,
            connector,
            listener_factory,
            control: Control::new(),
            observers: ObserverRegistry::new(),
            upstream: None,
            upstream_gen: 0,
            upstream_ever_started: false,
            fake_player: None,
            inbound: inbound_pipeline(),
            outbound: outbound_pipeline(),
            events,
            listener: None,
            listener_gen: 0,
            pending_logins: Vec::new(),
            cmd_rx,
            internal_tx,
            internal_rx,
        };
        (orchestrator, handle)
    }

    /// Drives the proxy until shutdown. All state transitions happen here.
    pub async fn run(mut self) {
        if self.config.auto_start_upstream {
            self.start_upstream().await;
        }
        if self.config.auto_start_listener {
            self.start_listener().await;
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(AppCommand::Shutdown) => {
                            info!("Orchestrator shutting down");
                            break;
                        }
                        Some(cmd) => self.handle_app_command(cmd).await,
                    }
                }
                msg = self.internal_rx.recv() => {
                    if let Some(msg) = msg {
                        self.handle_internal(msg).await;
                    }
                }
            }
        }
    }

    async fn handle_app_command(&mut self, cmd: AppCommand) {
        match cmd {
            AppCommand::StartUpstream => self.start_upstream().await,
            AppCommand::StopUpstream { reason } => self.stop_upstream(&reason),
            AppCommand::StartListener => self.start_listener().await,
            AppCommand::StopListener { reason } => self.stop_listener(&reason),
            AppCommand::Broadcast { text } => self.broadcast_notice(&text),
            AppCommand::Link { observer } => self.link_observer(observer),
            AppCommand::Unlink { observer } => match observer {
                Some(id) => self.unlink_observer(id),
                None => self.force_unlink(),
            },
            AppCommand::SetMotd { line1, line2 } => self.set_motd(&line1, &line2),
            // Intercepted by the run loop.
            AppCommand::Shutdown => {}
        }
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Login { generation, login } => {
                if generation != self.listener_gen {
                    login.end("Proxy server closed");
                    return;
                }
                self.handle_login(login).await;
            }
            Internal::ListenerClosed { generation } => {
                if generation == self.listener_gen && self.listener.take().is_some() {
                    info!("Listener closed");
                    self.events.publish(ProxyEvent::ListenerEnded);
                }
            }
            Internal::FromObserver { id, packet } => self.handle_observer_packet(id, packet),
            Internal::ObserverGone { id } => self.handle_observer_gone(id),
            Internal::Upstream { generation, event } => {
                if generation != self.upstream_gen {
                    return;
                }
                self.handle_upstream_event(event).await;
            }
            Internal::UpstreamClosed { generation } => {
                if generation == self.upstream_gen && self.upstream.is_some() {
                    self.stop_upstream("Connection closed");
                }
            }
        }
    }

    // ----- upstream lifecycle -----

    async fn start_upstream(&mut self) {
        if self.upstream.is_some() {
            info!("Upstream already started, not starting");
            return;
        }
        info!("Starting upstream session");
        self.upstream_ever_started = true;

        let link = match timeout(self.config.handshake_timeout, self.connector.connect()).await {
            Err(_) => {
                let message = format!(
                    "handshake timed out after {:?}",
                    self.config.handshake_timeout
                );
                error!("Upstream {}", message);
                self.events.publish(ProxyEvent::UpstreamError { message });
                return;
            }
            Ok(Err(err)) => {
                error!("Upstream handshake failed: {}", err);
                self.events.publish(ProxyEvent::UpstreamError {
                    message: err.to_string(),
                });
                return;
            }
            Ok(Ok(link)) => link,
        };

        let UpstreamLink {
            identity,
            entity_id,
            to_server,
            events,
        } = link;

        self.upstream_gen += 1;
        let generation = self.upstream_gen;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                if tx.send(Internal::Upstream { generation, event }).is_err() {
                    return;
                }
            }
            let _ = tx.send(Internal::UpstreamClosed { generation });
        });

        info!("Upstream logged in as {}", identity.username);
        self.upstream = Some(UpstreamState::new(identity, entity_id, to_server));
        self.events.publish(ProxyEvent::UpstreamStarted);
        self.refresh_motd();
    }

    fn stop_upstream(&mut self, reason: &str) {
        let Some(upstream) = self.upstream.take() else {
            return;
        };
        info!("Stopping upstream session: {}", reason);

        if let Some(mut fake) = self.fake_player.take() {
            for id in self.observers.ids() {
                if let Some(conn) = self.observers.get_mut(id) {
                    fake.unregister(conn);
                }
            }
        }
        self.control.unlink();
        // Anyone still waiting on the replay gate is turned away too.
        for login in self.pending_logins.drain(..) {
            login.end(reason);
        }
        if self.config.disconnect_observers_on_upstream_end {
            for id in self.observers.ids() {
                if let Some(conn) = self.observers.remove(id) {
                    conn.end(reason);
                }
            }
        }

        // Dropping the link closes the codec-facing channel.
        drop(upstream);
        self.upstream_gen += 1;

        self.events.publish(ProxyEvent::UpstreamEnded {
            reason: reason.to_string(),
        });
        self.refresh_motd();
        if self.config.stop_listener_on_upstream_end {
            self.stop_listener("Proxy server closed");
        }
    }

    async fn handle_upstream_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Ready { position, chunks } => self.on_upstream_ready(position, chunks),
            UpstreamEvent::Packet(packet) => self.on_upstream_packet(packet),
            UpstreamEvent::Position(position) => self.on_upstream_position(position),
            UpstreamEvent::Ended { reason } => self.stop_upstream(&reason),
            UpstreamEvent::Errored { message } => {
                error!("Upstream fault: {}", message);
                self.events.publish(ProxyEvent::UpstreamError {
                    message: message.clone(),
                });
                self.stop_upstream(&message);
            }
        }
    }

    fn on_upstream_ready(&mut self, position: Vec3, chunks: Vec<(i32, i32)>) {
        let identity = {
            let Some(upstream) = self.upstream.as_mut() else {
                return;
            };
            upstream.view.position = position;
            upstream.status = UpstreamStatus::Live;
            upstream.chunks = chunks.into_iter().collect();
            upstream.view.identity.clone()
        };

        if self.config.spawn_fake_entity {
            self.fake_player = Some(FakePlayer::new(identity));
        }
        self.events.publish(ProxyEvent::UpstreamReady);
        self.refresh_motd();

        let pending: Vec<ObserverLogin> = self.pending_logins.drain(..).collect();
        for login in pending {
            self.complete_attach(login);
        }
    }

    fn on_upstream_packet(&mut self, packet: Packet) {
        if let Packet::ChunkData(column) = &packet {
            if let Some(upstream) = self.upstream.as_mut() {
                upstream.chunks.insert((column.x, column.z));
            }
        }
        self.deliver_to_observers(packet);
    }

    fn on_upstream_position(&mut self, position: Vec3) {
        match self.upstream.as_mut() {
            Some(upstream) => upstream.view.position = position,
            None => return,
        }
        // Keep the stand-in's body in step for everyone it is shown to.
        if let Some(fake) = &self.fake_player {
            let shown = Offset(self.config.coordinate_offset).to_observer(position);
            let movement = fake.movement_packet(shown);
            for conn in self.observers.iter() {
                if conn.ctx.fake_entity_shown {
                    conn.write(movement.clone());
                }
            }
        }
    }

    /// Runs the outbound pipeline once per observer and delivers whatever
    /// survives, preserving arrival order.
    fn deliver_to_observers(&mut self, packet: Packet) {
        let Some(view) = self.upstream.as_ref().map(|u| u.view.clone()) else {
            return;
        };
        let holder = self.control.holder();
        let config = Arc::clone(&self.config);
        let outbound = &self.outbound;

        for id in self.observers.ids() {
            let is_controller = holder == Some(id);
            if let Some(conn) = self.observers.get_mut(id) {
                let mut cx = StageContext::new(&config, &view, &mut conn.ctx, is_controller);
                if let Some(out) = outbound.run(packet.clone(), &mut cx) {
                    conn.write(out);
                }
            }
        }
    }

    // ----- listener lifecycle -----

    async fn start_listener(&mut self) {
        if self.listener.is_some() {
            return;
        }
        match self.listener_factory.listen().await {
            Err(err) => {
                // Fatal for the listening side: reported once, never retried.
                error!("Failed to start listener: {}", err);
                self.events.publish(ProxyEvent::ListenerError {
                    message: err.to_string(),
                });
            }
            Ok(link) => {
                let ListenerLink {
                    local_addr,
                    logins,
                    motd,
                    shutdown,
                } = link;

                self.listener_gen += 1;
                let generation = self.listener_gen;
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let mut logins = logins;
                    while let Some(login) = logins.recv().await {
                        if tx.send(Internal::Login { generation, login }).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Internal::ListenerClosed { generation });
                });

                info!("Listening on {}", local_addr);
                self.listener = Some(ListenerState {
                    addr: local_addr.clone(),
                    motd,
                    shutdown,
                });
                self.events
                    .publish(ProxyEvent::ListenerStarted { addr: local_addr });
                self.refresh_motd();
            }
        }
    }

    fn stop_listener(&mut self, reason: &str) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        info!("Stopping listener on {}: {}", listener.addr, reason);
        let _ = listener.shutdown.send(reason.to_string());
        self.listener_gen += 1;
        self.events.publish(ProxyEvent::ListenerEnded);
    }

    fn refresh_motd(&mut self) {
        let text = if let Some(motd) = &self.motd_override {
            motd.clone()
        } else if let Some(upstream) = &self.upstream {
            match upstream.status {
                UpstreamStatus::Live => {
                    format!("Logged in as {}", upstream.view.identity.username)
                }
                _ => "Waiting for connections".to_string(),
            }
        } else if !self.upstream_ever_started {
            "Waiting for connections".to_string()
        } else if self.config.auto_start_upstream_on_first_login {
            "Offline waiting for connections".to_string()
        } else {
            "Offline".to_string()
        };
        if let Some(listener) = &self.listener {
            let _ = listener.motd.send(text);
        }
    }

    fn set_motd(&mut self, line1: &str, line2: &str) {
        let clean = |s: &str| -> String { s.replace('\n', "").chars().take(200).collect() };
        self.motd_override = Some(format!("{}\n{}", clean(line1), clean(line2)));
        self.refresh_motd();
    }

    // ----- observer lifecycle -----

    async fn handle_login(&mut self, login: ObserverLogin) {
        if !self
            .config
            .allow_policy
            .permits(&login.identity.username, &login.identity.uuid)
        {
            warn!(
                "{} is not in the whitelist, kicking",
                login.identity.username
            );
            login.end(&self.config.kick_message);
            return;
        }

        if self.upstream.is_none() {
            if self.config.auto_start_upstream_on_first_login {
                self.start_upstream().await;
            }
            if self.upstream.is_none() {
                login.end("Bot not started");
                return;
            }
        }

        let live = self
            .upstream
            .as_ref()
            .map(|u| u.status == UpstreamStatus::Live)
            .unwrap_or(false);
        if !live {
            // Replay needs the upstream's spawn state; hold the login until
            // the Ready event.
            self.pending_logins.push(login);
            return;
        }

        self.complete_attach(login);
    }

    fn complete_attach(&mut self, login: ObserverLogin) {
        let ObserverLogin {
            identity,
            writes,
            packets,
        } = login;

        let id = self.observers.add(identity.clone(), writes);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let mut packets = packets;
            while let Some(packet) = packets.recv().await {
                if tx.send(Internal::FromObserver { id, packet }).is_err() {
                    return;
                }
            }
            let _ = tx.send(Internal::ObserverGone { id });
        });

        if self.config.log_join_leave {
            info!("Player {} joined the proxy", identity.username);
        }

        let takes_control = self.config.link_on_connect && !self.control.is_controlled();
        self.broadcast_notice(&format!(
            "User {} logged in. {}",
            identity.username,
            if takes_control {
                "He is in control"
            } else {
                "He is not in control"
            }
        ));
        if self.config.print_help_on_login {
            self.print_help(id);
        }

        if takes_control {
            self.link_observer(id);
        } else {
            self.make_spectator(id);
        }

        if let Some(observer) = self.observer_info(id) {
            self.events.publish(ProxyEvent::Connected { observer });
        }
    }

    fn handle_observer_gone(&mut self, id: ObserverId) {
        let Some(conn) = self.observers.remove(id) else {
            return;
        };
        let observer = ObserverInfo {
            id,
            username: conn.identity.username.clone(),
        };

        if let Some(fake) = self.fake_player.as_mut() {
            fake.forget(id);
        }
        // Same logical step as the removal: a racing link can never observe
        // the stale claim.
        if self.control.release_if_held(id) {
            self.events.publish(ProxyEvent::ControlReleased {
                observer: observer.clone(),
            });
        }

        if self.config.log_join_leave {
            info!("Player {} disconnected from the proxy", observer.username);
        }
        self.broadcast_notice(&format!("User {} disconnected", observer.username));
        self.events.publish(ProxyEvent::Disconnected { observer });

        if self.config.stop_upstream_on_last_observer_leave
            && self.observers.is_empty()
            && self.upstream.is_some()
        {
            self.stop_upstream("Proxy disconnected");
        }
    }

    fn handle_observer_packet(&mut self, id: ObserverId, packet: Packet) {
        let Some(view) = self.upstream.as_ref().map(|u| u.view.clone()) else {
            return;
        };
        let holder = self.control.holder();
        let is_controller = holder == Some(id);
        let config = Arc::clone(&self.config);
        let inbound = &self.inbound;

        let (out, actions) = match self.observers.get_mut(id) {
            None => return,
            Some(conn) => {
                let mut cx = StageContext::new(&config, &view, &mut conn.ctx, is_controller);
                let out = inbound.run(packet, &mut cx);
                (out, cx.take_actions())
            }
        };

        self.apply_stage_actions(id, actions);

        // Only the control holder's input drives the upstream session.
        if let Some(packet) = out {
            if is_controller {
                if let Some(upstream) = &self.upstream {
                    upstream.forward(packet);
                }
            }
        }
    }

    fn apply_stage_actions(&mut self, id: ObserverId, actions: Vec<StageAction>) {
        for action in actions {
            match action {
                StageAction::DispatchCommand(text) => self.dispatch_command(id, &text),
                StageAction::RawChat(text) => {
                    if let Some(observer) = self.observer_info(id) {
                        self.events.publish(ProxyEvent::RawChat { observer, text });
                    }
                }
                StageAction::ChatEvent(text) => {
                    if let Some(observer) = self.observer_info(id) {
                        self.events.publish(ProxyEvent::Chat { observer, text });
                    }
                }
                StageAction::ReleaseCamera => {
                    self.release_camera(id);
                }
                StageAction::SendToObserver(packet) => {
                    if let Some(conn) = self.observers.get(id) {
                        conn.write(packet);
                    }
                }
                StageAction::Notice(text) => self.notice(id, &text),
            }
        }
    }

    // ----- commands -----

    fn dispatch_command(&mut self, id: ObserverId, text: &str) {
        let Some(command) = commands::parse(&self.config.command_prefix, text) else {
            return;
        };
        match command {
            Command::Link => self.link_observer(id),
            Command::Unlink => self.unlink_observer(id),
            Command::View => self.view_command(id),
            Command::Unview => self.unview_command(id),
            Command::Tp => self.tp_command(id),
            Command::Broadcast(text) => {
                let name = match self.observers.get(id) {
                    Some(conn) => conn.identity.username.clone(),
                    None => return,
                };
                self.broadcast_notice(&format!("[{}] {}", name, text));
            }
            Command::ViewDistance(_) | Command::ReloadChunks => {
                self.notice(id, "World caching not enabled");
            }
            Command::Help => self.print_help(id),
        }
    }

    fn link_observer(&mut self, id: ObserverId) {
        if self.observers.get(id).is_none() {
            return;
        }
        match self.control.link(id) {
            Err(ControlError::SelfControlled) => {
                self.notice(id, "Already in control cannot link!");
            }
            Err(ControlError::AlreadyControlled { holder }) => {
                let holder_name = self
                    .observers
                    .get(holder)
                    .map(|c| c.identity.username.clone())
                    .unwrap_or_else(|| "another observer".to_string());
                self.notice(id, &format!("Cannot link. User {} is linked.", holder_name));
            }
            Ok(()) => {
                self.notice(id, "Linking");
                self.release_camera(id);
                if let Some(fake) = self.fake_player.as_mut() {
                    if let Some(conn) = self.observers.get_mut(id) {
                        fake.unregister(conn);
                    }
                }
                if let Some(conn) = self.observers.get(id) {
                    conn.write_all(spectator::normal_mode_packets());
                }
                if let Some(observer) = self.observer_info(id) {
                    self.events.publish(ProxyEvent::ControlTaken { observer });
                }
            }
        }
    }

    fn unlink_observer(&mut self, id: ObserverId) {
        if self.observers.get(id).is_none() {
            return;
        }
        if self.control.holder() != Some(id) {
            self.notice(id, "Cannot unlink as not in control!");
            return;
        }
        self.control.unlink();
        self.notice(id, "Unlinking");
        self.make_spectator(id);
        if let Some(observer) = self.observer_info(id) {
            self.events.publish(ProxyEvent::ControlReleased { observer });
        }
    }

    /// Application-driven release with no requesting observer: hands control
    /// back to the automated participant.
    fn force_unlink(&mut self) {
        if let Some(holder) = self.control.unlink() {
            self.make_spectator(holder);
            if let Some(observer) = self.observer_info(holder) {
                self.events.publish(ProxyEvent::ControlReleased { observer });
            }
        }
    }

    fn make_spectator(&mut self, id: ObserverId) {
        let pos = self.observer_space_upstream_pos();
        if let (Some(fake), Some(pos)) = (self.fake_player.as_mut(), pos) {
            if let Some(conn) = self.observers.get_mut(id) {
                fake.register(conn, pos);
            }
        }
        if let Some(conn) = self.observers.get(id) {
            conn.write_all(spectator::spectator_mode_packets());
        }
    }

    fn view_command(&mut self, id: ObserverId) {
        let is_controller = self.control.holder() == Some(id);
        let attached = match self.observers.get_mut(id) {
            None => return,
            Some(conn) => match spectator::attach_view(&mut conn.ctx, is_controller) {
                Err(_) => None,
                Ok(packets) => {
                    conn.write_all(packets);
                    Some(())
                }
            },
        };
        match attached {
            None => self.notice(id, "Cannot get into the view. You are controlling the bot"),
            Some(()) => {
                let text = format!(
                    "Connecting to view. Type {}unview to exit",
                    self.config.command_prefix
                );
                self.notice(id, &text);
            }
        }
    }

    fn unview_command(&mut self, id: ObserverId) {
        if self.control.holder() == Some(id) {
            self.notice(id, "Cannot get out off the view. You are controlling the bot");
            return;
        }
        if self.release_camera(id) {
            let text = format!(
                "Disconnecting from view. Type {}view to connect",
                self.config.command_prefix
            );
            self.notice(id, &text);
        } else {
            self.notice(id, "Not connected to the view");
        }
    }

    fn tp_command(&mut self, id: ObserverId) {
        if self.control.holder() == Some(id) {
            self.notice(id, "Cannot tp. You are controlling the bot.");
            return;
        }
        self.release_camera(id);
        let Some(pos) = self.observer_space_upstream_pos() else {
            return;
        };
        if let Some(conn) = self.observers.get(id) {
            conn.write(spectator::teleport_packet(pos));
        }
        self.notice(id, "Teleported to the bot");
    }

    fn release_camera(&mut self, id: ObserverId) -> bool {
        let Some(upstream) = &self.upstream else {
            return false;
        };
        let own_entity_id = upstream.view.entity_id;
        let pos = Offset(self.config.coordinate_offset).to_observer(upstream.view.position);
        match self.observers.get_mut(id) {
            None => false,
            Some(conn) => match spectator::release_view(&mut conn.ctx, own_entity_id, pos) {
                Some(packets) => {
                    conn.write_all(packets);
                    true
                }
                None => false,
            },
        }
    }

    fn print_help(&self, id: ObserverId) {
        for line in commands::help_lines(&self.config.command_prefix) {
            self.notice(id, &line);
        }
    }

    // ----- messaging -----

    /// One proxy chat notice to a single observer.
    fn notice(&self, id: ObserverId, text: &str) {
        if let Some(conn) = self.observers.get(id) {
            conn.write(Packet::ChatToObserver {
                message: format!("{} {}", self.config.chat_prefix, text),
                position: 1,
            });
        }
    }

    /// Administrative channel: reaches every observer directly, bypassing
    /// the transformation pipeline.
    fn broadcast_notice(&self, text: &str) {
        for conn in self.observers.iter() {
            conn.write(Packet::ChatToObserver {
                message: format!("{} {}", self.config.chat_prefix, text),
                position: 1,
            });
        }
    }

    fn observer_space_upstream_pos(&self) -> Option<Vec3> {
        self.upstream
            .as_ref()
            .map(|u| Offset(self.config.coordinate_offset).to_observer(u.view.position))
    }

    fn observer_info(&self, id: ObserverId) -> Option<ObserverInfo> {
        self.observers.get(id).map(|conn| ObserverInfo {
            id,
            username: conn.identity.username.clone(),
        })
    }
}

impl ObserverLogin {
    fn end(&self, reason: &str) {
        let _ = self.writes.send(ObserverWrite::End {
            reason: reason.to_string(),
        });
    }
}
