//! Proxy configuration: an all-optional options struct resolved in one step
//! into the immutable [`Config`] every component reads.

use log::warn;
use shared::Vec3;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type AllowPredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Who may attach as an observer. A predicate that panics counts as a denial.
#[derive(Clone, Default)]
pub enum AllowPolicy {
    #[default]
    Open,
    List(Vec<String>),
    Predicate(AllowPredicate),
}

impl AllowPolicy {
    pub fn permits(&self, username: &str, uuid: &str) -> bool {
        match self {
            AllowPolicy::Open => true,
            AllowPolicy::List(names) => {
                names.iter().any(|name| name.eq_ignore_ascii_case(username))
            }
            AllowPolicy::Predicate(check) => {
                let uuid = uuid.to_lowercase();
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    check(username, &uuid)
                }));
                match outcome {
                    Ok(allowed) => allowed,
                    Err(_) => {
                        warn!("allow-policy predicate failed for {}, denying", username);
                        false
                    }
                }
            }
        }
    }
}

impl fmt::Debug for AllowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowPolicy::Open => write!(f, "Open"),
            AllowPolicy::List(names) => f.debug_tuple("List").field(names).finish(),
            AllowPolicy::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Options accepted from the embedding application. Every field is optional;
/// [`ProxyOptions::resolve`] fills in the defaults exactly once.
#[derive(Clone, Debug, Default)]
pub struct ProxyOptions {
    pub allow_policy: Option<AllowPolicy>,
    pub auto_start_upstream: Option<bool>,
    pub auto_start_listener: Option<bool>,
    pub auto_start_upstream_on_first_login: Option<bool>,
    pub stop_listener_on_upstream_end: Option<bool>,
    pub stop_upstream_on_last_observer_leave: Option<bool>,
    pub disconnect_observers_on_upstream_end: Option<bool>,
    pub link_on_connect: Option<bool>,
    pub spawn_fake_entity: Option<bool>,
    pub print_help_on_login: Option<bool>,
    pub log_join_leave: Option<bool>,
    pub region_center: Option<Vec3>,
    pub region_half_extent: Option<f64>,
    pub coordinate_offset: Option<Vec3>,
    pub motd: Option<String>,
    pub kick_message: Option<String>,
    pub restrict_message: Option<String>,
    pub command_prefix: Option<String>,
    pub chat_prefix: Option<String>,
    pub handshake_timeout: Option<Duration>,
    pub banned_materials: Option<Vec<i32>>,
    pub control_gated_packets: Option<Vec<String>>,
    pub max_chat_len: Option<usize>,
}

impl ProxyOptions {
    pub fn resolve(self) -> Config {
        Config {
            allow_policy: self.allow_policy.unwrap_or_default(),
            auto_start_upstream: self.auto_start_upstream.unwrap_or(true),
            auto_start_listener: self.auto_start_listener.unwrap_or(true),
            auto_start_upstream_on_first_login: self
                .auto_start_upstream_on_first_login
                .unwrap_or(true),
            stop_listener_on_upstream_end: self.stop_listener_on_upstream_end.unwrap_or(false),
            stop_upstream_on_last_observer_leave: self
                .stop_upstream_on_last_observer_leave
                .unwrap_or(true),
            disconnect_observers_on_upstream_end: self
                .disconnect_observers_on_upstream_end
                .unwrap_or(true),
            link_on_connect: self.link_on_connect.unwrap_or(true),
            spawn_fake_entity: self.spawn_fake_entity.unwrap_or(true),
            print_help_on_login: self.print_help_on_login.unwrap_or(true),
            log_join_leave: self.log_join_leave.unwrap_or(false),
            region_center: self.region_center.unwrap_or_else(Vec3::zero),
            region_half_extent: self.region_half_extent.unwrap_or(1000.0),
            coordinate_offset: self.coordinate_offset.unwrap_or_else(Vec3::zero),
            motd: self.motd,
            kick_message: self
                .kick_message
                .unwrap_or_else(|| "You are not in the whitelist".to_string()),
            restrict_message: self
                .restrict_message
                .unwrap_or_else(|| "You cannot leave the base area!".to_string()),
            command_prefix: self.command_prefix.unwrap_or_else(|| "$".to_string()),
            chat_prefix: self.chat_prefix.unwrap_or_else(|| "Proxy >>".to_string()),
            handshake_timeout: self.handshake_timeout.unwrap_or(Duration::from_secs(30)),
            banned_materials: self.banned_materials.unwrap_or_else(|| vec![46]),
            control_gated_packets: self.control_gated_packets.unwrap_or_else(|| {
                vec!["abilities".to_string(), "player_position".to_string()]
            }),
            max_chat_len: self.max_chat_len.unwrap_or(250),
        }
    }
}

/// Fully-populated configuration. Immutable for the process lifetime; built
/// once before any component is constructed.
#[derive(Clone, Debug)]
pub struct Config {
    pub allow_policy: AllowPolicy,
    pub auto_start_upstream: bool,
    pub auto_start_listener: bool,
    pub auto_start_upstream_on_first_login: bool,
    pub stop_listener_on_upstream_end: bool,
    pub stop_upstream_on_last_observer_leave: bool,
    pub disconnect_observers_on_upstream_end: bool,
    pub link_on_connect: bool,
    pub spawn_fake_entity: bool,
    pub print_help_on_login: bool,
    pub log_join_leave: bool,
    pub region_center: Vec3,
    pub region_half_extent: f64,
    pub coordinate_offset: Vec3,
    /// Fixed MOTD override. When unset the listener MOTD follows the
    /// upstream lifecycle.
    pub motd: Option<String>,
    pub kick_message: String,
    pub restrict_message: String,
    pub command_prefix: String,
    pub chat_prefix: String,
    pub handshake_timeout: Duration,
    pub banned_materials: Vec<i32>,
    pub control_gated_packets: Vec<String>,
    pub max_chat_len: usize,
}
