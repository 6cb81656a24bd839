//! Typed event surface. Every cross-component notification goes through
//! [`EventBus`] instead of string-keyed event names, so embedders subscribe
//! to one closed enum.

use crate::session::ObserverId;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverInfo {
    pub id: ObserverId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProxyEvent {
    UpstreamStarted,
    UpstreamReady,
    UpstreamEnded { reason: String },
    UpstreamError { message: String },
    ListenerStarted { addr: String },
    ListenerEnded,
    ListenerError { message: String },
    Connected { observer: ObserverInfo },
    Disconnected { observer: ObserverInfo },
    /// Chat excluding proxy commands.
    Chat { observer: ObserverInfo, text: String },
    /// All chat, proxy commands included.
    RawChat { observer: ObserverInfo, text: String },
    ControlTaken { observer: ObserverInfo },
    ControlReleased { observer: ObserverInfo },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProxyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }

    /// Publishing without subscribers is fine; events are advisory.
    pub fn publish(&self, event: ProxyEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(ProxyEvent::UpstreamStarted);
        bus.publish(ProxyEvent::UpstreamReady);

        assert_eq!(rx.recv().await.unwrap(), ProxyEvent::UpstreamStarted);
        assert_eq!(rx.recv().await.unwrap(), ProxyEvent::UpstreamReady);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(ProxyEvent::ListenerEnded);
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_every_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let observer = ObserverInfo {
            id: 1,
            username: "alice".to_string(),
        };
        bus.publish(ProxyEvent::Connected {
            observer: observer.clone(),
        });

        assert_eq!(
            a.recv().await.unwrap(),
            ProxyEvent::Connected {
                observer: observer.clone()
            }
        );
        assert_eq!(b.recv().await.unwrap(), ProxyEvent::Connected { observer });
    }
}
