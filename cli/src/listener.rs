//! Callback surface between the bridge and its host environment.
//!
//! The bridge pushes inbound data and failures to a [`BridgeListener`]
//! rather than returning them through the operation that caused them.
//! Two implementations ship with the crate:
//!
//! - [`ChannelListener`] - forwards [`BridgeEvent`]s over an mpsc channel
//!   (used by the stdio host and by tests)
//! - [`LogListener`] - writes events to the `log` facade

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiver of bridge notifications.
///
/// Callbacks are invoked from bridge tasks and must not block.
pub trait BridgeListener: Send + Sync {
    /// Inbound bytes (hex encoded) arrived on the connection named `name`.
    fn on_received_interest(&self, data_hex: &str, name: &str);

    /// A bridge operation failed.
    fn on_error(&self, message: &str);

    /// The bridge is available for calls. Fired once per service.
    fn on_ready(&self) {}
}

/// A listener notification as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// See [`BridgeListener::on_received_interest`].
    ReceivedInterest {
        /// Hex-encoded inbound bytes.
        data: String,
        /// Connection name.
        name: String,
    },
    /// See [`BridgeListener::on_error`].
    Error {
        /// Human-readable diagnostic.
        message: String,
    },
    /// See [`BridgeListener::on_ready`].
    Ready,
}

/// Listener that turns callbacks into [`BridgeEvent`]s on a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: UnboundedSender<BridgeEvent>,
}

impl ChannelListener {
    /// Creates a listener and the receiver its events arrive on.
    pub fn new() -> (Self, UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("[Listener] Event receiver dropped, discarding event");
        }
    }
}

impl BridgeListener for ChannelListener {
    fn on_received_interest(&self, data_hex: &str, name: &str) {
        self.emit(BridgeEvent::ReceivedInterest {
            data: data_hex.to_string(),
            name: name.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        self.emit(BridgeEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_ready(&self) {
        self.emit(BridgeEvent::Ready);
    }
}

/// Listener that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl BridgeListener for LogListener {
    fn on_received_interest(&self, data_hex: &str, name: &str) {
        log::info!("[Listener] {} received {} bytes", name, data_hex.len() / 2);
        log::debug!("[Listener] {} data: {}", name, data_hex);
    }

    fn on_error(&self, message: &str) {
        log::error!("[Listener] {message}");
    }

    fn on_ready(&self) {
        log::info!("[Listener] Bridge ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_events_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_ready();
        listener.on_received_interest("0102", "alice");
        listener.on_error("boom");

        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::Ready);
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::ReceivedInterest {
                data: "0102".to_string(),
                name: "alice".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::Error {
                message: "boom".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_listener_survives_dropped_receiver() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_error("nobody is listening");
    }

    #[test]
    fn test_event_json_shape() {
        let event = BridgeEvent::ReceivedInterest {
            data: "ff".to_string(),
            name: "alice".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "received_interest", "data": "ff", "name": "alice"})
        );
        assert_eq!(
            serde_json::to_value(BridgeEvent::Ready).unwrap(),
            serde_json::json!({"event": "ready"})
        );
    }
}
