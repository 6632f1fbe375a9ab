//! Notifications to the embedding application
//!
//! The publisher reports status, errors and client arrivals/departures through
//! a `PublisherCallbacks` implementation supplied at construction. Callbacks
//! are invoked synchronously from publisher tasks, so implementations should
//! return quickly.

use tracing::{error, info};
use uuid::Uuid;

/// Capability interface for publisher notifications
///
/// Every method has an empty default, so implementors override only what
/// they care about.
pub trait PublisherCallbacks: Send + Sync {
    /// Informational status message
    fn status_message(&self, _message: &str) {}

    /// Error message (never fatal to the publisher)
    fn error_message(&self, _message: &str) {}

    /// A subscriber completed its handshake
    fn client_connected(&self, _client_id: Uuid, _connection_info: &str, _subscriber_info: &str) {}

    /// A subscriber session ended
    fn client_disconnected(&self, _client_id: Uuid, _connection_info: &str) {}
}

/// Callbacks that ignore every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl PublisherCallbacks for NoopCallbacks {}

/// Callbacks that forward notifications to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallbacks;

impl PublisherCallbacks for TracingCallbacks {
    fn status_message(&self, message: &str) {
        info!(target: "tsp::status", "{message}");
    }

    fn error_message(&self, message: &str) {
        error!(target: "tsp::status", "{message}");
    }

    fn client_connected(&self, client_id: Uuid, connection_info: &str, subscriber_info: &str) {
        info!(
            target: "tsp::status",
            %client_id,
            connection = connection_info,
            subscriber = subscriber_info,
            "client connected"
        );
    }

    fn client_disconnected(&self, client_id: Uuid, connection_info: &str) {
        info!(
            target: "tsp::status",
            %client_id,
            connection = connection_info,
            "client disconnected"
        );
    }
}
