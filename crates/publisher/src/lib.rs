//! TSP Publisher - Publisher-side session and protocol engine
//!
//! Serves many concurrent subscribers over a TCP command channel and an
//! optional per-session UDP data channel:
//!
//! - Negotiates metadata built from records, configuration frames or a
//!   parsed document
//! - Tracks each subscriber's filter, cipher state and counters independently
//! - Publishes measurement batches without ever waiting on a slow subscriber
//! - Rotates per-session cipher keys on a timer or on request
//!
//! # Architecture
//!
//! ```text
//! Publisher::initialize()
//!     │
//!     ├──→ accept_loop (TcpListener) ──→ SessionRegistry (arena)
//!     │         │                              │
//!     │         ▼                              │ snapshot
//!     │    per connection:                     ▼
//!     │      reader ─ commands ─► MetadataNegotiator
//!     │      writer ◄── outbound queue ◄── pipeline::publish ◄── publish_measurements()
//!     │         │                              │
//!     │         ▼                              ▼
//!     │    command channel (TCP)         data channel (UDP)
//!     │
//!     └──→ rotation timer ──→ CipherState per session
//! ```

mod callbacks;
mod config;
mod error;
mod filter;
pub mod metadata;
mod pipeline;
mod publisher;
mod registry;
mod rotation;
mod server;
mod session;
mod stats;

pub use callbacks::{NoopCallbacks, PublisherCallbacks, TracingCallbacks};
pub use config::{DEFAULT_PORT, PublisherConfig};
pub use error::{PublisherError, Result};
pub use filter::{NanPolicy, Subscription, SubscriptionFilter};
pub use metadata::{
    ChannelDefinition, ConfigurationFrame, DeviceMetadata, DocumentTable, MeasurementMetadata,
    MetadataDocument, MetadataRecords, PhasorDefinition, PhasorMetadata, PhasorType,
};
pub use pipeline::PublishOutcome;
pub use publisher::Publisher;
pub use registry::SessionHandle;
pub use session::{Negotiated, Session, SessionState};
pub use stats::{SessionStats, StatsSnapshot};

#[cfg(test)]
mod session_test;
#[cfg(test)]
mod test_support;
