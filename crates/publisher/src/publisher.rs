//! Publisher facade
//!
//! `Publisher` ties the pieces together: it owns the metadata negotiator and
//! the session registry, binds the command and data channels on
//! `initialize`, and fans published batches out through the pipeline.
//!
//! # Example
//!
//! ```ignore
//! let publisher = Publisher::with_callbacks(PublisherConfig::new(7165), Arc::new(TracingCallbacks));
//! publisher.define_metadata(devices, measurements, phasors)?;
//! publisher.initialize().await?;
//! publisher.publish_measurements(&batch);
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};
use tsp_dataset::DataSet;
use tsp_protocol::Measurement;
use uuid::Uuid;

use crate::callbacks::{NoopCallbacks, PublisherCallbacks};
use crate::config::PublisherConfig;
use crate::error::{PublisherError, Result};
use crate::filter::NanPolicy;
use crate::metadata::{
    ConfigurationFrame, DeviceMetadata, MeasurementMetadata, MetadataDocument,
    MetadataNegotiator, MetadataRecords, PhasorMetadata, records_from_frames,
};
use crate::pipeline::{self, PublishOutcome};
use crate::registry::SessionRegistry;
use crate::session::SessionState;
use crate::stats::StatsSnapshot;
use crate::{rotation, server};

/// State shared by the publisher and its background tasks
pub(crate) struct Shared {
    pub config: PublisherConfig,
    pub registry: SessionRegistry,
    pub negotiator: MetadataNegotiator,
    pub callbacks: Arc<dyn PublisherCallbacks>,
    pub data_socket: ArcSwapOption<UdpSocket>,
    nan_allowed: AtomicBool,
    nan_forced: AtomicBool,
    rotation_period_ms: AtomicU64,
}

impl Shared {
    pub fn new(config: PublisherConfig, callbacks: Arc<dyn PublisherCallbacks>) -> Self {
        Self {
            registry: SessionRegistry::new(config.max_connections),
            negotiator: MetadataNegotiator::new(config.metadata_refresh_allowed),
            nan_allowed: AtomicBool::new(config.nan_value_filter_allowed),
            nan_forced: AtomicBool::new(config.nan_value_filter_forced),
            rotation_period_ms: AtomicU64::new(duration_ms(config.cipher_key_rotation_period)),
            data_socket: ArcSwapOption::empty(),
            callbacks,
            config,
        }
    }

    pub fn nan_policy(&self) -> NanPolicy {
        NanPolicy {
            allowed: self.nan_allowed.load(Ordering::Relaxed),
            forced: self.nan_forced.load(Ordering::Relaxed),
        }
    }

    pub fn rotation_period(&self) -> Duration {
        Duration::from_millis(self.rotation_period_ms.load(Ordering::Relaxed))
    }

    pub fn report_status(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(target: "tsp::callbacks", "{message}");
        self.callbacks.status_message(message);
    }

    pub fn report_error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(target: "tsp::callbacks", "{message}");
        self.callbacks.error_message(message);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Background tasks of an initialized publisher
struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
    tasks: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
    data_addr: SocketAddr,
}

/// Time-series measurement publisher
pub struct Publisher {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Publisher {
    /// Create a publisher that discards notifications
    pub fn new(config: PublisherConfig) -> Self {
        Self::with_callbacks(config, Arc::new(NoopCallbacks))
    }

    /// Create a publisher reporting to the given callbacks
    pub fn with_callbacks(config: PublisherConfig, callbacks: Arc<dyn PublisherCallbacks>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, callbacks)),
            running: Mutex::new(None),
        }
    }

    /// Bind the command and data channels and start accepting subscribers
    ///
    /// Returns the bound command channel address (useful with port 0).
    pub async fn initialize(&self) -> Result<SocketAddr> {
        if self.is_initialized() {
            return Err(PublisherError::AlreadyInitialized);
        }
        let config = &self.shared.config;

        let address = config.bind_address();
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| PublisherError::Bind { address, source })?;
        let local_addr = listener.local_addr()?;

        let data_address = config.data_bind_address();
        let data_socket = UdpSocket::bind(data_address)
            .await
            .map_err(|source| PublisherError::Bind {
                address: data_address,
                source,
            })?;
        let data_addr = data_socket.local_addr()?;

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(PublisherError::AlreadyInitialized);
        }

        self.shared.data_socket.store(Some(Arc::new(data_socket)));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let tasks = vec![
            tokio::spawn(server::accept_loop(
                listener,
                Arc::clone(&self.shared),
                tracker.clone(),
                cancel.clone(),
            )),
            tokio::spawn(rotation::run(Arc::clone(&self.shared), cancel.clone())),
        ];
        *running = Some(Running {
            cancel,
            tracker,
            tasks,
            local_addr,
            data_addr,
        });
        drop(running);

        info!(
            address = %local_addr,
            data_channel = %data_addr,
            max_connections = config.max_connections,
            "publisher listening"
        );
        self.shared
            .report_status(format!("publisher listening on {local_addr}"));
        Ok(local_addr)
    }

    /// Stop accepting, close every session and wait for background tasks
    ///
    /// Does nothing if the publisher is not initialized.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "publisher task failed");
            }
        }
        running.tracker.close();
        running.tracker.wait().await;
        self.shared.data_socket.store(None);

        info!(address = %running.local_addr, "publisher stopped");
        self.shared.report_status("publisher stopped");
    }

    // Metadata

    /// Define metadata from device, measurement and phasor records
    pub fn define_metadata(
        &self,
        devices: Vec<DeviceMetadata>,
        measurements: Vec<MeasurementMetadata>,
        phasors: Vec<PhasorMetadata>,
    ) -> Result<Arc<DataSet>> {
        let records = MetadataRecords::new(devices, measurements, phasors);
        self.define(&records)
    }

    /// Define metadata from configuration frames plus an optional quality
    /// flags measurement
    pub fn define_metadata_from_frames(
        &self,
        frames: &[ConfigurationFrame],
        quality_flags: Option<MeasurementMetadata>,
    ) -> Result<Arc<DataSet>> {
        let records = records_from_frames(frames, quality_flags);
        self.define(&records)
    }

    /// Define metadata from a parsed document
    pub fn define_metadata_from_document(&self, document: &MetadataDocument) -> Result<Arc<DataSet>> {
        let records = document.to_records()?;
        self.define(&records)
    }

    /// Define metadata from prepared records
    pub fn define_records(&self, records: &MetadataRecords) -> Result<Arc<DataSet>> {
        self.define(records)
    }

    fn define(&self, records: &MetadataRecords) -> Result<Arc<DataSet>> {
        let dataset = self.shared.negotiator.define(records)?;
        self.shared.report_status(format!(
            "metadata defined: {} devices, {} measurements, {} phasors",
            records.devices.len(),
            records.measurements.len(),
            records.phasors.len()
        ));
        Ok(dataset)
    }

    /// Current metadata container
    pub fn metadata(&self) -> Option<Arc<DataSet>> {
        self.shared.negotiator.current()
    }

    // Publication

    /// Publish a batch to every subscribed session
    ///
    /// Never waits on a subscriber. Before `initialize` this does nothing.
    pub fn publish_measurements(&self, batch: &[Measurement]) -> PublishOutcome {
        if !self.is_initialized() {
            return PublishOutcome::default();
        }
        let sessions = self.shared.registry.snapshot();
        let data_socket = self.shared.data_socket.load_full();
        pipeline::publish(
            &sessions,
            self.shared.nan_policy(),
            data_socket.as_deref(),
            batch,
        )
    }

    // Settings

    pub fn metadata_refresh_allowed(&self) -> bool {
        self.shared.negotiator.refresh_allowed()
    }

    pub fn set_metadata_refresh_allowed(&self, allowed: bool) {
        self.shared.negotiator.set_refresh_allowed(allowed);
    }

    pub fn nan_value_filter_allowed(&self) -> bool {
        self.shared.nan_allowed.load(Ordering::Relaxed)
    }

    pub fn set_nan_value_filter_allowed(&self, allowed: bool) {
        self.shared.nan_allowed.store(allowed, Ordering::Relaxed);
    }

    pub fn nan_value_filter_forced(&self) -> bool {
        self.shared.nan_forced.load(Ordering::Relaxed)
    }

    pub fn set_nan_value_filter_forced(&self, forced: bool) {
        self.shared.nan_forced.store(forced, Ordering::Relaxed);
    }

    pub fn cipher_key_rotation_period(&self) -> Duration {
        self.shared.rotation_period()
    }

    /// Change the rotation period (zero disables timed rotation)
    ///
    /// Applies to existing sessions from the next timer tick.
    pub fn set_cipher_key_rotation_period(&self, period: Duration) {
        self.shared
            .rotation_period_ms
            .store(duration_ms(period), Ordering::Relaxed);
    }

    /// Configured command channel port
    pub fn port(&self) -> u16 {
        self.shared.config.port
    }

    pub fn is_ipv6(&self) -> bool {
        self.shared.config.ipv6
    }

    /// Bound command channel address (None before `initialize`)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// Bound data channel address (None before `initialize`)
    pub fn data_channel_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.data_addr)
    }

    // Statistics

    /// Counters summed over live and disconnected sessions
    pub fn statistics(&self) -> StatsSnapshot {
        self.shared.registry.totals()
    }

    pub fn total_command_channel_bytes_sent(&self) -> u64 {
        self.statistics().command_bytes
    }

    pub fn total_data_channel_bytes_sent(&self) -> u64 {
        self.statistics().data_bytes
    }

    pub fn total_measurements_sent(&self) -> u64 {
        self.statistics().measurements
    }

    /// Whether any subscriber has completed its handshake
    pub fn is_connected(&self) -> bool {
        self.shared.registry.snapshot().iter().any(|s| {
            matches!(
                s.state(),
                SessionState::Connected | SessionState::Subscribed
            )
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Number of live sessions (including ones still handshaking)
    pub fn session_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Client ids of live sessions that completed their handshake
    pub fn client_ids(&self) -> Vec<Uuid> {
        self.shared
            .registry
            .snapshot()
            .iter()
            .filter(|s| s.negotiated().is_some())
            .map(|s| s.client_id())
            .collect()
    }

    /// Close a subscriber's session
    pub fn disconnect_session(&self, client_id: Uuid) -> Result<()> {
        let session = self
            .shared
            .registry
            .find(client_id)
            .ok_or(PublisherError::SessionNotFound(client_id))?;
        debug!(session_id = %client_id, "disconnect requested");
        session.disconnect();
        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("port", &self.shared.config.port)
            .field("initialized", &self.is_initialized())
            .field("sessions", &self.shared.registry.len())
            .finish()
    }
}
