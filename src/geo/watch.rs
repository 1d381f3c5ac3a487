use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::error::GeoError;
use crate::models::LocationSample;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Options handed to the location service when a watch opens.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// How long the service may wait for a reading before reporting
    /// [`GeoError::Timeout`]. The watch keeps running afterwards.
    pub timeout: Duration,
    /// Oldest cached reading the service may hand back. Zero forces fresh fixes.
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(20),
            maximum_age: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoEvent {
    Sample(LocationSample),
    Error(GeoError),
}

/// Callback side of a watch. Providers push into it until it is cancelled.
#[derive(Debug, Clone)]
pub struct GeoSink {
    tx: UnboundedSender<GeoEvent>,
    cancel_token: CancellationToken,
}

impl GeoSink {
    /// Returns false once the watch is gone, so a provider loop can exit.
    pub fn send_sample(&self, sample: LocationSample) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx.send(GeoEvent::Sample(sample)).is_ok()
    }

    pub fn send_error(&self, error: GeoError) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx.send(GeoEvent::Error(error)).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled() || self.tx.is_closed()
    }

    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }
}

/// A continuous location source (GPS, network positioning, a replay file).
pub trait LocationProvider: Send + Sync {
    /// Start delivering readings into `sink`.
    ///
    /// Returns `Err(GeoError::CapabilityAbsent)` when there is no location
    /// service at all; that is reported once and no watch starts. Other
    /// errors after a successful start go through the sink.
    fn watch(&self, options: &WatchOptions, sink: GeoSink) -> Result<(), GeoError>;
}

/// Cancels the watch it was created for. Dropping it cancels too.
#[derive(Debug)]
pub struct WatchHandle {
    cancel_token: CancellationToken,
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

pub struct GeoCapture {
    provider: Arc<dyn LocationProvider>,
    options: WatchOptions,
}

impl GeoCapture {
    pub fn new(provider: Arc<dyn LocationProvider>, options: WatchOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    pub fn start_watch(&self) -> Result<(WatchHandle, UnboundedReceiver<GeoEvent>), GeoError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let sink = GeoSink {
            tx,
            cancel_token: cancel_token.clone(),
        };

        if let Err(err) = self.provider.watch(&self.options, sink) {
            cancel_token.cancel();
            log_warn!("location watch refused to start: {err}");
            return Err(err);
        }

        log_debug!(
            "location watch started (high_accuracy={}, timeout={:?})",
            self.options.high_accuracy,
            self.options.timeout
        );
        Ok((WatchHandle { cancel_token }, rx))
    }

    pub fn stop_watch(&self, handle: WatchHandle) {
        handle.cancel_token.cancel();
        log_info!("location watch stopped");
    }
}
