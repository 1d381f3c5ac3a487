use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::camera::{CameraProvider, PhotoCapture};
use crate::clock::Clock;
use crate::error::{FlowError, GeoError};
use crate::geo::{distance_m, GeoCapture, GeoEvent, LocationProvider, WatchHandle};
use crate::models::{ActionType, LocationSample, StillImage, TargetSite, VerifiedCapture};

use super::guidance::{remediation, Browser, Platform};
use super::FlowConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FlowPhase {
    AwaitingFix,
    Capturing,
    Confirming,
    Failed(FlowError),
}

impl FlowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowPhase::AwaitingFix => "awaitingFix",
            FlowPhase::Capturing => "capturing",
            FlowPhase::Confirming => "confirming",
            FlowPhase::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    Location(GeoEvent),
    /// Proceed to the camera with whatever fix we have.
    ForceAdvance,
    Capture,
    Retake,
    Confirm,
    Retry,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowExit {
    Verified(VerifiedCapture),
    Cancelled,
}

/// What a screen needs to render the flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowView {
    pub action: ActionType,
    pub title: &'static str,
    pub site_name: String,
    pub phase: &'static str,
    pub accuracy_m: Option<f64>,
    pub distance_m: Option<u32>,
    pub accuracy_ok: bool,
    pub can_force_advance: bool,
    pub has_photo: bool,
    pub error: Option<String>,
    pub guidance: Option<&'static str>,
    pub can_retry: bool,
}

/// One run of the location + photo gate for a single requested action.
pub struct VerificationFlow {
    action: ActionType,
    target: TargetSite,
    fix_accuracy_m: f64,
    platform: Platform,
    browser: Browser,
    clock: Arc<dyn Clock>,
    geo: GeoCapture,
    photo: PhotoCapture,
    phase: FlowPhase,
    watch: Option<WatchHandle>,
    events: Option<UnboundedReceiver<GeoEvent>>,
    latest_location: Option<LocationSample>,
    distance_m: Option<u32>,
    still: Option<StillImage>,
    last_transient: Option<GeoError>,
    finished: bool,
}

impl VerificationFlow {
    pub fn open(
        action: ActionType,
        target: TargetSite,
        location: Arc<dyn LocationProvider>,
        camera: Arc<dyn CameraProvider>,
        config: &FlowConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut flow = Self {
            action,
            target,
            fix_accuracy_m: config.fix_accuracy_m,
            platform: config.platform,
            browser: config.browser,
            clock,
            geo: GeoCapture::new(location, config.watch.clone()),
            photo: PhotoCapture::new(camera, config.camera.clone(), config.jpeg_quality),
            phase: FlowPhase::AwaitingFix,
            watch: None,
            events: None,
            latest_location: None,
            distance_m: None,
            still: None,
            last_transient: None,
            finished: false,
        };
        log_info!("{} verification opened for {}", action.as_str(), flow.target.display_name);
        flow.enter_awaiting_fix();
        flow
    }

    pub fn action(&self) -> ActionType {
        self.action
    }

    pub fn phase(&self) -> &FlowPhase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn latest_location(&self) -> Option<&LocationSample> {
        self.latest_location.as_ref()
    }

    pub fn distance_m(&self) -> Option<u32> {
        self.distance_m
    }

    pub fn photo(&self) -> Option<&StillImage> {
        self.still.as_ref()
    }

    /// Last non-fatal location problem, shown as a hint while waiting.
    pub fn last_transient(&self) -> Option<&GeoError> {
        self.last_transient.as_ref()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().is_some_and(WatchHandle::is_active)
    }

    pub fn is_camera_live(&self) -> bool {
        self.photo.is_live()
    }

    pub fn error(&self) -> Option<&FlowError> {
        match &self.phase {
            FlowPhase::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn guidance(&self) -> Option<&'static str> {
        self.error()
            .map(|err| remediation(self.platform, self.browser, err.kind()))
    }

    pub fn view(&self) -> FlowView {
        let accuracy_m = self.latest_location.as_ref().map(|s| s.accuracy_m);
        let accuracy_ok = accuracy_m.is_some_and(|a| a <= self.fix_accuracy_m);
        FlowView {
            action: self.action,
            title: self.action.title(),
            site_name: self.target.display_name.clone(),
            phase: self.phase.as_str(),
            accuracy_m,
            distance_m: self.distance_m,
            accuracy_ok,
            can_force_advance: self.phase == FlowPhase::AwaitingFix
                && accuracy_m.is_some()
                && !accuracy_ok,
            has_photo: self.still.is_some(),
            error: self.error().map(ToString::to_string),
            guidance: self.guidance(),
            can_retry: self.error().is_some_and(FlowError::is_retryable),
        }
    }

    /// Apply one event. Returns the exit once the flow is done; every event
    /// after that is ignored.
    pub fn handle(&mut self, event: FlowEvent) -> Option<FlowExit> {
        if self.finished {
            log_debug!("ignoring {:?} on finished flow", event);
            return None;
        }

        match event {
            FlowEvent::Location(geo_event) => {
                self.on_location(geo_event);
                None
            }
            FlowEvent::ForceAdvance => {
                if self.phase == FlowPhase::AwaitingFix {
                    if self.latest_location.is_some() {
                        log_info!("advancing to camera with low-accuracy fix");
                        self.enter_capturing();
                    } else {
                        log_debug!("force advance ignored, no location sample yet");
                    }
                }
                None
            }
            FlowEvent::Capture => {
                if self.phase == FlowPhase::Capturing {
                    match self.photo.capture() {
                        Ok(still) => {
                            self.still = Some(still);
                            self.phase = FlowPhase::Confirming;
                        }
                        Err(err) => self.fail(err.into()),
                    }
                }
                None
            }
            FlowEvent::Retake => {
                if self.phase == FlowPhase::Confirming {
                    self.still = None;
                    self.enter_capturing();
                }
                None
            }
            FlowEvent::Confirm => {
                if self.phase == FlowPhase::Confirming {
                    self.confirm()
                } else {
                    None
                }
            }
            FlowEvent::Retry => {
                if let FlowPhase::Failed(err) = &self.phase {
                    if err.is_retryable() {
                        log_info!("retrying {} verification", self.action.as_str());
                        self.enter_awaiting_fix();
                    }
                }
                None
            }
            FlowEvent::Cancel => {
                self.release();
                self.finished = true;
                log_info!("{} verification cancelled", self.action.as_str());
                Some(FlowExit::Cancelled)
            }
        }
    }

    /// Wait for the next location callback. Pends forever once the watch is
    /// released, so it is safe to race against user input in `select!`.
    pub async fn next_location_event(&mut self) -> GeoEvent {
        loop {
            let Some(rx) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            match rx.recv().await {
                Some(event) => return event,
                None => {
                    log_debug!("location provider hung up");
                    self.events = None;
                }
            }
        }
    }

    /// Apply every location event already queued. Returns how many there were.
    pub fn drain_location_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(rx) = self.events.as_mut() else {
                break;
            };
            match rx.try_recv() {
                Ok(event) => {
                    self.on_location(event);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.events = None;
                    break;
                }
            }
        }
        applied
    }

    fn on_location(&mut self, event: GeoEvent) {
        if matches!(self.phase, FlowPhase::Failed(_)) {
            return;
        }

        match event {
            GeoEvent::Sample(sample) => {
                let distance = distance_m(sample.coordinate(), self.target.coordinate());
                log_debug!(
                    "location sample accuracy={:.0}m distance={}m",
                    sample.accuracy_m,
                    distance
                );
                let is_fix = sample.meets_accuracy(self.fix_accuracy_m);
                self.latest_location = Some(sample);
                self.distance_m = Some(distance);
                self.last_transient = None;

                if is_fix && self.phase == FlowPhase::AwaitingFix {
                    self.enter_capturing();
                }
            }
            GeoEvent::Error(err) if err.is_fatal() => self.fail(err.into()),
            GeoEvent::Error(err) => {
                log_debug!("transient location error, still watching: {err}");
                self.last_transient = Some(err);
            }
        }
    }

    fn enter_awaiting_fix(&mut self) {
        self.release();
        self.latest_location = None;
        self.distance_m = None;
        self.still = None;
        self.last_transient = None;
        self.phase = FlowPhase::AwaitingFix;

        match self.geo.start_watch() {
            Ok((handle, events)) => {
                self.watch = Some(handle);
                self.events = Some(events);
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn enter_capturing(&mut self) {
        self.phase = FlowPhase::Capturing;
        if self.still.is_none() {
            if let Err(err) = self.photo.start() {
                self.fail(err.into());
            }
        }
    }

    fn confirm(&mut self) -> Option<FlowExit> {
        let (Some(photo), Some(location), Some(distance_m)) = (
            self.still.clone(),
            self.latest_location.clone(),
            self.distance_m,
        ) else {
            log_warn!("confirm without photo or location, ignoring");
            return None;
        };

        self.release();
        self.finished = true;
        log_info!(
            "{} verified at {}m from {} (accuracy {:.0}m)",
            self.action.as_str(),
            distance_m,
            self.target.display_name,
            location.accuracy_m
        );
        Some(FlowExit::Verified(VerifiedCapture {
            photo,
            location,
            distance_m,
            confirmed_at: self.clock.now(),
        }))
    }

    fn fail(&mut self, err: FlowError) {
        self.release();
        log_warn!("{} verification failed: {err}", self.action.as_str());
        self.phase = FlowPhase::Failed(err);
    }

    fn release(&mut self) {
        if let Some(handle) = self.watch.take() {
            self.geo.stop_watch(handle);
        }
        self.events = None;
        self.photo.stop();
    }
}

impl Drop for VerificationFlow {
    fn drop(&mut self) {
        self.release();
    }
}
