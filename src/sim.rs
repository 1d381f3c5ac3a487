//! Simulated capability providers.
//!
//! `SimLocation` and `SimCamera` are driven by hand (tests, scripted demos).
//! `ReplayLocation` plays a timed list of readings on the tokio runtime the
//! way a real GPS watch would call back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::camera::{CameraProvider, CameraRequest, Facing, LiveFeed};
use crate::clock::{Clock, SystemClock};
use crate::error::{CameraError, GeoError};
use crate::geo::{GeoSink, LocationProvider, WatchOptions};
use crate::models::{Coordinate, LocationSample};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────────────────

pub struct SimLocation {
    clock: Arc<dyn Clock>,
    start_error: Mutex<Option<GeoError>>,
    sinks: Mutex<Vec<GeoSink>>,
    opened: AtomicUsize,
}

impl SimLocation {
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            start_error: Mutex::new(None),
            sinks: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
        })
    }

    /// Device without any location service.
    pub fn absent() -> Arc<Self> {
        let sim = Self::new();
        sim.fail_watches_with(GeoError::CapabilityAbsent);
        sim
    }

    /// Make every following `watch` call fail with `error` until
    /// [`clear_failure`](Self::clear_failure).
    pub fn fail_watches_with(&self, error: GeoError) {
        *lock(&self.start_error) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.start_error) = None;
    }

    /// Deliver a reading to every live watch. Returns how many received it.
    pub fn push(&self, coordinate: Coordinate, accuracy_m: f64) -> usize {
        let sample = LocationSample {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            accuracy_m,
            captured_at: self.clock.now(),
        };
        self.live_sinks()
            .iter()
            .filter(|sink| sink.send_sample(sample.clone()))
            .count()
    }

    pub fn push_error(&self, error: GeoError) -> usize {
        self.live_sinks()
            .iter()
            .filter(|sink| sink.send_error(error.clone()))
            .count()
    }

    pub fn active_watches(&self) -> usize {
        self.live_sinks().len()
    }

    pub fn watches_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn live_sinks(&self) -> Vec<GeoSink> {
        let mut sinks = lock(&self.sinks);
        sinks.retain(|sink| !sink.is_cancelled());
        sinks.clone()
    }
}

impl LocationProvider for SimLocation {
    fn watch(&self, _options: &WatchOptions, sink: GeoSink) -> Result<(), GeoError> {
        if let Some(err) = lock(&self.start_error).clone() {
            return Err(err);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        lock(&self.sinks).push(sink);
        Ok(())
    }
}

/// One timed reading for [`ReplayLocation`].
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub after: Duration,
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
}

/// Replays a list of readings on every watch, like a device whose accuracy
/// improves as satellites come in.
pub struct ReplayLocation {
    clock: Arc<dyn Clock>,
    steps: Vec<ReplayStep>,
}

impl ReplayLocation {
    pub fn new(clock: Arc<dyn Clock>, steps: Vec<ReplayStep>) -> Arc<Self> {
        Arc::new(Self { clock, steps })
    }

    /// Readings narrowing in from `start_accuracy_m` to `end_accuracy_m`.
    pub fn converging(
        clock: Arc<dyn Clock>,
        at: Coordinate,
        start_accuracy_m: f64,
        end_accuracy_m: f64,
        steps: usize,
        interval: Duration,
    ) -> Arc<Self> {
        let steps = steps.max(1);
        let plan = (0..steps)
            .map(|i| {
                let t = if steps == 1 {
                    1.0
                } else {
                    i as f64 / (steps - 1) as f64
                };
                ReplayStep {
                    after: interval,
                    coordinate: at,
                    accuracy_m: start_accuracy_m + (end_accuracy_m - start_accuracy_m) * t,
                }
            })
            .collect();
        Self::new(clock, plan)
    }
}

impl LocationProvider for ReplayLocation {
    fn watch(&self, _options: &WatchOptions, sink: GeoSink) -> Result<(), GeoError> {
        let steps = self.steps.clone();
        let clock = self.clock.clone();

        tokio::spawn(async move {
            for step in steps {
                tokio::select! {
                    _ = tokio::time::sleep(step.after) => {}
                    _ = sink.cancelled() => break,
                }
                let sample = LocationSample {
                    latitude: step.coordinate.latitude,
                    longitude: step.coordinate.longitude,
                    accuracy_m: step.accuracy_m,
                    captured_at: clock.now(),
                };
                if !sink.send_sample(sample) {
                    break;
                }
            }
            log_debug!("replay watch finished");
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Camera
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CameraCounters {
    opened: AtomicUsize,
    live: AtomicUsize,
}

pub struct SimCamera {
    failure: Mutex<Option<CameraError>>,
    frame_failure: Mutex<Option<CameraError>>,
    counters: Arc<CameraCounters>,
    frame_size: (u32, u32),
}

impl SimCamera {
    pub fn new() -> Arc<Self> {
        Self::with_frame_size(64, 36)
    }

    pub fn with_frame_size(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            failure: Mutex::new(None),
            frame_failure: Mutex::new(None),
            counters: Arc::new(CameraCounters::default()),
            frame_size: (width.max(1), height.max(1)),
        })
    }

    /// Make `open` fail with `error` until cleared.
    pub fn fail_with(&self, error: CameraError) {
        *lock(&self.failure) = Some(error);
    }

    /// Make frame grabs fail, as when the device is yanked mid-stream.
    pub fn fail_frames_with(&self, error: CameraError) {
        *lock(&self.frame_failure) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
        *lock(&self.frame_failure) = None;
    }

    pub fn feeds_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn live_feeds(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }
}

impl CameraProvider for SimCamera {
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn LiveFeed>, CameraError> {
        if let Some(err) = lock(&self.failure).clone() {
            return Err(err);
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);

        let (width, height) = self.frame_size;
        Ok(Box::new(SimFeed {
            counters: self.counters.clone(),
            frame_failure: lock(&self.frame_failure).clone(),
            facing: request.facing,
            width,
            height,
            frame: 0,
            stopped: false,
        }))
    }
}

struct SimFeed {
    counters: Arc<CameraCounters>,
    frame_failure: Option<CameraError>,
    facing: Facing,
    width: u32,
    height: u32,
    frame: u8,
    stopped: bool,
}

impl LiveFeed for SimFeed {
    fn grab_frame(&mut self) -> Result<RgbImage, CameraError> {
        if let Some(err) = self.frame_failure.clone() {
            return Err(err);
        }
        self.frame = self.frame.wrapping_add(1);
        let shade = self.frame;
        let (w, h) = (self.width, self.height);
        Ok(RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                (x * 255 / w) as u8,
                (y * 255 / h) as u8,
                shade.wrapping_mul(37),
            ])
        }))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn facing(&self) -> Facing {
        self.facing
    }
}

impl Drop for SimFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
