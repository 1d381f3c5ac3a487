pub mod flow;
pub mod guidance;

pub use flow::{FlowEvent, FlowExit, FlowPhase, FlowView, VerificationFlow};
pub use guidance::{remediation, Browser, Platform};

use crate::camera::{CameraRequest, DEFAULT_JPEG_QUALITY};
use crate::geo::WatchOptions;

/// Accuracy at or below which a sample counts as a fix.
pub const DEFAULT_FIX_ACCURACY_M: f64 = 100.0;

/// Knobs shared by every flow the session manager opens.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub fix_accuracy_m: f64,
    pub watch: WatchOptions,
    pub camera: CameraRequest,
    pub jpeg_quality: u8,
    pub platform: Platform,
    pub browser: Browser,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            fix_accuracy_m: DEFAULT_FIX_ACCURACY_M,
            watch: WatchOptions::default(),
            camera: CameraRequest::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            platform: Platform::Unknown,
            browser: Browser::Other,
        }
    }
}
