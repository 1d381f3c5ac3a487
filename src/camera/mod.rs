//! Still-photo capture on top of a live camera feed.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::CameraError;
use crate::models::StillImage;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera, pointing at the site.
    Environment,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

/// A running camera stream. Must release the device on `stop`.
pub trait LiveFeed: Send {
    fn grab_frame(&mut self) -> Result<RgbImage, CameraError>;
    fn stop(&mut self);
    fn facing(&self) -> Facing;
}

pub trait CameraProvider: Send + Sync {
    /// Open a feed, honouring `request.facing` when the device lets us pick.
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn LiveFeed>, CameraError>;
}

/// Owns at most one live feed at a time.
pub struct PhotoCapture {
    provider: Arc<dyn CameraProvider>,
    request: CameraRequest,
    jpeg_quality: u8,
    feed: Option<Box<dyn LiveFeed>>,
}

impl PhotoCapture {
    pub fn new(provider: Arc<dyn CameraProvider>, request: CameraRequest, jpeg_quality: u8) -> Self {
        Self {
            provider,
            request,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            feed: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.feed.is_some()
    }

    /// Tears down any feed still held before opening a new one.
    pub fn start(&mut self) -> Result<(), CameraError> {
        self.stop();

        let feed = self.provider.open(&self.request)?;
        if feed.facing() != self.request.facing {
            log_warn!(
                "requested {:?} camera, device gave {:?}",
                self.request.facing,
                feed.facing()
            );
        }
        log_info!(
            "camera feed started ({}x{} ideal)",
            self.request.ideal_width,
            self.request.ideal_height
        );
        self.feed = Some(feed);
        Ok(())
    }

    /// Freezes the current frame and stops the feed.
    pub fn capture(&mut self) -> Result<StillImage, CameraError> {
        let mut feed = self
            .feed
            .take()
            .ok_or_else(|| CameraError::Unknown("camera feed is not running".into()))?;

        let frame = feed.grab_frame();
        feed.stop();
        let frame = frame?;

        let still = encode_jpeg(&frame, self.jpeg_quality)?;
        log_debug!(
            "captured {}x{} still, {} bytes",
            still.width,
            still.height,
            still.byte_len()
        );
        Ok(still)
    }

    pub fn stop(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
            log_debug!("camera feed stopped");
        }
    }
}

impl Drop for PhotoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<StillImage, CameraError> {
    let (width, height) = frame.dimensions();
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(frame.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|err| CameraError::Unknown(format!("jpeg encoding failed: {err}")))?;

    Ok(StillImage {
        jpeg: buffer.into_inner(),
        width,
        height,
    })
}
