//! Error taxonomy for the capture gate and the session state machine.
//!
//! Sensor and camera errors stay inside a verification flow. Only
//! [`SessionError`] ever reaches a caller of the session manager, and it only
//! describes rejected requests, never a failed capture.

use thiserror::Error;

use crate::models::{ActionType, WorkStatus};

// ─────────────────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("location fix timed out")]
    Timeout,

    #[error("no location service on this device")]
    CapabilityAbsent,
}

impl GeoError {
    /// Fatal errors end the current flow. The rest are retried by the watch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GeoError::PermissionDenied | GeoError::CapabilityAbsent)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Camera
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found")]
    DeviceNotFound,

    #[error("camera is in use by another application")]
    DeviceBusy,

    #[error("camera failure: {0}")]
    Unknown(String),
}

// ─────────────────────────────────────────────────────────────────────
// Verification flow
// ─────────────────────────────────────────────────────────────────────

/// Which sensor a remediation hint is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceKind {
    Location,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error(transparent)]
    Location(#[from] GeoError),

    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl FlowError {
    /// A missing location service cannot be fixed by the user, everything
    /// else can after granting permission or freeing the camera.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FlowError::Location(GeoError::CapabilityAbsent))
    }

    pub fn kind(&self) -> GuidanceKind {
        match self {
            FlowError::Location(_) => GuidanceKind::Location,
            FlowError::Camera(_) => GuidanceKind::Camera,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{action:?} is not allowed while {status:?}")]
    NotAllowed {
        status: WorkStatus,
        action: ActionType,
    },

    #[error("a verification is already in progress")]
    FlowPending,

    #[error("no verification in progress")]
    NoPendingFlow,

    #[error("session state is inconsistent: {0}")]
    Inconsistent(String),

    #[error("session controller has shut down")]
    ControllerClosed,
}

// ─────────────────────────────────────────────────────────────────────
// Photo analysis
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis API key is not configured")]
    MissingApiKey,

    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis service returned no text")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_and_absence_are_fatal() {
        assert!(GeoError::PermissionDenied.is_fatal());
        assert!(GeoError::CapabilityAbsent.is_fatal());
        assert!(!GeoError::PositionUnavailable.is_fatal());
        assert!(!GeoError::Timeout.is_fatal());
    }

    #[test]
    fn capability_absence_is_not_retryable() {
        assert!(!FlowError::from(GeoError::CapabilityAbsent).is_retryable());
        assert!(FlowError::from(GeoError::PermissionDenied).is_retryable());
        assert!(FlowError::from(CameraError::DeviceBusy).is_retryable());
    }

    #[test]
    fn flow_error_kind_follows_source() {
        assert_eq!(
            FlowError::from(CameraError::PermissionDenied).kind(),
            GuidanceKind::Camera
        );
        assert_eq!(
            FlowError::from(GeoError::PermissionDenied).kind(),
            GuidanceKind::Location
        );
    }
}
