use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LocationSample, StillImage, VerifiedCapture};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PauseRecord {
    pub start_time: DateTime<Utc>,
    pub start_location: LocationSample,
    pub start_photo: StillImage,
    pub start_distance_m: u32,
    pub end_time: Option<DateTime<Utc>>,
    pub end_location: Option<LocationSample>,
    pub end_photo: Option<StillImage>,
    pub end_distance_m: Option<u32>,
}

impl PauseRecord {
    pub fn open(at: DateTime<Utc>, capture: VerifiedCapture) -> Self {
        Self {
            start_time: at,
            start_location: capture.location,
            start_photo: capture.photo,
            start_distance_m: capture.distance_m,
            end_time: None,
            end_location: None,
            end_photo: None,
            end_distance_m: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Clamps `at` to the start so a closed pause never runs backwards.
    pub fn close(&mut self, at: DateTime<Utc>, capture: VerifiedCapture) {
        self.end_time = Some(at.max(self.start_time));
        self.end_location = Some(capture.location);
        self.end_photo = Some(capture.photo);
        self.end_distance_m = Some(capture.distance_m);
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as u64)
    }
}
