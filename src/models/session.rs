//! Work session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LocationSample, PauseRecord, StillImage, VerifiedCapture};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum WorkStatus {
    #[default]
    Idle,
    Working,
    Paused,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Idle => "Idle",
            WorkStatus::Working => "Working",
            WorkStatus::Paused => "Paused",
        }
    }

    /// The transition table. Everything not listed here is rejected.
    pub fn allows(&self, action: ActionType) -> bool {
        matches!(
            (self, action),
            (WorkStatus::Idle, ActionType::Start)
                | (WorkStatus::Working, ActionType::Pause)
                | (WorkStatus::Working, ActionType::Stop)
                | (WorkStatus::Paused, ActionType::Resume)
                | (WorkStatus::Paused, ActionType::Stop)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Start,
    Pause,
    Resume,
    Stop,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Start => "Start",
            ActionType::Pause => "Pause",
            ActionType::Resume => "Resume",
            ActionType::Stop => "Stop",
        }
    }

    /// Heading shown while the verification for this action runs.
    pub fn title(&self) -> &'static str {
        match self {
            ActionType::Start => "Töö alustamine",
            ActionType::Pause => "Pausi alustamine",
            ActionType::Resume => "Töö jätkamine",
            ActionType::Stop => "Töö lõpetamine",
        }
    }

    /// Start and stop photos go through the optional analyzer; pause photos don't.
    pub fn wants_analysis(&self) -> bool {
        matches!(self, ActionType::Start | ActionType::Stop)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub start_location: LocationSample,
    pub start_photo: StillImage,
    pub start_distance_m: u32,
    pub start_analysis: Option<String>,
    pub pauses: Vec<PauseRecord>,
    pub end_time: Option<DateTime<Utc>>,
    pub end_location: Option<LocationSample>,
    pub end_photo: Option<StillImage>,
    pub end_distance_m: Option<u32>,
    pub end_analysis: Option<String>,
    /// Net worked time, set once at stop.
    pub net_worked_ms: Option<u64>,
}

impl WorkSession {
    pub fn begin(
        id: String,
        at: DateTime<Utc>,
        capture: VerifiedCapture,
        analysis: Option<String>,
    ) -> Self {
        Self {
            id,
            start_time: at,
            start_location: capture.location,
            start_photo: capture.photo,
            start_distance_m: capture.distance_m,
            start_analysis: analysis,
            pauses: Vec::new(),
            end_time: None,
            end_location: None,
            end_photo: None,
            end_distance_m: None,
            end_analysis: None,
            net_worked_ms: None,
        }
    }

    /// The open pause, which can only ever be the last one.
    pub fn open_pause(&self) -> Option<&PauseRecord> {
        self.pauses.last().filter(|pause| pause.is_open())
    }

    pub fn open_pause_mut(&mut self) -> Option<&mut PauseRecord> {
        self.pauses.last_mut().filter(|pause| pause.is_open())
    }

    pub fn closed_pause_ms(&self) -> u64 {
        self.pauses
            .iter()
            .filter_map(PauseRecord::duration_ms)
            .sum()
    }

    /// Finalize with the stop capture and return the net worked time.
    ///
    /// A pause still open is closed with the same capture. `at` is clamped to
    /// the start, and net time is `end - start - closed pauses`, never negative.
    pub fn finish(
        &mut self,
        at: DateTime<Utc>,
        capture: VerifiedCapture,
        analysis: Option<String>,
    ) -> u64 {
        let at = at.max(self.start_time);
        if let Some(pause) = self.open_pause_mut() {
            pause.close(at, capture.clone());
        }

        let total_ms = (at - self.start_time).num_milliseconds().max(0) as u64;
        let net_worked_ms = total_ms.saturating_sub(self.closed_pause_ms());

        self.end_time = Some(at);
        self.end_location = Some(capture.location);
        self.end_photo = Some(capture.photo);
        self.end_distance_m = Some(capture.distance_m);
        self.end_analysis = analysis;
        self.net_worked_ms = Some(net_worked_ms);
        net_worked_ms
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Worked time up to `now`, not counting closed pauses. An open pause is
    /// counted from its start to `now` as pause time.
    pub fn worked_ms_at(&self, now: DateTime<Utc>) -> u64 {
        let total = (now - self.start_time).num_milliseconds().max(0) as u64;
        let open = self
            .open_pause()
            .map(|pause| (now - pause.start_time).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        total.saturating_sub(self.closed_pause_ms() + open)
    }
}
