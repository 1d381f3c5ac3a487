use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::Analyzer;
use crate::camera::CameraProvider;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::geo::{GeoEvent, LocationProvider};
use crate::history::HistoryStore;
use crate::models::{ActionType, PauseRecord, TargetSite, VerifiedCapture, WorkSession, WorkStatus};
use crate::settings::Settings;
use crate::verification::{FlowConfig, FlowEvent, FlowExit, FlowView, VerificationFlow};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// The device capabilities a manager opens flows against.
#[derive(Clone)]
pub struct Capabilities {
    pub location: Arc<dyn LocationProvider>,
    pub camera: Arc<dyn CameraProvider>,
    pub analyzer: Analyzer,
}

/// What a committed (or abandoned) flow did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started { session_id: String },
    Paused { elapsed_ms: u64 },
    Resumed { pause_ms: u64 },
    Stopped { session: Box<WorkSession> },
    /// The flow was cancelled; the session is exactly as before.
    Cancelled { action: ActionType },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: WorkStatus,
    pub elapsed_ms: u64,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub pause_count: usize,
    pub pending_action: Option<ActionType>,
    pub history_len: usize,
}

pub struct SessionManager {
    status: WorkStatus,
    current: Option<WorkSession>,
    history: HistoryStore,
    pending: Option<VerificationFlow>,
    /// Worked time captured when the current pause began.
    frozen_elapsed_ms: u64,
    target: TargetSite,
    flow_config: FlowConfig,
    capabilities: Capabilities,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(settings: &Settings, capabilities: Capabilities, clock: Arc<dyn Clock>) -> Self {
        Self {
            status: WorkStatus::Idle,
            current: None,
            history: HistoryStore::new(),
            pending: None,
            frozen_elapsed_ms: 0,
            target: settings.site.clone(),
            flow_config: settings.flow_config(),
            capabilities,
            clock,
        }
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    pub fn status(&self) -> WorkStatus {
        self.status
    }

    pub fn current(&self) -> Option<&WorkSession> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn target(&self) -> &TargetSite {
        &self.target
    }

    pub fn pending_flow(&self) -> Option<&VerificationFlow> {
        self.pending.as_ref()
    }

    pub fn pending_flow_mut(&mut self) -> Option<&mut VerificationFlow> {
        self.pending.as_mut()
    }

    pub fn has_pending_flow(&self) -> bool {
        self.pending.is_some()
    }

    pub fn flow_view(&self) -> Option<FlowView> {
        self.pending.as_ref().map(VerificationFlow::view)
    }

    /// Open a verification for `action`. Rejected requests change nothing.
    pub fn request(&mut self, action: ActionType) -> Result<&mut VerificationFlow, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::FlowPending);
        }
        if !self.status.allows(action) {
            log_warn!("rejected {} while {}", action.as_str(), self.status.as_str());
            return Err(SessionError::NotAllowed {
                status: self.status,
                action,
            });
        }

        let flow = VerificationFlow::open(
            action,
            self.target.clone(),
            self.capabilities.location.clone(),
            self.capabilities.camera.clone(),
            &self.flow_config,
            self.clock.clone(),
        );
        Ok(self.pending.insert(flow))
    }

    /// Feed an event to the open flow and commit if it verifies.
    pub async fn dispatch(&mut self, event: FlowEvent) -> Result<Option<Transition>, SessionError> {
        let flow = self.pending.as_mut().ok_or(SessionError::NoPendingFlow)?;
        let action = flow.action();

        match flow.handle(event) {
            None => Ok(None),
            Some(FlowExit::Cancelled) => {
                self.pending = None;
                Ok(Some(Transition::Cancelled { action }))
            }
            Some(FlowExit::Verified(capture)) => {
                self.pending = None;
                let analysis = if action.wants_analysis() {
                    Some(self.capabilities.analyzer.describe(&capture.photo).await)
                } else {
                    None
                };
                self.commit(action, capture, analysis).map(Some)
            }
        }
    }

    /// Wait for the open flow's next location callback. Never resolves while
    /// no flow is open.
    pub async fn next_location_event(&mut self) -> GeoEvent {
        match self.pending.as_mut() {
            Some(flow) => flow.next_location_event().await,
            None => std::future::pending().await,
        }
    }

    /// Net worked time for display. Frozen while paused, zero while idle.
    pub fn elapsed_ms(&self) -> u64 {
        match (self.status, self.current.as_ref()) {
            (WorkStatus::Working, Some(session)) => session.worked_ms_at(self.clock.now()),
            (WorkStatus::Paused, Some(_)) => self.frozen_elapsed_ms,
            _ => 0,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            elapsed_ms: self.elapsed_ms(),
            session_id: self.current.as_ref().map(|s| s.id.clone()),
            started_at: self.current.as_ref().map(|s| s.start_time),
            pause_count: self.current.as_ref().map_or(0, |s| s.pauses.len()),
            pending_action: self.pending.as_ref().map(VerificationFlow::action),
            history_len: self.history.len(),
        }
    }

    fn commit(
        &mut self,
        action: ActionType,
        capture: VerifiedCapture,
        analysis: Option<String>,
    ) -> Result<Transition, SessionError> {
        let at = capture.confirmed_at;

        match action {
            ActionType::Start => {
                if self.current.is_some() {
                    return Err(SessionError::Inconsistent(
                        "start with a session already running".into(),
                    ));
                }
                let session = WorkSession::begin(Uuid::new_v4().to_string(), at, capture, analysis);
                let session_id = session.id.clone();
                log_info!(
                    "session {session_id} started {}m from site",
                    session.start_distance_m
                );
                self.current = Some(session);
                self.frozen_elapsed_ms = 0;
                self.status = WorkStatus::Working;
                Ok(Transition::Started { session_id })
            }
            ActionType::Pause => {
                let session = self.current_mut()?;
                if session.open_pause().is_some() {
                    return Err(SessionError::Inconsistent("pause already open".into()));
                }
                let at = at.max(session.start_time);
                let elapsed_ms = session.worked_ms_at(at);
                session.pauses.push(PauseRecord::open(at, capture));
                log_info!("session {} paused after {elapsed_ms}ms", session.id);
                self.frozen_elapsed_ms = elapsed_ms;
                self.status = WorkStatus::Paused;
                Ok(Transition::Paused { elapsed_ms })
            }
            ActionType::Resume => {
                let session = self.current_mut()?;
                let pause = session
                    .open_pause_mut()
                    .ok_or_else(|| SessionError::Inconsistent("resume without open pause".into()))?;
                pause.close(at, capture);
                let pause_ms = pause.duration_ms().unwrap_or(0);
                log_info!("session {} resumed after {pause_ms}ms pause", session.id);
                self.status = WorkStatus::Working;
                Ok(Transition::Resumed { pause_ms })
            }
            ActionType::Stop => {
                let mut session = self
                    .current
                    .take()
                    .ok_or_else(|| SessionError::Inconsistent("stop without session".into()))?;
                let net_worked_ms = session.finish(at, capture, analysis);

                log_info!(
                    "session {} stopped, net {}ms over {} pauses",
                    session.id,
                    net_worked_ms,
                    session.pauses.len()
                );
                self.history.push_front(session.clone());
                self.frozen_elapsed_ms = 0;
                self.status = WorkStatus::Idle;
                Ok(Transition::Stopped {
                    session: Box::new(session),
                })
            }
        }
    }

    fn current_mut(&mut self) -> Result<&mut WorkSession, SessionError> {
        self.current
            .as_mut()
            .ok_or_else(|| SessionError::Inconsistent("no current session".into()))
    }
}
