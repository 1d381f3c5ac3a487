use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use super::*;
use crate::analysis::{Analyzer, ANALYSIS_PLACEHOLDER};
use crate::clock::ManualClock;
use crate::error::{CameraError, FlowError, GeoError, SessionError};
use crate::history::HistoryStore;
use crate::models::{ActionType, Coordinate, WorkStatus};
use crate::settings::Settings;
use crate::sim::{SimCamera, SimLocation};
use crate::verification::{FlowEvent, FlowPhase};

/// About 12 m north of the default site.
const TWELVE_M_OUT: Coordinate = Coordinate {
    latitude: 58.358608,
    longitude: 24.5365,
};

struct Rig {
    manager: SessionManager,
    location: Arc<SimLocation>,
    camera: Arc<SimCamera>,
    clock: ManualClock,
    t0: DateTime<Utc>,
}

impl Rig {
    fn new() -> Self {
        Self::with_analyzer(Analyzer::Disabled)
    }

    fn with_analyzer(analyzer: Analyzer) -> Self {
        let t0 = DateTime::<Utc>::from_timestamp(1_767_254_400, 0).unwrap();
        let clock = ManualClock::new(t0);
        let location = SimLocation::with_clock(Arc::new(clock.clone()));
        let camera = SimCamera::new();
        let manager = SessionManager::new(
            &Settings::default(),
            Capabilities {
                location: location.clone(),
                camera: camera.clone(),
                analyzer,
            },
            Arc::new(clock.clone()),
        );
        Self {
            manager,
            location,
            camera,
            clock,
            t0,
        }
    }

    fn at(&self, offset: Duration) {
        self.clock.set(self.t0 + offset);
    }

    /// Run one action through a full verification and commit it.
    async fn verify(&mut self, action: ActionType, accuracy_m: f64) -> Transition {
        self.manager.request(action).unwrap();
        self.location.push(TWELVE_M_OUT, accuracy_m);
        self.manager
            .pending_flow_mut()
            .unwrap()
            .drain_location_events();
        if accuracy_m > 100.0 {
            self.manager.dispatch(FlowEvent::ForceAdvance).await.unwrap();
        }
        assert_eq!(self.manager.dispatch(FlowEvent::Capture).await.unwrap(), None);
        self.manager
            .dispatch(FlowEvent::Confirm)
            .await
            .unwrap()
            .expect("confirm should commit")
    }
}

fn hours(h: i64) -> Duration {
    Duration::hours(h)
}

#[tokio::test]
async fn idle_only_accepts_start() {
    let mut rig = Rig::new();
    for action in [ActionType::Pause, ActionType::Resume, ActionType::Stop] {
        let err = rig.manager.request(action).err().unwrap();
        assert_eq!(
            err,
            SessionError::NotAllowed {
                status: WorkStatus::Idle,
                action
            }
        );
    }
    assert!(!rig.manager.has_pending_flow());
    assert_eq!(rig.location.watches_opened(), 0);
    assert!(rig.manager.request(ActionType::Start).is_ok());
}

#[tokio::test]
async fn working_rejects_second_start() {
    let mut rig = Rig::new();
    rig.verify(ActionType::Start, 50.0).await;
    let session_id = rig.manager.current().unwrap().id.clone();

    assert!(matches!(
        rig.manager.request(ActionType::Start),
        Err(SessionError::NotAllowed { .. })
    ));
    assert!(matches!(
        rig.manager.request(ActionType::Resume),
        Err(SessionError::NotAllowed { .. })
    ));
    assert_eq!(rig.manager.current().unwrap().id, session_id);
}

#[tokio::test]
async fn paused_accepts_only_resume_and_stop() {
    let mut rig = Rig::new();
    rig.verify(ActionType::Start, 50.0).await;
    rig.verify(ActionType::Pause, 50.0).await;

    for action in [ActionType::Start, ActionType::Pause] {
        assert!(rig.manager.request(action).is_err());
    }
    assert!(rig.manager.request(ActionType::Resume).is_ok());
}

#[tokio::test]
async fn pending_flow_blocks_new_requests() {
    let mut rig = Rig::new();
    rig.manager.request(ActionType::Start).unwrap();
    assert_eq!(
        rig.manager.request(ActionType::Start).err(),
        Some(SessionError::FlowPending)
    );
    assert_eq!(rig.location.watches_opened(), 1);
}

#[tokio::test]
async fn dispatch_without_flow_is_an_error() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.manager.dispatch(FlowEvent::Confirm).await,
        Err(SessionError::NoPendingFlow)
    );
}

#[tokio::test]
async fn working_day_with_one_break() {
    let mut rig = Rig::new();

    rig.at(Duration::zero());
    let started = rig.verify(ActionType::Start, 50.0).await;
    assert!(matches!(started, Transition::Started { .. }));
    assert_eq!(rig.manager.status(), WorkStatus::Working);
    let session = rig.manager.current().unwrap();
    assert_eq!(session.start_distance_m, 12);
    assert_eq!(session.start_location.accuracy_m, 50.0);

    rig.at(hours(1));
    let paused = rig.verify(ActionType::Pause, 50.0).await;
    assert_eq!(paused, Transition::Paused { elapsed_ms: 3_600_000 });
    assert_eq!(rig.manager.status(), WorkStatus::Paused);
    assert!(rig.manager.current().unwrap().open_pause().is_some());

    // Elapsed stays frozen while on break.
    rig.at(hours(1) + Duration::minutes(5));
    assert_eq!(rig.manager.elapsed_ms(), 3_600_000);

    rig.at(hours(1) + Duration::minutes(10));
    let resumed = rig.verify(ActionType::Resume, 50.0).await;
    assert_eq!(resumed, Transition::Resumed { pause_ms: 600_000 });
    assert_eq!(rig.manager.status(), WorkStatus::Working);

    rig.at(hours(2) + Duration::minutes(10));
    assert_eq!(rig.manager.elapsed_ms(), 2 * 3_600_000);

    rig.at(hours(9) + Duration::minutes(10));
    let Transition::Stopped { session } = rig.verify(ActionType::Stop, 50.0).await else {
        panic!("expected stop");
    };
    assert_eq!(session.net_worked_ms, Some(9 * 3_600_000));
    assert_eq!(session.pauses.len(), 1);
    assert_eq!(session.pauses[0].duration_ms(), Some(600_000));

    assert_eq!(rig.manager.status(), WorkStatus::Idle);
    assert!(rig.manager.current().is_none());
    assert_eq!(rig.manager.elapsed_ms(), 0);
    assert_eq!(rig.manager.history().len(), 1);
    assert_eq!(rig.manager.history().latest().unwrap().id, session.id);
}

#[tokio::test]
async fn denied_resume_retried_then_cancelled_keeps_break_running() {
    let mut rig = Rig::new();
    rig.at(Duration::zero());
    rig.verify(ActionType::Start, 40.0).await;
    rig.at(hours(2));
    rig.verify(ActionType::Pause, 40.0).await;

    rig.at(hours(2) + Duration::minutes(20));
    rig.location.fail_watches_with(GeoError::PermissionDenied);
    let flow = rig.manager.request(ActionType::Resume).unwrap();
    assert_eq!(
        flow.error(),
        Some(&FlowError::Location(GeoError::PermissionDenied))
    );

    rig.location.clear_failure();
    rig.manager.dispatch(FlowEvent::Retry).await.unwrap();
    assert_eq!(
        rig.manager.pending_flow().unwrap().phase(),
        &FlowPhase::AwaitingFix
    );
    assert_eq!(rig.location.active_watches(), 1);

    rig.manager.dispatch(FlowEvent::Cancel).await.unwrap();
    assert_eq!(rig.manager.status(), WorkStatus::Paused);
    assert_eq!(rig.location.active_watches(), 0);
    assert_eq!(rig.manager.elapsed_ms(), 2 * 3_600_000);

    rig.at(hours(3));
    let Transition::Stopped { session } = rig.verify(ActionType::Stop, 40.0).await else {
        panic!("expected stop");
    };
    assert_eq!(session.net_worked_ms, Some(2 * 3_600_000));
    assert_eq!(session.pauses[0].duration_ms(), Some(3_600_000));
}

#[tokio::test]
async fn stop_while_paused_closes_pause_with_stop_capture() {
    let mut rig = Rig::new();
    rig.at(Duration::zero());
    rig.verify(ActionType::Start, 50.0).await;
    rig.at(hours(4));
    rig.verify(ActionType::Pause, 50.0).await;

    rig.at(hours(5));
    let Transition::Stopped { session } = rig.verify(ActionType::Stop, 30.0).await else {
        panic!("expected stop");
    };

    let pause = &session.pauses[0];
    assert!(!pause.is_open());
    assert_eq!(pause.end_time, session.end_time);
    assert_eq!(pause.end_location, session.end_location);
    assert_eq!(pause.end_photo, session.end_photo);
    assert_eq!(pause.end_distance_m, session.end_distance_m);
    assert_eq!(session.net_worked_ms, Some(4 * 3_600_000));
}

#[tokio::test]
async fn net_time_excludes_every_pause() {
    let patterns: [&[(i64, i64)]; 4] = [
        &[],
        &[(30, 45)],
        &[(10, 20), (60, 61), (120, 180)],
        &[(0, 0), (5, 5)],
    ];

    for pauses in patterns {
        let mut rig = Rig::new();
        rig.at(Duration::zero());
        rig.verify(ActionType::Start, 10.0).await;

        let mut paused_total = 0;
        for &(from, to) in pauses {
            rig.at(Duration::minutes(from));
            rig.verify(ActionType::Pause, 10.0).await;
            let session = rig.manager.current().unwrap();
            assert_eq!(session.pauses.iter().filter(|p| p.is_open()).count(), 1);
            assert!(session.pauses.last().unwrap().is_open());

            rig.at(Duration::minutes(to));
            rig.verify(ActionType::Resume, 10.0).await;
            paused_total += (to - from) * 60_000;
        }

        rig.at(Duration::minutes(240));
        let Transition::Stopped { session } = rig.verify(ActionType::Stop, 10.0).await else {
            panic!("expected stop");
        };
        let total = 240 * 60_000;
        assert_eq!(session.net_worked_ms, Some((total - paused_total) as u64));
        assert!(session
            .pauses
            .windows(2)
            .all(|w| w[0].end_time.unwrap() <= w[1].start_time));
    }
}

#[tokio::test]
async fn cancelled_flow_leaves_session_untouched() {
    let mut rig = Rig::new();
    rig.verify(ActionType::Start, 50.0).await;
    let before = rig.manager.current().cloned();

    rig.manager.request(ActionType::Stop).unwrap();
    rig.location.push(TWELVE_M_OUT, 20.0);
    rig.manager.pending_flow_mut().unwrap().drain_location_events();
    rig.manager.dispatch(FlowEvent::Capture).await.unwrap();

    let transition = rig.manager.dispatch(FlowEvent::Cancel).await.unwrap();
    assert_eq!(
        transition,
        Some(Transition::Cancelled {
            action: ActionType::Stop
        })
    );
    assert_eq!(rig.manager.status(), WorkStatus::Working);
    assert_eq!(rig.manager.current().cloned(), before);
    assert!(rig.manager.history().is_empty());
    assert!(!rig.manager.has_pending_flow());
    assert_eq!(rig.location.active_watches(), 0);
    assert_eq!(rig.camera.live_feeds(), 0);
}

#[tokio::test]
async fn camera_denied_then_cancel_is_a_no_op() {
    let mut rig = Rig::new();
    rig.camera.fail_with(CameraError::PermissionDenied);

    rig.manager.request(ActionType::Start).unwrap();
    rig.location.push(TWELVE_M_OUT, 40.0);
    rig.manager.pending_flow_mut().unwrap().drain_location_events();

    let flow = rig.manager.pending_flow().unwrap();
    assert_eq!(
        flow.phase(),
        &FlowPhase::Failed(FlowError::Camera(CameraError::PermissionDenied))
    );
    assert!(flow.view().guidance.is_some());

    rig.manager.dispatch(FlowEvent::Cancel).await.unwrap();
    assert_eq!(rig.manager.status(), WorkStatus::Idle);
    assert!(rig.manager.current().is_none());
    assert!(rig.manager.history().is_empty());
    assert_eq!(rig.location.active_watches(), 0);

    // Once the worker fixes permissions the next attempt goes through.
    rig.camera.clear_failure();
    rig.verify(ActionType::Start, 40.0).await;
    assert_eq!(rig.manager.status(), WorkStatus::Working);
}

#[tokio::test]
async fn missing_analyzer_uses_placeholder() {
    let mut rig = Rig::new();
    rig.verify(ActionType::Start, 50.0).await;
    rig.verify(ActionType::Pause, 50.0).await;
    rig.verify(ActionType::Resume, 50.0).await;
    let Transition::Stopped { session } = rig.verify(ActionType::Stop, 50.0).await else {
        panic!("expected stop");
    };

    assert_eq!(session.start_analysis.as_deref(), Some(ANALYSIS_PLACEHOLDER));
    assert_eq!(session.end_analysis.as_deref(), Some(ANALYSIS_PLACEHOLDER));
}

#[tokio::test]
async fn analyzer_commentary_is_recorded() {
    let mut rig = Rig::with_analyzer(Analyzer::Fixed("Tellingud ja betoonisegisti.".into()));
    rig.verify(ActionType::Start, 50.0).await;
    assert_eq!(
        rig.manager.current().unwrap().start_analysis.as_deref(),
        Some("Tellingud ja betoonisegisti.")
    );
}

#[tokio::test]
async fn low_accuracy_override_still_commits_location() {
    let mut rig = Rig::new();
    rig.verify(ActionType::Start, 640.0).await;
    let session = rig.manager.current().unwrap();
    assert_eq!(session.start_location.accuracy_m, 640.0);
}

#[tokio::test]
async fn history_is_most_recent_first() {
    let mut rig = Rig::new();
    for day in 0..3 {
        rig.at(hours(24 * day));
        rig.verify(ActionType::Start, 20.0).await;
        rig.at(hours(24 * day + 8));
        rig.verify(ActionType::Stop, 20.0).await;
    }

    let starts: Vec<_> = rig.manager.history().iter().map(|s| s.start_time).collect();
    assert_eq!(starts.len(), 3);
    assert!(starts.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(rig.manager.history().total_worked_ms(), 3 * 8 * 3_600_000);
}

#[tokio::test]
async fn seeded_history_stays_behind_new_sessions() {
    let mut seed_rig = Rig::new();
    seed_rig.verify(ActionType::Start, 20.0).await;
    seed_rig.at(hours(6));
    let Transition::Stopped { session: old } = seed_rig.verify(ActionType::Stop, 20.0).await else {
        panic!("expected stop");
    };

    let mut rig = Rig::new();
    rig.manager = rig
        .manager
        .with_history(HistoryStore::seeded(vec![*old.clone()]));
    rig.at(hours(24));
    rig.verify(ActionType::Start, 20.0).await;
    rig.at(hours(30));
    rig.verify(ActionType::Stop, 20.0).await;

    let ids: Vec<_> = rig.manager.history().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[1], old.id);
    assert_eq!(rig.manager.snapshot().history_len, 2);
}

#[tokio::test]
async fn snapshot_reports_pending_action() {
    let mut rig = Rig::new();
    rig.manager.request(ActionType::Start).unwrap();
    let snapshot = rig.manager.snapshot();
    assert_eq!(snapshot.status, WorkStatus::Idle);
    assert_eq!(snapshot.pending_action, Some(ActionType::Start));
    assert_eq!(snapshot.elapsed_ms, 0);
}

#[tokio::test]
async fn controller_runs_flow_from_sensor_callbacks() {
    let rig = Rig::new();
    let location = rig.location.clone();
    let controller = SessionController::spawn(rig.manager, StdDuration::from_millis(10));

    let view = controller.request(ActionType::Start).await.unwrap();
    assert_eq!(view.phase, "awaitingFix");

    location.push(TWELVE_M_OUT, 25.0);
    let reached_camera = tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            let view = controller.flow_view().await.unwrap().unwrap();
            if view.phase == "capturing" {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(reached_camera.is_ok());

    controller.dispatch(FlowEvent::Capture).await.unwrap();
    let started = controller.dispatch(FlowEvent::Confirm).await.unwrap();
    assert!(matches!(started, Some(Transition::Started { .. })));

    let mut updates = controller.subscribe();
    tokio::time::timeout(StdDuration::from_secs(2), updates.wait_for(|s| s.status == WorkStatus::Working))
        .await
        .expect("snapshot published")
        .unwrap();
    assert!(controller.current().await.unwrap().is_some());
    assert_eq!(
        controller.request(ActionType::Start).await.err(),
        Some(SessionError::NotAllowed {
            status: WorkStatus::Working,
            action: ActionType::Start
        })
    );

    controller.shutdown().await;
    assert_eq!(
        controller.history().await.err(),
        Some(SessionError::ControllerClosed)
    );
}
