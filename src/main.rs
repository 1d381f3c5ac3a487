//! Scripted demo day: start, a lunch break, stop, then the history as JSON.
//! Yesterday's shift is preloaded so the history never starts empty.
//!
//! Settings come from the file named by `WORKSITE_CLOCK_SETTINGS` when set.
//! Location and camera are simulated; the analyzer is real when an API key is
//! configured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::info;

use worksite_clock::clock::{Clock, ManualClock};
use worksite_clock::camera::{CameraRequest, PhotoCapture};
use worksite_clock::geo::distance_m;
use worksite_clock::models::{Coordinate, LocationSample, VerifiedCapture, WorkSession};
use worksite_clock::sim::{ReplayLocation, SimCamera};
use worksite_clock::verification::FlowView;
use worksite_clock::{
    init_logging, ActionType, Analyzer, Capabilities, FlowEvent, HistoryStore,
    SessionController, SessionManager, Settings, SettingsStore, Transition,
};

const SETTINGS_ENV: &str = "WORKSITE_CLOCK_SETTINGS";

fn load_settings() -> Result<Settings> {
    match std::env::var_os(SETTINGS_ENV) {
        Some(path) => {
            let store = SettingsStore::new(PathBuf::from(path))
                .context("failed to open settings store")?;
            Ok(store.settings())
        }
        None => {
            let mut settings = Settings::default();
            settings.apply_env_defaults();
            Ok(settings)
        }
    }
}

fn sim_capture(
    camera: &Arc<SimCamera>,
    settings: &Settings,
    at: DateTime<Utc>,
    position: Coordinate,
) -> Result<VerifiedCapture> {
    let mut photo = PhotoCapture::new(
        camera.clone(),
        CameraRequest::default(),
        settings.capture.jpeg_quality,
    );
    photo.start()?;
    Ok(VerifiedCapture {
        photo: photo.capture()?,
        location: LocationSample {
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy_m: 15.0,
            captured_at: at,
        },
        distance_m: distance_m(position, settings.site.coordinate()),
        confirmed_at: at,
    })
}

/// A finished eight hour shift from the day before.
fn yesterday(
    camera: &Arc<SimCamera>,
    settings: &Settings,
    today: DateTime<Utc>,
    position: Coordinate,
) -> Result<WorkSession> {
    let start = today - ChronoDuration::hours(24);
    let end = start + ChronoDuration::hours(8);
    let mut session = WorkSession::begin(
        uuid::Uuid::new_v4().to_string(),
        start,
        sim_capture(camera, settings, start, position)?,
        None,
    );
    session.finish(end, sim_capture(camera, settings, end, position)?, None);
    Ok(session)
}

async fn poll_until_camera(controller: &SessionController) -> Result<FlowView> {
    loop {
        let Some(view) = controller.flow_view().await? else {
            bail!("verification closed before reaching the camera");
        };
        match view.phase {
            "capturing" => return Ok(view),
            "failed" => bail!("verification failed: {}", view.error.unwrap_or_default()),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}

async fn wait_for_camera(controller: &SessionController) -> Result<FlowView> {
    tokio::time::timeout(Duration::from_secs(10), poll_until_camera(controller))
        .await
        .context("timed out waiting for a location fix")?
}

async fn verify(controller: &SessionController, action: ActionType) -> Result<Transition> {
    let view = controller.request(action).await?;
    info!("{} at {}", view.title, view.site_name);

    let view = wait_for_camera(controller).await?;
    info!(
        "fix accepted: {}m from site, accuracy {:.0}m",
        view.distance_m.unwrap_or_default(),
        view.accuracy_m.unwrap_or_default()
    );

    controller.dispatch(FlowEvent::Capture).await?;
    controller
        .dispatch(FlowEvent::Confirm)
        .await?
        .context("confirmation did not commit")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let settings = load_settings()?;
    let clock = ManualClock::new(Utc::now());

    // A phone standing a little north of the site, settling from a coarse
    // network fix to GPS.
    let site = settings.site.coordinate();
    let worker = Coordinate::new(site.latitude + 0.0002, site.longitude);
    let location = ReplayLocation::converging(
        Arc::new(clock.clone()),
        worker,
        900.0,
        12.0,
        5,
        Duration::from_millis(120),
    );

    let camera = SimCamera::new();
    let seed = yesterday(&camera, &settings, clock.now(), worker)
        .context("failed to build seed history")?;

    let manager = SessionManager::new(
        &settings,
        Capabilities {
            location,
            camera,
            analyzer: Analyzer::from_settings(&settings.analysis),
        },
        Arc::new(clock.clone()),
    )
    .with_history(HistoryStore::seeded(vec![seed]));
    let controller = SessionController::spawn(manager, settings.tick_interval());

    let day = [
        (ActionType::Start, ChronoDuration::zero()),
        (ActionType::Pause, ChronoDuration::hours(4)),
        (ActionType::Resume, ChronoDuration::minutes(30)),
        (ActionType::Stop, ChronoDuration::hours(4)),
    ];

    for (action, after) in day {
        clock.advance(after);
        let transition = verify(&controller, action).await?;
        info!("{:?} -> {:?}", action, controller.snapshot().status);
        if let Transition::Stopped { session } = &transition {
            info!(
                "session {} closed with {} worked",
                session.id,
                format_ms(session.net_worked_ms.unwrap_or_default())
            );
        }
    }

    let history = controller.history().await?;
    println!("{}", serde_json::to_string_pretty(&history)?);

    controller.shutdown().await;
    Ok(())
}

fn format_ms(ms: u64) -> String {
    let minutes = ms / 60_000;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
