//! Location and photo verified work-time tracking.
//!
//! A [`SessionManager`] holds the Idle/Working/Paused state of one worker's
//! day. Every state change goes through a [`VerificationFlow`] that waits for
//! a location fix near the site, takes a photo, and asks for confirmation
//! before anything is committed.

pub mod analysis;
pub mod camera;
pub mod clock;
pub mod error;
pub mod geo;
pub mod history;
pub mod models;
pub mod session;
pub mod settings;
pub mod sim;
pub mod utils;
pub mod verification;

pub use analysis::Analyzer;
pub use error::{CameraError, FlowError, GeoError, SessionError};
pub use history::HistoryStore;
pub use models::{ActionType, WorkSession, WorkStatus};
pub use session::{Capabilities, SessionController, SessionManager, SessionSnapshot, Transition};
pub use settings::{Settings, SettingsStore};
pub use utils::init_logging;
pub use verification::{FlowEvent, FlowPhase, VerificationFlow};
