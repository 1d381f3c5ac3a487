mod location;
mod pause;
mod photo;
mod session;

pub use location::{Coordinate, LocationSample, TargetSite};
pub use pause::PauseRecord;
pub use photo::{StillImage, VerifiedCapture};
pub use session::{ActionType, WorkSession, WorkStatus};
