pub mod distance;
pub mod watch;

pub use distance::distance_m;
pub use watch::{GeoCapture, GeoEvent, GeoSink, LocationProvider, WatchHandle, WatchOptions};
