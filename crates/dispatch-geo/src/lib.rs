//! Geo-distance selector: ranks eligible contractors by proximity to a job.

mod distance;
mod selector;

pub use distance::{haversine_miles, EARTH_RADIUS_MILES};
pub use selector::{find_nearest_available_contractors, DEFAULT_MAX_DISTANCE_MILES};
