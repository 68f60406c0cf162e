//! Great-circle distance.

use dispatch_types::GeoPoint;

pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Haversine distance between two points, in miles.
pub fn haversine_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_for_same_point() {
        let p = GeoPoint::new(32.7767, -96.7970);
        assert!(haversine_miles(p, p).abs() < 1e-9);
    }

    #[test]
    fn dallas_to_fort_worth() {
        let dallas = GeoPoint::new(32.7767, -96.7970);
        let fort_worth = GeoPoint::new(32.7555, -97.3308);
        let d = haversine_miles(dallas, fort_worth);
        assert!((d - 31.0).abs() < 1.0, "got {d}");
        assert!((haversine_miles(fort_worth, dallas) - d).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_miles(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 69.1).abs() < 0.1, "got {d}");
    }
}
