use crate::models::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in whole metres (haversine).
pub fn distance_m(a: Coordinate, b: Coordinate) -> u32 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding error can push h a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_M * c).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: Coordinate = Coordinate {
        latitude: 58.3585,
        longitude: 24.5365,
    };

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_m(SITE, SITE), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (SITE, Coordinate::new(58.35851, 24.53652)),
            (Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 179.9)),
            (Coordinate::new(-33.86, 151.21), Coordinate::new(51.5, -0.12)),
            (Coordinate::new(90.0, 0.0), Coordinate::new(-90.0, 0.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance_m(a, b), distance_m(b, a));
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        // 2πR / 360
        let d = distance_m(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert_eq!(d, 111_195);
    }

    #[test]
    fn nearby_sample_from_site() {
        // Logged start sample from the Pärnu site is a couple of metres off.
        let d = distance_m(SITE, Coordinate::new(58.358510, 24.536520));
        assert!((1..=3).contains(&d), "got {d}");
    }

    #[test]
    fn antipodes_are_half_circumference() {
        let d = distance_m(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert_eq!(d, (std::f64::consts::PI * EARTH_RADIUS_M).round() as u32);
    }
}
