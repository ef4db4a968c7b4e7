//! Geofence evaluation: great-circle distance between GPS coordinates.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two (latitude, longitude) pairs, in meters.
///
/// Numerically safe for zero-distance and antipodal inputs: the argument to
/// `sqrt` stays within [0, 1] by construction.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Non-strict inclusion: a point exactly on the boundary is inside.
pub fn within_radius(distance: f64, radius_meters: i32) -> bool {
    distance <= radius_meters as f64
}

pub fn valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nairobi CBD and a point roughly 500m to the north
    const NAIROBI: (f64, f64) = (-1.28333, 36.81667);

    #[test]
    fn zero_distance_for_identical_points() {
        let d = distance_meters(NAIROBI.0, NAIROBI.1, NAIROBI.0, NAIROBI.1);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = distance_meters(NAIROBI.0, NAIROBI.1, -1.28, 36.82);
        let d2 = distance_meters(-1.28, 36.82, NAIROBI.0, NAIROBI.1);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn known_distance_nairobi_mombasa() {
        // Nairobi to Mombasa is about 440km great-circle
        let d = distance_meters(-1.28333, 36.81667, -4.05466, 39.66359);
        assert!((430_000.0..450_000.0).contains(&d), "got {}", d);
    }

    #[test]
    fn antipodal_points_do_not_panic() {
        let d = distance_meters(0.0, 0.0, 0.0, 180.0);
        // half the Earth's circumference, ~20015km
        assert!((20_000_000.0..20_040_000.0).contains(&d), "got {}", d);
    }

    #[test]
    fn one_degree_latitude_is_about_111km() {
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((110_000.0..112_500.0).contains(&d), "got {}", d);
    }

    #[test]
    fn boundary_point_is_within_radius() {
        assert!(within_radius(20.0, 20));
        assert!(within_radius(19.99, 20));
        assert!(!within_radius(20.01, 20));
    }

    #[test]
    fn coordinate_range_validation() {
        assert!(valid_latitude(-90.0) && valid_latitude(90.0));
        assert!(!valid_latitude(90.1));
        assert!(valid_longitude(-180.0) && valid_longitude(180.0));
        assert!(!valid_longitude(-180.5));
    }
}
