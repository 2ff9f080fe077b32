//! Nearest-sensor resolution.
//!
//! Ranks sensors by geodesic distance (WGS-84 ellipsoid, Karney's inverse
//! solution) from a target coordinate. The ranking is recomputed from the
//! sensor list of every request; nothing is cached.

use geographiclib_rs::{Geodesic, InverseGeodesic};
use thiserror::Error;

use crate::{Coordinate, Sensor};

// ---

/// Search radius around a geocoded location, in kilometres.
pub const SENSOR_RADIUS_KM: f64 = 2.0;

/// A sensor's `position` field could not be turned into a coordinate.
#[derive(Debug, Error, PartialEq)]
#[error("sensor `{sensor_id}` has malformed position `{position}`: {reason}")]
pub struct PositionError {
    pub sensor_id: String,
    pub position: String,
    pub reason: String,
}

/// A sensor paired with its distance from the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSensor {
    // ---
    pub distance_km: f64,
    pub sensor: Sensor,
}

impl RankedSensor {
    /// Sensors exactly on the boundary still count as in range.
    pub fn within_radius(&self) -> bool {
        self.distance_km <= SENSOR_RADIUS_KM
    }
}

/// Parse a pulse.eco `"lat,lng"` position string.
pub fn parse_position(sensor: &Sensor) -> Result<Coordinate, PositionError> {
    // ---
    let fail = |reason: String| PositionError {
        sensor_id: sensor.sensor_id.clone(),
        position: sensor.position.clone(),
        reason,
    };

    let parts: Vec<&str> = sensor.position.split(',').map(str::trim).collect();
    let [lat, lng] = parts.as_slice() else {
        return Err(fail(format!("expected `lat,lng`, got {} part(s)", parts.len())));
    };

    let latitude: f64 = lat
        .parse()
        .map_err(|e| fail(format!("latitude `{lat}`: {e}")))?;
    let longitude: f64 = lng
        .parse()
        .map_err(|e| fail(format!("longitude `{lng}`: {e}")))?;

    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(fail(format!("latitude {latitude} out of range")));
    }
    if !longitude.is_finite() {
        return Err(fail(format!("longitude {longitude} is not finite")));
    }

    Ok(Coordinate::new(latitude, longitude))
}

/// Geodesic distance between two coordinates in kilometres.
pub fn geodesic_km(a: Coordinate, b: Coordinate) -> f64 {
    // ---
    let metres: f64 = Geodesic::wgs84().inverse(a.latitude, a.longitude, b.latitude, b.longitude);
    metres / 1000.0
}

/// Rank `sensors` by ascending distance from `target`.
///
/// The sort is stable, so equidistant sensors keep their input order. The
/// first malformed position aborts the ranking.
pub fn rank_sensors(
    target: Coordinate,
    sensors: Vec<Sensor>,
) -> Result<Vec<RankedSensor>, PositionError> {
    // ---
    let mut ranked = sensors
        .into_iter()
        .map(|sensor| {
            let position = parse_position(&sensor)?;
            Ok(RankedSensor {
                distance_km: geodesic_km(position, target),
                sensor,
            })
        })
        .collect::<Result<Vec<_>, PositionError>>()?;

    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    tracing::debug!(
        candidates = ranked.len(),
        nearest_km = ranked.first().map(|r| r.distance_km),
        "ranked sensors"
    );
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sensor(id: &str, position: &str) -> Sensor {
        // ---
        Sensor {
            sensor_id: id.to_string(),
            description: format!("Sensor {id}"),
            position: position.to_string(),
        }
    }

    fn skopje_centre() -> Coordinate {
        Coordinate::new(41.9961, 21.4317)
    }

    #[test]
    fn test_ranking_is_sorted_permutation() {
        // ---
        let sensors = vec![
            sensor("far", "42.1000,21.4317"),
            sensor("near", "41.9970,21.4317"),
            sensor("mid", "42.0100,21.4317"),
            sensor("east", "41.9961,21.5000"),
        ];

        let ranked = rank_sensors(skopje_centre(), sensors.clone()).unwrap();

        assert_eq!(ranked.len(), sensors.len());
        assert!(ranked
            .windows(2)
            .all(|w| w[0].distance_km <= w[1].distance_km));
        for s in &sensors {
            assert_eq!(ranked.iter().filter(|r| &r.sensor == s).count(), 1);
        }
        assert_eq!(ranked[0].sensor.sensor_id, "near");
        assert_eq!(ranked[3].sensor.sensor_id, "far");
    }

    #[test]
    fn test_ties_keep_input_order() {
        // ---
        let sensors = vec![
            sensor("b", "42.0000,21.4000"),
            sensor("a", "42.0000,21.4000"),
            sensor("c", "42.0000,21.4000"),
        ];

        let ranked = rank_sensors(skopje_centre(), sensors).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.sensor.sensor_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_geodesic_distance_matches_ellipsoid() {
        // ---
        // One degree of latitude at the equator is 110.574 km on WGS-84,
        // noticeably shorter than the 111.195 km a sphere would give.
        let d = geodesic_km(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 110.574).abs() < 0.01, "got {d}");

        assert_eq!(geodesic_km(skopje_centre(), skopje_centre()), 0.0);
    }

    #[test]
    fn test_malformed_position_propagates() {
        // ---
        let sensors = vec![
            sensor("ok", "41.99,21.43"),
            sensor("bad", "41.99;21.43"),
        ];

        let err = rank_sensors(skopje_centre(), sensors).unwrap_err();
        assert_eq!(err.sensor_id, "bad");
        assert!(err.to_string().contains("41.99;21.43"));
    }

    #[test]
    fn test_parse_position_rejects_garbage() {
        // ---
        assert!(parse_position(&sensor("x", "abc,21.4")).is_err());
        assert!(parse_position(&sensor("x", "")).is_err());
        assert!(parse_position(&sensor("x", "91.0,21.4")).is_err());
        assert!(parse_position(&sensor("x", "1,2,3")).is_err());
        assert_eq!(
            parse_position(&sensor("x", " 41.5 , 21.25 ")).unwrap(),
            Coordinate::new(41.5, 21.25)
        );
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        // ---
        let at = |km: f64| RankedSensor {
            distance_km: km,
            sensor: sensor("s", "0,0"),
        };
        assert!(at(1.999).within_radius());
        assert!(at(2.0).within_radius());
        assert!(!at(2.0001).within_radius());
    }

    #[test]
    fn test_empty_sensor_list() {
        // ---
        assert!(rank_sensors(skopje_centre(), Vec::new()).unwrap().is_empty());
    }
}
