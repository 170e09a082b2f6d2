//! Distance and travel-time matrices.
//!
//! Distances are haversine kilometres rounded to 0.01 km; a leg touching a
//! location with no coordinate costs a configured flat distance. Times are
//! derived from distance at a configured average speed.

use crate::domain::Location;
use crate::error::ServiceError;

/// Symmetric `n x n` distance (km) and travel time (minutes) matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    distances_km: Vec<Vec<f64>>,
    times_minutes: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Builds both matrices for `locations`.
    ///
    /// Fails with `InvalidInput` for fewer than two locations or a
    /// non-finite coordinate.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::domain::Location;
    /// use dairy_logistics::matrix::DistanceMatrix;
    ///
    /// let locations = vec![
    ///     Location::resolve(0, "ludhiana").unwrap(),
    ///     Location::resolve(1, "jalandhar").unwrap(),
    ///     Location::resolve(2, "depot-b").unwrap(),
    /// ];
    /// let m = DistanceMatrix::build(&locations, 40.0, 50.0).unwrap();
    ///
    /// assert_eq!(m.len(), 3);
    /// assert_eq!(m.distance(0, 1), m.distance(1, 0));
    /// assert_eq!(m.distance(0, 2), 50.0); // unresolved endpoint
    /// assert_eq!(m.time(0, 2), 75.0);     // 50 km at 40 km/h
    /// ```
    pub fn build(
        locations: &[Location],
        average_speed_kmph: f64,
        unknown_distance_km: f64,
    ) -> Result<Self, ServiceError> {
        let n = locations.len();
        if n < 2 {
            return Err(ServiceError::invalid(
                "locations",
                format!("at least 2 locations are required (depot + 1 stop), got {}", n),
            ));
        }
        if let Some(bad) = locations
            .iter()
            .find(|l| l.coord.map_or(false, |c| !c.is_valid()))
        {
            return Err(ServiceError::invalid(
                format!("locations[{}]", bad.index),
                format!("{:?} has a non-finite or out-of-range coordinate", bad.id),
            ));
        }
        if !(average_speed_kmph.is_finite() && average_speed_kmph > 0.0) {
            return Err(ServiceError::invalid(
                "average_speed_kmph",
                format!("must be positive, got {}", average_speed_kmph),
            ));
        }

        let mut distances_km = vec![vec![0.0; n]; n];
        let mut times_minutes = vec![vec![0.0; n]; n];

        // Fill the upper triangle and mirror it
        for i in 0..n {
            for j in (i + 1)..n {
                let km = locations[i]
                    .distance_km(&locations[j])
                    .map(round_centi)
                    .unwrap_or(unknown_distance_km);
                let minutes = km / average_speed_kmph * 60.0;

                distances_km[i][j] = km;
                distances_km[j][i] = km;
                times_minutes[i][j] = minutes;
                times_minutes[j][i] = minutes;
            }
        }

        Ok(Self {
            distances_km,
            times_minutes,
        })
    }

    /// Builds a matrix from precomputed distances, e.g. from a road router.
    ///
    /// The input must be square. It is symmetrised by taking the mean of
    /// `d[i][j]` and `d[j][i]`; diagonal entries are ignored and read as 0.
    pub fn from_distances(
        distances_km: Vec<Vec<f64>>,
        average_speed_kmph: f64,
    ) -> Result<Self, ServiceError> {
        let n = distances_km.len();
        if n < 2 {
            return Err(ServiceError::invalid(
                "distances",
                format!("at least 2 rows are required, got {}", n),
            ));
        }
        for (i, row) in distances_km.iter().enumerate() {
            if row.len() != n {
                return Err(ServiceError::invalid(
                    format!("distances[{}]", i),
                    format!("row has {} entries, expected {}", row.len(), n),
                ));
            }
            if let Some(d) = row.iter().find(|d| !(d.is_finite() && **d >= 0.0)) {
                return Err(ServiceError::invalid(
                    format!("distances[{}]", i),
                    format!("entry {} is not a non-negative number", d),
                ));
            }
        }
        if !(average_speed_kmph.is_finite() && average_speed_kmph > 0.0) {
            return Err(ServiceError::invalid(
                "average_speed_kmph",
                format!("must be positive, got {}", average_speed_kmph),
            ));
        }

        let mut symmetric = vec![vec![0.0; n]; n];
        let mut times_minutes = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let km = (distances_km[i][j] + distances_km[j][i]) / 2.0;
                symmetric[i][j] = km;
                symmetric[j][i] = km;
                times_minutes[i][j] = km / average_speed_kmph * 60.0;
                times_minutes[j][i] = times_minutes[i][j];
            }
        }

        Ok(Self {
            distances_km: symmetric,
            times_minutes,
        })
    }

    /// Number of locations.
    #[inline]
    pub fn len(&self) -> usize {
        self.distances_km.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.distances_km.is_empty()
    }

    /// Distance in km between two location indices.
    #[inline]
    pub fn distance(&self, from: usize, to: usize) -> f64 {
        self.distances_km[from][to]
    }

    /// Travel time in minutes between two location indices.
    #[inline]
    pub fn time(&self, from: usize, to: usize) -> f64 {
        self.times_minutes[from][to]
    }

    pub fn distances(&self) -> &[Vec<f64>] {
        &self.distances_km
    }
}

fn round_centi(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::KNOWN_CITIES;
    use crate::domain::Coord;

    fn gazetteer() -> Vec<Location> {
        KNOWN_CITIES
            .iter()
            .enumerate()
            .map(|(i, c)| Location::new(i, c.key).with_coord(Coord::new(c.lat, c.lng)))
            .collect()
    }

    #[test]
    fn test_symmetric_with_zero_diagonal() {
        let m = DistanceMatrix::build(&gazetteer(), 40.0, 50.0).unwrap();
        for i in 0..m.len() {
            assert_eq!(m.distance(i, i), 0.0);
            for j in 0..m.len() {
                assert_eq!(m.distance(i, j), m.distance(j, i));
                assert_eq!(m.time(i, j), m.time(j, i));
                assert!(m.distance(i, j) >= 0.0);
            }
        }
    }

    #[test]
    fn test_distances_rounded_to_centi_km() {
        let m = DistanceMatrix::build(&gazetteer(), 40.0, 50.0).unwrap();
        let d = m.distance(0, 2);
        assert_eq!(d, (d * 100.0).round() / 100.0);
        // Ludhiana to Amritsar is about 125 km
        assert!(d > 115.0 && d < 135.0);
    }

    #[test]
    fn test_identical_input_identical_matrix() {
        let a = DistanceMatrix::build(&gazetteer(), 40.0, 50.0).unwrap();
        let b = DistanceMatrix::build(&gazetteer(), 40.0, 50.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_single_location() {
        let err = DistanceMatrix::build(&gazetteer()[..1], 40.0, 50.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "locations"));
    }

    #[test]
    fn test_rejects_non_finite_coordinate() {
        let mut locations = gazetteer();
        locations[3].coord = Some(Coord::new(f64::NAN, 75.0));
        let err = DistanceMatrix::build(&locations, 40.0, 50.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "locations[3]"));
    }

    #[test]
    fn test_time_follows_speed() {
        let locations = vec![Location::new(0, "a"), Location::new(1, "b")];
        let m = DistanceMatrix::build(&locations, 60.0, 30.0).unwrap();
        assert_eq!(m.distance(0, 1), 30.0);
        assert_eq!(m.time(0, 1), 30.0);
    }

    #[test]
    fn test_from_distances_symmetrises() {
        let m = DistanceMatrix::from_distances(
            vec![vec![0.0, 10.0], vec![12.0, 0.0]],
            60.0,
        )
        .unwrap();
        assert_eq!(m.distance(0, 1), 11.0);
        assert_eq!(m.distance(1, 0), 11.0);
        assert_eq!(m.time(1, 0), 11.0);
    }

    #[test]
    fn test_from_distances_ignores_diagonal() {
        let m = DistanceMatrix::from_distances(
            vec![vec![7.0, 4.0], vec![4.0, 3.0]],
            60.0,
        )
        .unwrap();
        assert_eq!(m.distance(0, 0), 0.0);
        assert_eq!(m.distance(1, 1), 0.0);
        assert_eq!(m.time(1, 1), 0.0);
        assert_eq!(m.distance(0, 1), 4.0);
    }

    #[test]
    fn test_from_distances_rejects_ragged() {
        let err = DistanceMatrix::from_distances(vec![vec![0.0, 1.0], vec![0.0]], 40.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }
}
