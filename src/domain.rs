//! Domain model for dairy delivery routing and demand forecasting.
//!
//! # Overview
//!
//! - [`Location`]s with an optional geographic [`Coord`] (haversine distance)
//! - [`Vehicle`]s of a uniform-capacity fleet
//! - [`Route`]s produced by the optimizer, with derived cost figures
//! - [`OptimizationResult`] with routes, unserved stops and [`Totals`]
//! - [`DemandSample`] history and the [`ForecastResult`] built from it
//!
//! Everything here is created per request and dropped with the response.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::demo_data::find_city;
use crate::error::ServiceError;

/// Earth radius in kilometres for haversine calculation.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coord {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coord {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in kilometres using the haversine formula.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::domain::Coord;
    ///
    /// let ludhiana = Coord::new(30.9010, 75.8573);
    /// let jalandhar = Coord::new(31.3260, 75.5762);
    ///
    /// // Roughly 54 km as the crow flies
    /// let d = ludhiana.distance_km(&jalandhar);
    /// assert!(d > 50.0 && d < 58.0);
    /// assert_eq!(ludhiana.distance_km(&ludhiana), 0.0);
    /// ```
    pub fn distance_km(&self, other: &Coord) -> f64 {
        if self.latitude == other.latitude && self.longitude == other.longitude {
            return 0.0;
        }

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// A named delivery point. Index 0 of a request is always the depot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Position in the request's location list.
    pub index: usize,
    /// Identifier as supplied by the caller.
    pub id: String,
    /// Display name, when the identifier resolved to a known place.
    pub name: Option<String>,
    /// Coordinate, if the identifier could be resolved to one.
    pub coord: Option<Coord>,
}

impl Location {
    /// Creates a location with no coordinate.
    pub fn new(index: usize, id: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            name: None,
            coord: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_coord(mut self, coord: Coord) -> Self {
        self.coord = Some(coord);
        self
    }

    /// Resolves a caller-supplied identifier.
    ///
    /// Tries, in order: a `"lat,lon"` literal, a city from the built-in
    /// gazetteer (case-insensitive), and finally an unresolved location.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::domain::Location;
    ///
    /// let city = Location::resolve(1, "Amritsar").unwrap();
    /// assert_eq!(city.name.as_deref(), Some("Amritsar"));
    /// assert!(city.coord.is_some());
    ///
    /// let literal = Location::resolve(2, "30.70, 76.71").unwrap();
    /// assert_eq!(literal.coord.unwrap().latitude, 30.70);
    ///
    /// let depot = Location::resolve(0, "depot").unwrap();
    /// assert!(depot.coord.is_none());
    ///
    /// assert!(Location::resolve(3, "NaN,75.0").is_err());
    /// ```
    pub fn resolve(index: usize, raw: &str) -> Result<Self, ServiceError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ServiceError::invalid(
                format!("locations[{}]", index),
                "location identifier is empty",
            ));
        }

        if let Some(coord) = parse_coord_literal(id) {
            if !coord.is_valid() {
                return Err(ServiceError::invalid(
                    format!("locations[{}]", index),
                    format!("coordinate {:?} is not a finite latitude/longitude", id),
                ));
            }
            return Ok(Location::new(index, id).with_coord(coord));
        }

        Ok(match find_city(id) {
            Some(city) => Location::new(index, id)
                .with_name(city.name)
                .with_coord(Coord::new(city.lat, city.lng)),
            None => Location::new(index, id),
        })
    }

    /// Distance to another location, `None` if either side is unresolved.
    pub fn distance_km(&self, other: &Location) -> Option<f64> {
        match (self.coord, other.coord) {
            (Some(a), Some(b)) => Some(a.distance_km(&b)),
            _ => None,
        }
    }
}

/// Parses `"lat,lon"`. Anything that is not two numbers is treated as a name.
fn parse_coord_literal(raw: &str) -> Option<Coord> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    Some(Coord::new(lat, lon))
}

/// A location together with the quantity to deliver there.
#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    pub location: Location,
    /// Litres to deliver. Always 0 for the depot.
    pub demand: f64,
}

impl Stop {
    pub fn new(location: Location, demand: f64) -> Self {
        Self { location, demand }
    }

    #[inline]
    pub fn is_depot(&self) -> bool {
        self.location.index == 0
    }
}

/// A delivery vehicle. Lives only for one optimize call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vehicle {
    /// 1-based vehicle number.
    pub id: usize,
    /// Maximum load in litres.
    pub capacity: f64,
}

impl Vehicle {
    pub fn new(id: usize, capacity: f64) -> Self {
        Self { id, capacity }
    }
}

/// One vehicle's tour: depot, `stops` in order, depot.
///
/// The cost fields are filled in by [`crate::cost::CostModel::evaluate`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Route {
    pub vehicle_id: usize,
    /// Location indices visited, depot excluded.
    pub stops: Vec<usize>,
    pub distance_km: f64,
    pub load: f64,
    pub co2_emissions_kg: f64,
    pub estimated_time_minutes: f64,
}

impl Route {
    /// Creates a route with no derived figures yet.
    pub fn new(vehicle_id: usize, stops: Vec<usize>) -> Self {
        Self {
            vehicle_id,
            stops,
            distance_km: 0.0,
            load: 0.0,
            co2_emissions_kg: 0.0,
            estimated_time_minutes: 0.0,
        }
    }

    /// Returns the full tour including the depot at both ends.
    ///
    /// ```
    /// use dairy_logistics::domain::Route;
    ///
    /// let route = Route::new(1, vec![3, 1]);
    /// assert_eq!(route.tour(), vec![0, 3, 1, 0]);
    /// ```
    pub fn tour(&self) -> Vec<usize> {
        let mut tour = Vec::with_capacity(self.stops.len() + 2);
        tour.push(0);
        tour.extend_from_slice(&self.stops);
        tour.push(0);
        tour
    }
}

/// How the improvement phase ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No improving move was left.
    Converged,
    /// The applied-move budget ran out first.
    MoveBudgetExhausted,
    /// The request deadline expired first.
    DeadlineExpired,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::MoveBudgetExhausted => "move_budget_exhausted",
            Termination::DeadlineExpired => "deadline_expired",
        }
    }

    /// True when the result is best-so-far rather than a local optimum.
    pub fn budget_hit(self) -> bool {
        !matches!(self, Termination::Converged)
    }
}

/// Aggregate figures across all routes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Totals {
    pub distance_km: f64,
    pub load: f64,
    pub co2_kg: f64,
    pub time_minutes: f64,
    /// Estimated saving against unoptimised dispatch.
    pub co2_saved_kg: f64,
    /// Trees needed to absorb `co2_saved_kg` over a year.
    pub trees_equivalent: f64,
}

/// Output of one optimize call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationResult {
    /// Non-empty routes, ordered by vehicle id.
    pub routes: Vec<Route>,
    /// Location indices with positive demand that no vehicle could take.
    pub unserved: Vec<usize>,
    pub totals: Totals,
    pub termination: Termination,
}

impl OptimizationResult {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unserved.is_empty()
    }
}

/// One period of demand history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DemandSample {
    pub date: NaiveDate,
    /// Observed demand in litres; absent until the period has closed.
    #[serde(default)]
    pub actual_demand: Option<f64>,
    /// Prediction previously issued for this period, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_demand: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DemandSample {
    pub fn observed(date: NaiveDate, actual_demand: f64) -> Self {
        Self {
            date,
            actual_demand: Some(actual_demand),
            predicted_demand: None,
            confidence: None,
        }
    }
}

/// Which path produced a forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMethod {
    /// Seasonally adjusted exponential smoothing over observed history.
    Model,
    /// Fixed placeholder used when history is too thin.
    Fallback,
}

impl ForecastMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ForecastMethod::Model => "model",
            ForecastMethod::Fallback => "fallback",
        }
    }
}

/// Prediction for the period after the newest sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastResult {
    pub predicted_demand: f64,
    /// Self-assessed certainty, always within `[0.5, 0.95]`.
    pub confidence: f64,
    pub method: ForecastMethod,
    /// Period being predicted, when history carried dates.
    pub date: Option<NaiveDate>,
}
