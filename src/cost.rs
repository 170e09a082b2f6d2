//! Cost and emissions model.
//!
//! Derives distance, load, elapsed time and CO₂ for a route. All factors
//! are configuration so vehicle class or fuel changes never touch the
//! optimizer.

use crate::domain::{Route, Totals};
use crate::matrix::DistanceMatrix;

/// Share of emissions assumed saved against unoptimised dispatch.
const CO2_SAVED_SHARE: f64 = 0.25;

/// CO₂ absorbed by one mature tree per year, in kg.
const KG_CO2_PER_TREE: f64 = 21.0;

/// Speed, service time and emission parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    /// Average driving speed used for travel times.
    pub average_speed_kmph: f64,
    /// Fixed handling time spent at each stop.
    pub service_time_minutes: f64,
    /// Grams of CO₂ per km per litre carried.
    pub emission_factor_g_per_km_l: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            average_speed_kmph: 40.0,
            service_time_minutes: 10.0,
            emission_factor_g_per_km_l: 0.4,
        }
    }
}

impl CostModel {
    /// Fills in the derived figures of `route`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::cost::CostModel;
    /// use dairy_logistics::domain::Route;
    /// use dairy_logistics::matrix::DistanceMatrix;
    ///
    /// // Three unresolved locations: every leg is 20 km
    /// let locations: Vec<_> = (0..3)
    ///     .map(|i| dairy_logistics::domain::Location::new(i, format!("site-{}", i)))
    ///     .collect();
    /// let matrix = DistanceMatrix::build(&locations, 40.0, 20.0).unwrap();
    ///
    /// let model = CostModel::default();
    /// let mut route = Route::new(1, vec![1, 2]);
    /// model.evaluate(&mut route, &matrix, &[0.0, 100.0, 150.0]);
    ///
    /// assert_eq!(route.distance_km, 60.0);
    /// assert_eq!(route.load, 250.0);
    /// assert_eq!(route.estimated_time_minutes, 110.0); // 90 driving + 2 x 10 service
    /// assert_eq!(route.co2_emissions_kg, 6.0);         // 60 km x 250 L x 0.4 g
    /// ```
    pub fn evaluate(&self, route: &mut Route, matrix: &DistanceMatrix, demands: &[f64]) {
        let tour = route.tour();
        let (distance, driving) = tour.windows(2).fold((0.0, 0.0), |(d, t), leg| {
            (d + matrix.distance(leg[0], leg[1]), t + matrix.time(leg[0], leg[1]))
        });
        let load: f64 = route.stops.iter().map(|&s| demands[s]).sum();

        route.distance_km = round_to(distance, 2);
        route.load = load;
        route.estimated_time_minutes =
            round_to(driving + self.service_time_minutes * route.stops.len() as f64, 1);
        route.co2_emissions_kg = round_to(self.co2_kg(distance, load), 2);
    }

    /// CO₂ mass in kg for carrying `load` litres over `distance_km`.
    #[inline]
    pub fn co2_kg(&self, distance_km: f64, load: f64) -> f64 {
        distance_km * load * self.emission_factor_g_per_km_l / 1000.0
    }

    /// Sums already-evaluated routes and derives the savings summary.
    pub fn totals(&self, routes: &[Route]) -> Totals {
        let mut totals = routes.iter().fold(Totals::default(), |mut acc, r| {
            acc.distance_km += r.distance_km;
            acc.load += r.load;
            acc.co2_kg += r.co2_emissions_kg;
            acc.time_minutes += r.estimated_time_minutes;
            acc
        });

        totals.distance_km = round_to(totals.distance_km, 2);
        totals.co2_kg = round_to(totals.co2_kg, 2);
        totals.time_minutes = round_to(totals.time_minutes, 1);
        totals.co2_saved_kg = round_to(totals.co2_kg * CO2_SAVED_SHARE, 2);
        totals.trees_equivalent = round_to(totals.co2_saved_kg / KG_CO2_PER_TREE, 1);
        totals
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
