//! Built-in gazetteer and demo datasets.
//!
//! Provides:
//! - The Punjab dairy-belt gazetteer used to resolve location names
//! - Ready-to-post optimize requests (`punjab`, `punjab-large`)
//! - A seeded synthetic demand history for the forecaster
//!
//! Synthetic history follows the pattern observed in plant dispatch data:
//! - Base demand of 1200 L
//! - Weekends +200 L
//! - Weekly sinusoid of ±150 L, slight upward trend, Gaussian-ish noise

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::DemandSample;
use crate::dto::OptimizeRequest;

/// A known city with coordinates.
#[derive(Debug, Clone, Copy)]
pub struct CityData {
    pub key: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

/// Dairy-belt cities with public coordinates.
pub const KNOWN_CITIES: &[CityData] = &[
    CityData { key: "ludhiana", name: "Ludhiana", lat: 30.9010, lng: 75.8573 },
    CityData { key: "jalandhar", name: "Jalandhar", lat: 31.3260, lng: 75.5762 },
    CityData { key: "amritsar", name: "Amritsar", lat: 31.6340, lng: 74.8723 },
    CityData { key: "patiala", name: "Patiala", lat: 30.3398, lng: 76.3869 },
    CityData { key: "bathinda", name: "Bathinda", lat: 30.2110, lng: 74.9455 },
    CityData { key: "mohali", name: "Mohali", lat: 30.7046, lng: 76.7179 },
    CityData { key: "hoshiarpur", name: "Hoshiarpur", lat: 31.5330, lng: 75.9120 },
    CityData { key: "firozpur", name: "Firozpur", lat: 30.9257, lng: 74.6142 },
    CityData { key: "moga", name: "Moga", lat: 30.8158, lng: 75.1705 },
    CityData { key: "kapurthala", name: "Kapurthala", lat: 31.3800, lng: 75.3800 },
];

/// Looks up a gazetteer city, ignoring case and surrounding whitespace.
///
/// ```
/// use dairy_logistics::demo_data::find_city;
///
/// assert_eq!(find_city("Patiala").map(|c| c.name), Some("Patiala"));
/// assert!(find_city("depot").is_none());
/// ```
pub fn find_city(name: &str) -> Option<&'static CityData> {
    let needle = name.trim();
    KNOWN_CITIES.iter().find(|c| c.key.eq_ignore_ascii_case(needle))
}

/// Available demo datasets.
pub fn available_datasets() -> &'static [&'static str] {
    &["punjab", "punjab-large"]
}

/// Returns a demo optimize request by name.
pub fn generate_by_name(name: &str) -> Option<OptimizeRequest> {
    match name.to_lowercase().as_str() {
        "punjab" => Some(generate_punjab()),
        "punjab-large" => Some(generate_punjab_large()),
        _ => None,
    }
}

/// Depot plus three cities, demands `[0, 250, 300, 200]`, three vehicles.
pub fn generate_punjab() -> OptimizeRequest {
    OptimizeRequest {
        locations: vec![
            "depot".to_string(),
            "jalandhar".to_string(),
            "amritsar".to_string(),
            "patiala".to_string(),
        ],
        demands: vec![0.0, 250.0, 300.0, 200.0],
        num_vehicles: 3,
        capacity: None,
        distances: None,
    }
}

/// Ludhiana plant as depot, the other nine cities as customers.
pub fn generate_punjab_large() -> OptimizeRequest {
    let mut rng = StdRng::seed_from_u64(7);
    let locations: Vec<String> = KNOWN_CITIES.iter().map(|c| c.key.to_string()).collect();
    let demands = std::iter::once(0.0)
        .chain((1..locations.len()).map(|_| (rng.gen_range(15..=45) * 10) as f64))
        .collect();

    OptimizeRequest {
        locations,
        demands,
        num_vehicles: 4,
        capacity: None,
        distances: None,
    }
}

/// Deterministic synthetic daily history ending the day before `end`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use dairy_logistics::demo_data::generate_history;
///
/// let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
/// let history = generate_history(end, 60);
/// assert_eq!(history.len(), 60);
/// assert_eq!(history.last().unwrap().date, NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
/// assert!(history.iter().all(|s| s.actual_demand.is_some()));
/// ```
pub fn generate_history(end: NaiveDate, days: usize) -> Vec<DemandSample> {
    let mut rng = StdRng::seed_from_u64(42);
    let start = end - Duration::days(days as i64);

    (0..days)
        .map(|i| {
            let date = start + Duration::days(i as i64);
            let weekday = date.weekday().num_days_from_monday() as f64;
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);

            let base = 1200.0;
            let weekend_effect = if weekend { 200.0 } else { 0.0 };
            let weekly = 150.0 * (2.0 * std::f64::consts::PI * weekday / 7.0).sin();
            let trend = i as f64 * 0.5;
            // Sum of uniforms approximates a normal with sd ~100
            let noise: f64 = (0..4).map(|_| rng.gen_range(-86.6..86.6)).sum();

            let demand = (base + weekend_effect + weekly + trend + noise).clamp(800.0, 2500.0);
            DemandSample::observed(date, demand.round())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasets_resolve() {
        for name in available_datasets() {
            let request = generate_by_name(name).unwrap();
            assert_eq!(request.locations.len(), request.demands.len());
            assert_eq!(request.demands[0], 0.0);
        }
        assert!(generate_by_name("atlantis").is_none());
    }

    #[test]
    fn test_large_dataset_is_stable() {
        assert_eq!(generate_punjab_large(), generate_punjab_large());
        assert_eq!(generate_punjab_large().locations.len(), KNOWN_CITIES.len());
    }

    #[test]
    fn test_history_is_deterministic() {
        let end = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(generate_history(end, 28), generate_history(end, 28));
    }

    #[test]
    fn test_history_within_bounds() {
        let end = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        for s in generate_history(end, 30) {
            let d = s.actual_demand.unwrap();
            assert!((800.0..=2500.0).contains(&d));
        }
    }
}
