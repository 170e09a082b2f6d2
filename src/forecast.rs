//! Short-horizon demand forecaster.
//!
//! Seasonally adjusted simple exponential smoothing over observed daily
//! demand. Thin history takes a fixed, explicitly tagged fallback instead of
//! failing.

use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

use crate::domain::{DemandSample, ForecastMethod, ForecastResult};
use crate::error::ServiceError;

/// Lowest confidence ever reported; also the fallback confidence.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Highest confidence ever reported.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Forecaster settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// Smoothing factor α in (0, 1]. Higher weights recent days more.
    pub smoothing_alpha: f64,
    /// Observed samples required before the model path is used.
    pub min_history: usize,
    /// Observed samples required before day-of-week multipliers apply.
    pub seasonal_min_samples: usize,
    /// Prediction returned on the fallback path.
    pub fallback_demand: f64,
    /// Confidence returned on the fallback path.
    pub fallback_confidence: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            min_history: 7,
            seasonal_min_samples: 14,
            fallback_demand: 1200.0,
            fallback_confidence: MIN_CONFIDENCE,
        }
    }
}

/// Predicts demand for the period after the newest sample.
///
/// Samples without an `actual_demand` are ignored. History is expected
/// oldest first; it is re-sorted by date so out-of-order input gives the
/// same answer.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use dairy_logistics::domain::{DemandSample, ForecastMethod};
/// use dairy_logistics::forecast::{forecast, ForecastConfig};
///
/// let config = ForecastConfig::default();
///
/// let empty = forecast(&[], &config);
/// assert_eq!(empty.method, ForecastMethod::Fallback);
/// assert_eq!(empty.predicted_demand, 1200.0);
/// assert_eq!(empty.confidence, 0.5);
///
/// let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let flat: Vec<_> = (0..10)
///     .map(|i| DemandSample::observed(start + chrono::Duration::days(i), 900.0))
///     .collect();
/// let model = forecast(&flat, &config);
/// assert_eq!(model.method, ForecastMethod::Model);
/// assert_eq!(model.predicted_demand, 900.0);
/// assert_eq!(model.confidence, 0.95);
/// ```
pub fn forecast(history: &[DemandSample], config: &ForecastConfig) -> ForecastResult {
    let mut observed: Vec<(NaiveDate, f64)> = history
        .iter()
        .filter_map(|s| {
            s.actual_demand
                .filter(|d| d.is_finite())
                .map(|d| (s.date, d.max(0.0)))
        })
        .collect();
    observed.sort_by_key(|(date, _)| *date);

    let next_date = history
        .iter()
        .map(|s| s.date)
        .max()
        .and_then(|d| d.checked_add_signed(Duration::days(1)));

    if observed.len() < config.min_history.max(1) {
        debug!(
            samples = observed.len(),
            required = config.min_history,
            "Insufficient history, using fallback estimate"
        );
        return ForecastResult {
            predicted_demand: config.fallback_demand,
            confidence: config.fallback_confidence,
            method: ForecastMethod::Fallback,
            date: next_date,
        };
    }

    let seasonal = SeasonalIndex::fit(&observed, config.seasonal_min_samples);
    let alpha = config.smoothing_alpha;

    // One-step-ahead fit: f_t = L_{t-1} * s(t), residuals from t = 1
    let (first_date, first_value) = observed[0];
    let mut level = first_value / seasonal.factor(first_date);
    let mut squared_error = 0.0;
    for &(date, actual) in &observed[1..] {
        let s = seasonal.factor(date);
        let fitted = level * s;
        squared_error += (actual - fitted).powi(2);
        level = alpha * (actual / s) + (1.0 - alpha) * level;
    }

    let residuals = observed.len() - 1;
    let rmse = if residuals > 0 {
        (squared_error / residuals as f64).sqrt()
    } else {
        0.0
    };
    let mean = observed.iter().map(|(_, v)| v).sum::<f64>() / observed.len() as f64;

    let next = next_date.unwrap_or(first_date);
    let predicted_demand = (level * seasonal.factor(next)).max(0.0);

    let confidence = if mean > 0.0 {
        1.0 - rmse / mean
    } else if rmse == 0.0 {
        MAX_CONFIDENCE
    } else {
        MIN_CONFIDENCE
    };
    let confidence = confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

    debug!(
        samples = observed.len(),
        seasonal = seasonal.is_active(),
        level,
        rmse,
        predicted_demand,
        confidence,
        "Forecast fitted"
    );

    ForecastResult {
        predicted_demand: round_to(predicted_demand, 2),
        confidence: round_to(confidence, 3),
        method: ForecastMethod::Model,
        date: next_date,
    }
}

/// Range checks on a history before it reaches [`forecast`].
///
/// Demands must be finite and non-negative, confidences within `[0, 1]`.
///
/// ```
/// use chrono::NaiveDate;
/// use dairy_logistics::domain::DemandSample;
/// use dairy_logistics::forecast::validate_history;
///
/// let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// assert!(validate_history(&[DemandSample::observed(date, 900.0)]).is_ok());
/// assert!(validate_history(&[DemandSample::observed(date, -1.0)]).is_err());
/// ```
pub fn validate_history(history: &[DemandSample]) -> Result<(), ServiceError> {
    for (i, sample) in history.iter().enumerate() {
        for (name, value) in [
            ("actual_demand", sample.actual_demand),
            ("predicted_demand", sample.predicted_demand),
        ] {
            if let Some(v) = value.filter(|v| !(v.is_finite() && *v >= 0.0)) {
                return Err(ServiceError::invalid(
                    format!("history[{}].{}", i, name),
                    format!("must be a non-negative number, got {}", v),
                ));
            }
        }
        if let Some(c) = sample.confidence.filter(|c| !(0.0..=1.0).contains(c)) {
            return Err(ServiceError::invalid(
                format!("history[{}].confidence", i),
                format!("must be within [0, 1], got {}", c),
            ));
        }
    }
    Ok(())
}

/// Multiplicative day-of-week factors, Monday first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeasonalIndex {
    factors: [f64; 7],
    active: bool,
}

impl SeasonalIndex {
    /// Weekday mean over overall mean. Weekdays with no samples, or too
    /// little history overall, get a neutral 1.0.
    fn fit(observed: &[(NaiveDate, f64)], min_samples: usize) -> Self {
        let neutral = Self {
            factors: [1.0; 7],
            active: false,
        };
        if observed.len() < min_samples {
            return neutral;
        }

        let overall = observed.iter().map(|(_, v)| v).sum::<f64>() / observed.len() as f64;
        if overall <= 0.0 {
            return neutral;
        }

        let mut sums = [0.0; 7];
        let mut counts = [0usize; 7];
        for (date, value) in observed {
            let wd = date.weekday().num_days_from_monday() as usize;
            sums[wd] += value;
            counts[wd] += 1;
        }

        let mut factors = [1.0; 7];
        for wd in 0..7 {
            if counts[wd] > 0 {
                let factor = sums[wd] / counts[wd] as f64 / overall;
                // A weekday that averaged zero would divide the level away
                if factor > 0.0 {
                    factors[wd] = factor;
                }
            }
        }

        Self {
            factors,
            active: true,
        }
    }

    #[inline]
    fn factor(&self, date: NaiveDate) -> f64 {
        self.factors[date.weekday().num_days_from_monday() as usize]
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
