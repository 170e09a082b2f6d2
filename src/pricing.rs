//! Dynamic per-litre pricing.
//!
//! `price = base × quality × (1 + 0.15·demand_index − 0.1·spoilage_risk)`,
//! kept within a band of 0.8× to 1.6× the base price and rounded to cents.

use crate::error::ServiceError;

pub const DEFAULT_BASE_PRICE: f64 = 50.0;
pub const DEFAULT_DEMAND_INDEX: f64 = 1.0;
pub const DEFAULT_SPOILAGE_RISK: f64 = 0.1;
pub const DEFAULT_QUALITY: &str = "A";

const DEMAND_WEIGHT: f64 = 0.15;
const SPOILAGE_WEIGHT: f64 = 0.1;
const FLOOR_RATIO: f64 = 0.8;
const CEILING_RATIO: f64 = 1.6;

/// Price multiplier for a quality grade. Grades match exactly; anything
/// else is neutral.
///
/// ```
/// use dairy_logistics::pricing::quality_multiplier;
///
/// assert_eq!(quality_multiplier("A+"), 1.2);
/// assert_eq!(quality_multiplier("B"), 0.85);
/// assert_eq!(quality_multiplier("b"), 1.0);
/// assert_eq!(quality_multiplier("C"), 1.0);
/// ```
pub fn quality_multiplier(grade: &str) -> f64 {
    match grade {
        "A+" => 1.2,
        "A" => 1.0,
        "B" => 0.85,
        _ => 1.0,
    }
}

/// Inputs to one price quote.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceInputs {
    pub base_price: f64,
    /// Relative demand pressure; 1.0 is a normal day.
    pub demand_index: f64,
    /// Probability-like spoilage risk of the batch.
    pub spoilage_risk: f64,
    pub quality: String,
}

impl Default for PriceInputs {
    fn default() -> Self {
        Self {
            base_price: DEFAULT_BASE_PRICE,
            demand_index: DEFAULT_DEMAND_INDEX,
            spoilage_risk: DEFAULT_SPOILAGE_RISK,
            quality: DEFAULT_QUALITY.to_string(),
        }
    }
}

/// A computed price and the factors behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub base_price: f64,
    pub dynamic_price: f64,
    pub demand_index: f64,
    pub spoilage_risk: f64,
    pub quality_multiplier: f64,
}

impl PriceInputs {
    /// Computes the dynamic price.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::pricing::PriceInputs;
    ///
    /// // 50 × 1.0 × (1 + 0.15 − 0.01)
    /// let quote = PriceInputs::default().quote().unwrap();
    /// assert_eq!(quote.dynamic_price, 57.0);
    /// ```
    pub fn quote(&self) -> Result<PriceQuote, ServiceError> {
        non_negative("base_price", self.base_price)?;
        non_negative("demand_index", self.demand_index)?;
        non_negative("spoilage_risk", self.spoilage_risk)?;

        let multiplier = quality_multiplier(&self.quality);
        let raw = self.base_price
            * multiplier
            * (1.0 + DEMAND_WEIGHT * self.demand_index - SPOILAGE_WEIGHT * self.spoilage_risk);
        let price = raw.clamp(self.base_price * FLOOR_RATIO, self.base_price * CEILING_RATIO);

        Ok(PriceQuote {
            base_price: self.base_price,
            dynamic_price: (price * 100.0).round() / 100.0,
            demand_index: self.demand_index,
            spoilage_risk: self.spoilage_risk,
            quality_multiplier: multiplier,
        })
    }
}

/// Demand index implied by a forecast: predicted volume over the normal day.
///
/// ```
/// use dairy_logistics::pricing::demand_index_from_forecast;
///
/// assert_eq!(demand_index_from_forecast(1500.0, 1200.0), 1.25);
/// ```
pub fn demand_index_from_forecast(predicted_demand: f64, normal_demand: f64) -> f64 {
    if normal_demand > 0.0 {
        predicted_demand / normal_demand
    } else {
        DEFAULT_DEMAND_INDEX
    }
}

pub(crate) fn non_negative(field: &str, value: f64) -> Result<(), ServiceError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ServiceError::invalid(
            field,
            format!("must be a non-negative number, got {}", value),
        ))
    }
}
