//! DTOs for REST API requests/responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    DemandSample, ForecastMethod, ForecastResult, OptimizationResult, Route, Stop, Termination,
};
use crate::error::ServiceError;
use crate::pricing::{
    demand_index_from_forecast, non_negative, PriceInputs, PriceQuote, DEFAULT_BASE_PRICE,
    DEFAULT_DEMAND_INDEX, DEFAULT_QUALITY, DEFAULT_SPOILAGE_RISK,
};

/// Route-optimize request. `locations[0]` is the depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OptimizeRequest {
    /// City names from the gazetteer, `"lat,lon"` literals, or free-form ids.
    pub locations: Vec<String>,
    /// Litres per location; `demands[0]` must be 0.
    pub demands: Vec<f64>,
    pub num_vehicles: i64,
    /// Per-vehicle capacity in litres; the server default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    /// Precomputed `n x n` distances in km, used instead of the gazetteer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<Vec<f64>>>,
}

/// One vehicle's tour in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteDto {
    pub vehicle_id: usize,
    /// Kilometres, depot to depot.
    pub distance: f64,
    pub load: f64,
    /// Kilograms of CO₂.
    pub co2_emissions: f64,
    pub estimated_time_minutes: f64,
    /// Location ids in visiting order, starting and ending at the depot.
    pub stops: Vec<String>,
}

impl RouteDto {
    pub fn from_route(route: &Route, stops: &[Stop]) -> Self {
        Self {
            vehicle_id: route.vehicle_id,
            distance: route.distance_km,
            load: route.load,
            co2_emissions: route.co2_emissions_kg,
            estimated_time_minutes: route.estimated_time_minutes,
            stops: route
                .tour()
                .into_iter()
                .map(|i| stop_id(stops, i))
                .collect(),
        }
    }
}

/// Route-optimize response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OptimizeResponse {
    pub routes: Vec<RouteDto>,
    /// Ids of stops no vehicle could take.
    pub unserved: Vec<String>,
    pub total_distance_km: f64,
    pub total_load: f64,
    pub total_co2_kg: f64,
    pub total_time_minutes: f64,
    pub co2_saved_kg: f64,
    pub trees_equivalent: f64,
    pub termination: Termination,
}

impl OptimizeResponse {
    pub fn from_result(result: &OptimizationResult, stops: &[Stop]) -> Self {
        Self {
            routes: result
                .routes
                .iter()
                .map(|r| RouteDto::from_route(r, stops))
                .collect(),
            unserved: result
                .unserved
                .iter()
                .map(|&i| stop_id(stops, i))
                .collect(),
            total_distance_km: result.totals.distance_km,
            total_load: result.totals.load,
            total_co2_kg: result.totals.co2_kg,
            total_time_minutes: result.totals.time_minutes,
            co2_saved_kg: result.totals.co2_saved_kg,
            trees_equivalent: result.totals.trees_equivalent,
            termination: result.termination,
        }
    }
}

fn stop_id(stops: &[Stop], index: usize) -> String {
    stops
        .get(index)
        .map(|s| s.location.id.clone())
        .unwrap_or_else(|| index.to_string())
}

/// Predict-demand request. An empty object takes the fallback path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictRequest {
    /// Oldest first.
    #[serde(default)]
    pub history: Vec<DemandSample>,
}

/// Predict-demand response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictResponse {
    pub predicted_demand: f64,
    pub confidence: f64,
    pub method: ForecastMethod,
    /// Day being predicted, when the history carried dates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl From<ForecastResult> for PredictResponse {
    fn from(result: ForecastResult) -> Self {
        Self {
            predicted_demand: result.predicted_demand,
            confidence: result.confidence,
            method: result.method,
            date: result.date,
        }
    }
}

/// Pricing request. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricingRequest {
    #[serde(default)]
    pub base_price: Option<f64>,
    #[serde(default)]
    pub demand_index: Option<f64>,
    /// Forecast litres for the period; sets `demand_index` when that is absent.
    #[serde(default)]
    pub predicted_demand: Option<f64>,
    #[serde(default)]
    pub spoilage_risk: Option<f64>,
    /// Grade: `A+`, `A` or `B`.
    #[serde(default)]
    pub quality: Option<String>,
}

impl PricingRequest {
    /// Fills defaults. A `predicted_demand` is read relative to
    /// `normal_demand` when no explicit `demand_index` is given.
    pub fn to_inputs(&self, normal_demand: f64) -> Result<PriceInputs, ServiceError> {
        let demand_index = match (self.demand_index, self.predicted_demand) {
            (Some(index), _) => index,
            (None, Some(predicted)) => {
                non_negative("predicted_demand", predicted)?;
                demand_index_from_forecast(predicted, normal_demand)
            }
            (None, None) => DEFAULT_DEMAND_INDEX,
        };
        Ok(PriceInputs {
            base_price: self.base_price.unwrap_or(DEFAULT_BASE_PRICE),
            demand_index,
            spoilage_risk: self.spoilage_risk.unwrap_or(DEFAULT_SPOILAGE_RISK),
            quality: self
                .quality
                .clone()
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricingFactors {
    pub demand_index: f64,
    pub spoilage_risk: f64,
    pub quality_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricingResponse {
    pub base_price: f64,
    pub dynamic_price: f64,
    pub factors: PricingFactors,
}

impl From<PriceQuote> for PricingResponse {
    fn from(quote: PriceQuote) -> Self {
        Self {
            base_price: quote.base_price,
            dynamic_price: quote.dynamic_price,
            factors: PricingFactors {
                demand_index: quote.demand_index,
                spoilage_risk: quote.spoilage_risk,
                quality_multiplier: quote.quality_multiplier,
            },
        }
    }
}
