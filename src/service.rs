//! Optimization service facade.
//!
//! Validates requests, then runs matrix → optimizer → cost model for an
//! optimize call, or the forecaster for a predict call. Holds only
//! read-only configuration, so one instance can serve concurrent calls.

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::console;
use crate::domain::{Location, OptimizationResult, Stop};
use crate::dto::{
    OptimizeRequest, OptimizeResponse, PredictRequest, PredictResponse, PricingRequest,
    PricingResponse,
};
use crate::error::ServiceError;
use crate::forecast::{forecast, validate_history};
use crate::matrix::DistanceMatrix;
use crate::optimizer::{RouteOptimizer, RoutingProblem};

/// A solved optimize request: resolved stops plus the costed result.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Every request location with its demand, depot first.
    pub stops: Vec<Stop>,
    pub result: OptimizationResult,
}

impl Plan {
    pub fn to_response(&self) -> OptimizeResponse {
        OptimizeResponse::from_result(&self.result, &self.stops)
    }

    /// Ids of stops left unserved.
    pub fn unserved_ids(&self) -> Vec<String> {
        self.result
            .unserved
            .iter()
            .filter_map(|&i| self.stops.get(i).map(|s| s.location.id.clone()))
            .collect()
    }
}

/// Stateless entry point for optimize, predict and pricing calls.
#[derive(Debug, Clone, Default)]
pub struct OptimizationService {
    config: Config,
}

impl OptimizationService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Optimizes with the configured deadline, starting now.
    pub fn optimize(&self, request: &OptimizeRequest) -> Result<Plan, ServiceError> {
        self.optimize_until(request, Instant::now() + self.config.optimizer.time_limit)
    }

    /// Validates, solves and costs `request`.
    ///
    /// Unserved stops are returned as part of the plan unless strict
    /// capacity mode is on, in which case they become `InfeasibleDemand`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::dto::OptimizeRequest;
    /// use dairy_logistics::error::ServiceError;
    /// use dairy_logistics::service::OptimizationService;
    ///
    /// let service = OptimizationService::default();
    /// let request = OptimizeRequest {
    ///     locations: vec!["depot".into(), "moga".into()],
    ///     demands: vec![0.0, 100.0, 50.0],
    ///     num_vehicles: 1,
    ///     capacity: None,
    ///     distances: None,
    /// };
    ///
    /// let err = service.optimize(&request).unwrap_err();
    /// assert!(matches!(err, ServiceError::InvalidInput { .. }));
    /// ```
    pub fn optimize_until(
        &self,
        request: &OptimizeRequest,
        deadline: Instant,
    ) -> Result<Plan, ServiceError> {
        validate_shape(request)?;

        let locations = request
            .locations
            .iter()
            .enumerate()
            .map(|(i, raw)| Location::resolve(i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let matrix = match &request.distances {
            Some(distances) => {
                if distances.len() != locations.len() {
                    return Err(ServiceError::invalid(
                        "distances",
                        format!(
                            "has {} rows, expected one per location ({})",
                            distances.len(),
                            locations.len()
                        ),
                    ));
                }
                DistanceMatrix::from_distances(distances.clone(), self.config.cost.average_speed_kmph)?
            }
            None => DistanceMatrix::build(
                &locations,
                self.config.cost.average_speed_kmph,
                self.config.unknown_distance_km,
            )?,
        };

        let capacity = request.capacity.unwrap_or(self.config.default_capacity);
        let problem = RoutingProblem::new(&matrix, &request.demands, request.num_vehicles, capacity)?;

        let stops: Vec<Stop> = locations
            .into_iter()
            .zip(&request.demands)
            .map(|(location, &demand)| Stop::new(location, demand))
            .collect();
        debug!(
            customers = stops.iter().filter(|s| !s.is_depot()).count(),
            unresolved = stops.iter().filter(|s| s.location.coord.is_none()).count(),
            precomputed = request.distances.is_some(),
            "Request validated"
        );

        let optimizer = RouteOptimizer::new(self.config.optimizer.clone())
            .with_console(self.config.console_output);
        let mut result = optimizer.solve_until(&problem, deadline);

        for route in &mut result.routes {
            self.config.cost.evaluate(route, &matrix, &request.demands);
        }
        result.totals = self.config.cost.totals(&result.routes);

        let plan = Plan { stops, result };

        if plan.result.termination.budget_hit() {
            warn!(
                termination = plan.result.termination.as_str(),
                "Returning best plan found within budget"
            );
        }

        if !plan.result.is_complete() {
            let unserved = plan.unserved_ids();
            warn!(
                unserved = ?unserved,
                total_demand = problem.total_demand(),
                fleet_capacity = capacity * problem.num_vehicles() as f64,
                "Demand exceeds what the fleet can carry"
            );
            if self.config.strict_capacity {
                return Err(ServiceError::InfeasibleDemand { unserved });
            }
        }

        info!(
            routes = plan.result.routes.len(),
            unserved = plan.result.unserved.len(),
            distance_km = plan.result.totals.distance_km,
            co2_kg = plan.result.totals.co2_kg,
            "Optimize complete"
        );

        Ok(plan)
    }

    /// Forecasts next-period demand.
    ///
    /// Thin history falls back rather than failing; only out-of-range
    /// sample values are rejected.
    pub fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, ServiceError> {
        validate_history(&request.history)?;
        let result = forecast(&request.history, &self.config.forecast);

        info!(
            samples = request.history.len(),
            method = result.method.as_str(),
            predicted_demand = result.predicted_demand,
            confidence = result.confidence,
            "Forecast complete"
        );
        if self.config.console_output {
            console::print_forecast(
                result.method.as_str(),
                request.history.len(),
                result.predicted_demand,
                result.confidence,
            );
        }

        Ok(result.into())
    }

    /// Quotes a dynamic per-litre price. A forecast volume is scaled against
    /// the forecaster's fallback demand, the normal day.
    pub fn price(&self, request: &PricingRequest) -> Result<PricingResponse, ServiceError> {
        let quote = request
            .to_inputs(self.config.forecast.fallback_demand)?
            .quote()?;
        debug!(dynamic_price = quote.dynamic_price, "Price quoted");
        Ok(quote.into())
    }
}

/// Shape checks that must pass before any location is resolved.
fn validate_shape(request: &OptimizeRequest) -> Result<(), ServiceError> {
    if request.locations.is_empty() {
        return Err(ServiceError::invalid(
            "locations",
            "at least the depot location is required",
        ));
    }
    if request.demands.len() != request.locations.len() {
        return Err(ServiceError::invalid(
            "demands",
            format!(
                "length {} does not match locations length {}",
                request.demands.len(),
                request.locations.len()
            ),
        ));
    }
    Ok(())
}
