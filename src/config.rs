//! Configuration management.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file). Every knob has a default so the service starts with no setup.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::cost::CostModel;
use crate::forecast::ForecastConfig;
use crate::optimizer::OptimizerConfig;

/// Default per-vehicle capacity in litres.
pub const DEFAULT_CAPACITY: f64 = 1000.0;

/// Distance assumed for a leg whose endpoint has no known coordinate.
pub const DEFAULT_UNKNOWN_DISTANCE_KM: f64 = 50.0;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Capacity applied when a request does not carry its own.
    pub default_capacity: f64,
    /// Distance used for legs touching an unresolved location.
    pub unknown_distance_km: f64,
    /// Speed, service time and emission factors.
    pub cost: CostModel,
    /// Improvement-phase budgets.
    pub optimizer: OptimizerConfig,
    /// Forecaster smoothing and fallback settings.
    pub forecast: ForecastConfig,
    /// Report any unserved stop as an error instead of a partial plan.
    pub strict_capacity: bool,
    /// Print coloured solver phases to stdout.
    pub console_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7860)),
            default_capacity: DEFAULT_CAPACITY,
            unknown_distance_km: DEFAULT_UNKNOWN_DISTANCE_KM,
            cost: CostModel::default(),
            optimizer: OptimizerConfig::default(),
            forecast: ForecastConfig::default(),
            strict_capacity: false,
            console_output: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    ///
    /// ```
    /// use dairy_logistics::config::Config;
    ///
    /// let config = Config::from_lookup(|key| match key {
    ///     "DEFAULT_CAPACITY" => Some("400".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.default_capacity, 400.0);
    /// assert_eq!(config.forecast.min_history, 7);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(&read, "BIND_ADDR", defaults.bind_addr)?;
        let default_capacity = parse_or(&read, "DEFAULT_CAPACITY", defaults.default_capacity)?;
        let unknown_distance_km =
            parse_or(&read, "UNKNOWN_DISTANCE_KM", defaults.unknown_distance_km)?;

        let cost = CostModel {
            average_speed_kmph: parse_or(&read, "AVERAGE_SPEED_KMPH", defaults.cost.average_speed_kmph)?,
            service_time_minutes: parse_or(
                &read,
                "SERVICE_TIME_MINUTES",
                defaults.cost.service_time_minutes,
            )?,
            emission_factor_g_per_km_l: parse_or(
                &read,
                "EMISSION_FACTOR_G_PER_KM_L",
                defaults.cost.emission_factor_g_per_km_l,
            )?,
        };

        let timeout_ms: u64 = parse_or(
            &read,
            "OPTIMIZE_TIMEOUT_MS",
            defaults.optimizer.time_limit.as_millis() as u64,
        )?;
        let optimizer = OptimizerConfig {
            time_limit: Duration::from_millis(timeout_ms),
            move_budget: parse_or(&read, "MOVE_BUDGET", defaults.optimizer.move_budget)?,
        };

        let forecast = ForecastConfig {
            smoothing_alpha: parse_or(&read, "SMOOTHING_ALPHA", defaults.forecast.smoothing_alpha)?,
            min_history: parse_or(&read, "MIN_HISTORY", defaults.forecast.min_history)?,
            seasonal_min_samples: parse_or(
                &read,
                "SEASONAL_MIN_SAMPLES",
                defaults.forecast.seasonal_min_samples,
            )?,
            fallback_demand: parse_or(&read, "FALLBACK_DEMAND", defaults.forecast.fallback_demand)?,
            ..defaults.forecast
        };

        let config = Self {
            bind_addr,
            default_capacity,
            unknown_distance_km,
            cost,
            optimizer,
            forecast,
            strict_capacity: parse_or(&read, "STRICT_CAPACITY", defaults.strict_capacity)?,
            console_output: parse_or(&read, "CONSOLE_OUTPUT", defaults.console_output)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.default_capacity.is_finite() && self.default_capacity > 0.0) {
            bail!("DEFAULT_CAPACITY must be a positive number (got {})", self.default_capacity);
        }
        if !(self.unknown_distance_km.is_finite() && self.unknown_distance_km >= 0.0) {
            bail!("UNKNOWN_DISTANCE_KM must be non-negative (got {})", self.unknown_distance_km);
        }
        if !(self.cost.average_speed_kmph.is_finite() && self.cost.average_speed_kmph > 0.0) {
            bail!("AVERAGE_SPEED_KMPH must be positive (got {})", self.cost.average_speed_kmph);
        }
        if !(self.cost.service_time_minutes.is_finite() && self.cost.service_time_minutes >= 0.0) {
            bail!("SERVICE_TIME_MINUTES must be non-negative (got {})", self.cost.service_time_minutes);
        }
        if !(self.cost.emission_factor_g_per_km_l.is_finite()
            && self.cost.emission_factor_g_per_km_l >= 0.0)
        {
            bail!(
                "EMISSION_FACTOR_G_PER_KM_L must be non-negative (got {})",
                self.cost.emission_factor_g_per_km_l
            );
        }
        let alpha = self.forecast.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            bail!("SMOOTHING_ALPHA must be in (0, 1] (got {})", alpha);
        }
        if !(self.forecast.fallback_demand.is_finite() && self.forecast.fallback_demand >= 0.0) {
            bail!("FALLBACK_DEMAND must be non-negative (got {})", self.forecast.fallback_demand);
        }
        Ok(())
    }
}

fn parse_or<T, R>(read: &R, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    R: Fn(&str) -> Option<String>,
{
    match read(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 7860);
        assert_eq!(config.default_capacity, 1000.0);
        assert_eq!(config.cost.average_speed_kmph, 40.0);
        assert!(!config.strict_capacity);
        assert!(config.console_output);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("OPTIMIZE_TIMEOUT_MS", "250"),
            ("MOVE_BUDGET", "42"),
            ("STRICT_CAPACITY", "true"),
            ("SMOOTHING_ALPHA", "0.5"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.optimizer.time_limit, Duration::from_millis(250));
        assert_eq!(config.optimizer.move_budget, 42);
        assert!(config.strict_capacity);
        assert_eq!(config.forecast.smoothing_alpha, 0.5);
    }

    #[test]
    fn test_blank_value_uses_default() {
        let config = Config::from_lookup(lookup(&[("DEFAULT_CAPACITY", "  ")])).unwrap();
        assert_eq!(config.default_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_unparsable_value_names_variable() {
        let err = Config::from_lookup(lookup(&[("MOVE_BUDGET", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MOVE_BUDGET"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Config::from_lookup(lookup(&[("DEFAULT_CAPACITY", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("AVERAGE_SPEED_KMPH", "-5")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SMOOTHING_ALPHA", "1.5")])).is_err());
    }
}
