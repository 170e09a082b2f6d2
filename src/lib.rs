//! Dairy Logistics
//!
//! Plans capacitated milk-delivery routes from a single plant and forecasts
//! next-day demand, served over a small REST API.
//!
//! # Components
//!
//! - [`matrix`]: haversine distance and travel-time matrices
//! - [`optimizer`]: cheapest-insertion construction plus local search
//! - [`cost`]: per-route distance, time and CO₂, with fleet totals
//! - [`forecast`]: seasonal exponential smoothing with a tagged fallback
//! - [`service`]: request validation and orchestration
//!
//! # Constraints
//!
//! - **Vehicle capacity** (hard): no route carries more than its vehicle holds;
//!   stops that do not fit are reported as unserved
//! - **Distance** (soft): minimize total kilometres driven

pub mod api;
pub mod config;
pub mod console;
pub mod cost;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod forecast;
pub mod matrix;
pub mod optimizer;
pub mod pricing;
pub mod service;
