//! Error taxonomy for the logistics core.
//!
//! Only [`ServiceError::InvalidInput`] halts a request in the default
//! configuration. Capacity shortfalls, expired deadlines and thin demand
//! history all degrade to labelled best-effort results instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors returned by the optimization and forecasting facade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Malformed request: mismatched lengths, bad ranges, non-finite values.
    #[error("invalid input for `{field}`: {message}")]
    InvalidInput { field: String, message: String },

    /// Some stops could not be served. Only raised in strict capacity mode.
    #[error("demand exceeds fleet capacity: {} stop(s) unserved", unserved.len())]
    InfeasibleDemand { unserved: Vec<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Shorthand for an [`ServiceError::InvalidInput`] on `field`.
    ///
    /// ```
    /// use dairy_logistics::error::ServiceError;
    ///
    /// let err = ServiceError::invalid("demands", "length 3 does not match locations length 4");
    /// assert_eq!(
    ///     err.to_string(),
    ///     "invalid input for `demands`: length 3 does not match locations length 4"
    /// );
    /// ```
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable kind used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput { .. } => "invalid_input",
            ServiceError::InfeasibleDemand { .. } => "infeasible_demand",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = match &self {
            ServiceError::InvalidInput { field, message } => {
                tracing::debug!(field = %field, "Rejected request: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": self.kind(), "field": field, "message": message }),
                )
            }
            ServiceError::InfeasibleDemand { unserved } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": self.kind(), "message": self.to_string(), "unserved": unserved }),
            ),
            ServiceError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": self.kind(), "message": "Internal error" }),
                )
            }
        };

        (body.0, Json(body.1)).into_response()
    }
}
