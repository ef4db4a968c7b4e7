use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Outside geofence: distance={distance:.2}m, required={required_radius}m")]
    GeofenceViolation { distance: f64, required_radius: i32 },

    #[error("Operation not valid in current state: {current}")]
    StateConflict { current: String },

    #[error("Shift is not funded: funded_amount={funded_amount}")]
    FundingShortfall { funded_amount: i64 },

    #[error("Unauthorized: {0}")]
    Authorization(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, extra) = match &self {
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", json!({}))
            }
            ApiError::Gateway(e) => {
                tracing::error!("Gateway error: {}", e);
                (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR", json!({}))
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", json!({})),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", json!({})),
            ApiError::GeofenceViolation { distance, required_radius } => {
                tracing::warn!("Geofence violation: {}", self);
                // numeric values included so the client can tell the user how far off they are
                (
                    StatusCode::FORBIDDEN,
                    "GEOFENCE_VIOLATION",
                    json!({
                        "distance": (distance * 100.0).round() / 100.0,
                        "required_radius": required_radius,
                    }),
                )
            }
            ApiError::StateConflict { current } => (
                StatusCode::CONFLICT,
                "STATE_CONFLICT",
                json!({ "current_status": current }),
            ),
            ApiError::FundingShortfall { funded_amount } => (
                StatusCode::CONFLICT,
                "FUNDING_SHORTFALL",
                json!({ "funded_amount": funded_amount }),
            ),
            ApiError::Authorization(_) => {
                tracing::warn!("Authorization failure: {}", self);
                (StatusCode::FORBIDDEN, "UNAUTHORIZED", json!({}))
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", json!({}))
            }
        };

        let mut body = json!({
            "error": self.to_string(),
            "code": code,
        });
        if let (Some(map), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::Database(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
