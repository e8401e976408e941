//! Error responses.
//!
//! Caller-visible payment failures map to a status code and a
//! `{success: false, error, reason}` JSON body. `reason` is the stable
//! category; `error` is the human-readable message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::payments::PaymentError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub reason: &'static str,
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            reason: self.category(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
