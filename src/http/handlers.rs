//! Endpoint handlers.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::server::AppState;
use crate::payments::{ChargeReceipt, PaymentError, PaymentRequest};
use crate::resilience::Transition;

#[derive(Debug, Serialize)]
pub struct PaymentAccepted {
    pub success: bool,
    pub result: ChargeReceipt,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub circuit_state: &'static str,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Rates are percentages with two decimals, ties rounded away from zero
/// (`0.125` renders as `"0.13%"`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBody {
    pub retry_count: u64,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub success_rate: String,
    pub failure_rate: String,
    pub circuit_transitions: Vec<Transition>,
}

#[derive(Debug, Serialize)]
pub struct SummaryBody {
    pub summary: String,
}

/// `POST /pay`
///
/// The payment runs on its own task so a client hanging up mid-request
/// cannot interrupt the breaker and ledger bookkeeping.
pub async fn pay(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentAccepted>, PaymentError> {
    let gateway = state.gateway.clone();
    let outcome = tokio::spawn(async move { gateway.submit(request).await }).await;

    match outcome {
        Ok(Ok(receipt)) => Ok(Json(PaymentAccepted {
            success: true,
            result: receipt,
        })),
        Ok(Err(e)) => Err(e),
        Err(e) => {
            tracing::error!(error = %e, "Payment task did not complete");
            Err(PaymentError::Failed {
                reason: "Payment processing was interrupted.".to_string(),
            })
        }
    }
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    let status = state.gateway.status();
    Json(StatusBody {
        circuit_state: status.state.as_lowercase(),
        failure_count: status.failure_count,
        last_failure: status.last_failure,
    })
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsBody> {
    let snapshot = state.gateway.metrics();
    Json(MetricsBody {
        retry_count: snapshot.total_retries,
        total_attempts: snapshot.total_attempts,
        total_successes: snapshot.total_successes,
        total_failures: snapshot.total_failures,
        success_rate: format_percent(snapshot.success_rate),
        failure_rate: format_percent(snapshot.failure_rate),
        circuit_transitions: snapshot.circuit_transitions,
    })
}

fn format_percent(value: f64) -> String {
    format!("{:.2}%", (value * 100.0).round() / 100.0)
}

/// `GET /status/summary`
pub async fn summary(State(state): State<AppState>) -> Json<SummaryBody> {
    Json(SummaryBody {
        summary: state.gateway.summary(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::format_percent;
    use crate::config::GatewayConfig;
    use crate::http::server::{build_router, AppState, X_REQUEST_ID};
    use crate::payments::{PaymentGateway, SimulatedProvider};

    fn app(failure_rate: f64, failure_threshold: u32) -> Router {
        let mut config = GatewayConfig::default();
        config.retries.max_attempts = 1;
        config.breaker.failure_threshold = failure_threshold;
        let gateway = PaymentGateway::new(&config, Arc::new(SimulatedProvider::new(failure_rate)));
        build_router(
            AppState {
                gateway: Arc::new(gateway),
            },
            config.listener.max_body_bytes,
        )
    }

    fn pay_request() -> Request<Body> {
        Request::post("/pay")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"amount": 42.5, "currency": "USD", "source": "tok"}"#))
            .unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_payment() {
        let app = app(0.0, 5);
        let (status, body) = call(&app, pay_request()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["amount"], 42.5);
        assert_eq!(body["result"]["currency"], "USD");
        assert!(body["result"]["transactionId"].is_string());
    }

    #[tokio::test]
    async fn test_failed_then_rejected_payment() {
        let app = app(1.0, 1);

        let (status, body) = call(&app, pay_request()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Payment failed due to provider error.");
        assert_eq!(body["reason"], "payment_failed");

        let (status, body) = call(&app, pay_request()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body["error"],
            "Payment service temporarily unavailable (circuit breaker open)."
        );
        assert_eq!(body["reason"], "service_unavailable");

        let (_, status) = call(&app, get("/status")).await;
        assert_eq!(status["circuitState"], "open");
        assert_eq!(status["failureCount"], 1);
        assert!(status["lastFailure"].is_string());
    }

    #[tokio::test]
    async fn test_status_of_fresh_gateway() {
        let (status, body) = call(&app(0.0, 5), get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["circuitState"], "closed");
        assert_eq!(body["failureCount"], 0);
        assert!(body["lastFailure"].is_null());
    }

    #[tokio::test]
    async fn test_metrics_format() {
        let app = app(1.0, 1);
        call(&app, pay_request()).await;
        call(&app, pay_request()).await;

        let (_, body) = call(&app, get("/metrics")).await;
        assert_eq!(body["retryCount"], 0);
        assert_eq!(body["totalAttempts"], 2);
        assert_eq!(body["totalSuccesses"], 0);
        assert_eq!(body["totalFailures"], 2);
        assert_eq!(body["successRate"], "0.00%");
        assert_eq!(body["failureRate"], "100.00%");

        let transitions = body["circuitTransitions"].as_array().unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0]["from"], "CLOSED");
        assert_eq!(transitions[0]["to"], "OPEN");
        assert!(transitions[0]["at"].is_string());
    }

    #[test]
    fn test_percent_ties_round_up() {
        assert_eq!(format_percent(0.125), "0.13%");
        assert_eq!(format_percent(12.5), "12.50%");
        assert_eq!(format_percent(66.666), "66.67%");
        assert_eq!(format_percent(0.0), "0.00%");
        assert_eq!(format_percent(100.0), "100.00%");
    }

    #[tokio::test]
    async fn test_summary() {
        let (status, body) = call(&app(0.0, 5), get("/status/summary")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["summary"],
            "In the last 10 minutes, 0% of payment attempts failed due to provider instability. \
             The circuit breaker is closed and operating normally."
        );
    }

    #[tokio::test]
    async fn test_request_id_is_set() {
        let response = app(0.0, 5).oneshot(get("/status")).await.unwrap();
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let request = Request::post("/pay")
            .header("content-type", "application/json")
            .body(Body::from("{\"currency\": \"USD\"}"))
            .unwrap();
        let response = app(0.0, 5).oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
