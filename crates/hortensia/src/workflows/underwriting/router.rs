use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::warn;

use super::service::UnderwritingService;

/// Router exposing the decision endpoint under its current and legacy paths.
pub fn underwriting_router(service: Arc<UnderwritingService>) -> Router {
    Router::new()
        .route("/predecir/", post(decide_handler))
        .route("/predict_contraoferta", post(decide_handler))
        .with_state(service)
}

pub(crate) async fn decide_handler(
    State(service): State<Arc<UnderwritingService>>,
    axum::Json(payload): axum::Json<Value>,
) -> Response {
    match service.decide_and_predict(&payload) {
        Ok(decision) => {
            let payload = json!({
                "resultado": decision.to_response(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => {
            warn!(error = %error, "request rejected by validation");
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
    }
}
