pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod models;
pub(crate) mod process;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/models", get(models::list_models))
        .route("/v1/process/patient", post(process::process_patient))
        .route("/v1/process/batch", post(process::process_batch))
        .route("/v1/process/text", post(process::process_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
