use axum::{Json, extract::State};
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
}

pub(crate) async fn live(State(_state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport { status: "live" })
}

pub(crate) async fn ready(State(state): State<AppState>) -> Json<HealthReport> {
    // The engines are constructed (and the model roster loaded) before the
    // router exists, so reaching this handler means the service is ready.
    let _ = state.batch();
    Json(HealthReport { status: "ready" })
}
