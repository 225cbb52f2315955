use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    app::AppState,
    data::{Note, Patient},
    error::EngineError,
    pipeline::settings::Overrides,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessPatientRequest {
    patient: Patient,
    #[serde(default)]
    config: Overrides,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessBatchRequest {
    patients: Vec<Patient>,
    #[serde(default)]
    config: Overrides,
    #[serde(default, alias = "worker_count")]
    workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessTextRequest {
    text: String,
    #[serde(default)]
    config: Overrides,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessTextResponse {
    preprocessed_text: Option<String>,
    predicted_label: Option<String>,
    predicted_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<Note>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Engine errors surface as 400s carrying the message; infrastructure
/// failures (worker join, poisoned lock) are 500s.
pub(crate) enum ApiError {
    Engine(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Engine(engine_error) => {
                let body = Json(ErrorResponse {
                    error: engine_error.to_string(),
                });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            Self::Internal(message) => {
                error!(%message, "internal error while processing");
                let body = Json(ErrorResponse { error: message });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

fn record_invocation(state: &AppState, patients: &[Patient], started: Instant) {
    let notes: usize = patients.iter().map(|p| p.notes.len()).sum();
    let dropped = patients
        .iter()
        .flat_map(|p| p.notes.iter())
        .filter(|n| n.preprocessed_text.as_deref() == Some("") && n.sections.is_empty())
        .count();
    state.telemetry().metrics().observe_invocation(
        patients.len(),
        notes,
        dropped,
        started.elapsed().as_secs_f64(),
    );
}

pub(crate) async fn process_patient(
    State(state): State<AppState>,
    Json(payload): Json<ProcessPatientRequest>,
) -> Result<Json<Patient>, ApiError> {
    let started = Instant::now();
    let single = state.single();

    let patient = tokio::task::spawn_blocking(move || {
        let mut patient = payload.patient;
        let mut pipeline = single
            .lock()
            .map_err(|_| ApiError::Internal("pipeline lock poisoned".to_string()))?;
        pipeline.process(&mut patient, Some(&payload.config))?;
        Ok::<Patient, ApiError>(patient)
    })
    .await
    .map_err(|error| ApiError::Internal(format!("processing task failed: {error}")))??;

    record_invocation(&state, std::slice::from_ref(&patient), started);
    Ok(Json(patient))
}

pub(crate) async fn process_batch(
    State(state): State<AppState>,
    Json(payload): Json<ProcessBatchRequest>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let started = Instant::now();
    let batch = state.batch();
    let workers = payload.workers.unwrap_or_else(|| state.config().workers());

    let patients = tokio::task::spawn_blocking(move || {
        let mut patients = payload.patients;
        batch.process(&mut patients, Some(&payload.config), workers)?;
        Ok::<Vec<Patient>, ApiError>(patients)
    })
    .await
    .map_err(|error| ApiError::Internal(format!("processing task failed: {error}")))??;

    state.telemetry().metrics().batches_total.inc();
    record_invocation(&state, &patients, started);
    Ok(Json(patients))
}

pub(crate) async fn process_text(
    State(state): State<AppState>,
    Json(payload): Json<ProcessTextRequest>,
) -> Result<Json<ProcessTextResponse>, ApiError> {
    let started = Instant::now();
    let single = state.single();
    let debug = payload.config.debug;

    let patient = tokio::task::spawn_blocking(move || {
        let mut patient = Patient::new("dummy", vec![Note::new(payload.text)]);
        let mut pipeline = single
            .lock()
            .map_err(|_| ApiError::Internal("pipeline lock poisoned".to_string()))?;
        pipeline.process(&mut patient, Some(&payload.config))?;
        Ok::<Patient, ApiError>(patient)
    })
    .await
    .map_err(|error| ApiError::Internal(format!("processing task failed: {error}")))??;

    record_invocation(&state, std::slice::from_ref(&patient), started);

    let note = patient
        .notes
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("processed patient lost its note".to_string()))?;

    Ok(Json(ProcessTextResponse {
        preprocessed_text: note.preprocessed_text.clone(),
        predicted_label: note.predicted_label.clone(),
        predicted_score: note.predicted_score,
        note: debug.then_some(note),
    }))
}
