use axum::{Json, extract::State};
use serde::Serialize;

use crate::{app::AppState, pipeline::ml::MlInference};

#[derive(Debug, Serialize)]
pub(crate) struct MlModelInfo {
    name: String,
    device: String,
    max_length: usize,
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    loaded_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MlModelsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    default_name: Option<String>,
    models: Vec<MlModelInfo>,
}

/// Metadata of the configured model roster. Models load eagerly at engine
/// construction, so every roster entry normally reports `loaded: true`.
pub(crate) async fn list_models(State(state): State<AppState>) -> Json<MlModelsResponse> {
    let batch = state.batch();
    let Some(ml) = batch.engine().ml() else {
        return Json(MlModelsResponse {
            default_name: None,
            models: Vec::new(),
        });
    };

    let loaded = MlInference::loaded_models();
    let models = ml
        .roster()
        .into_iter()
        .map(|name| {
            if let Some(meta) = loaded.iter().find(|m| m.name == name) {
                MlModelInfo {
                    name,
                    device: meta.device.clone(),
                    max_length: meta.max_length,
                    loaded: true,
                    loaded_at: Some(meta.loaded_at.clone()),
                }
            } else {
                MlModelInfo {
                    name,
                    device: String::new(),
                    max_length: 0,
                    loaded: false,
                    loaded_at: None,
                }
            }
        })
        .collect();

    Json(MlModelsResponse {
        default_name: Some(ml.default_name().to_string()),
        models,
    })
}
