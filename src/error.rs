use thiserror::Error;

/// Errors surfaced by the pipeline engine and its stages.
///
/// Configuration problems (unknown component, bad status, missing required
/// parameter) are distinguished from runtime failures of the external NLP
/// capabilities so the transport layer can map them uniformly to 400-class
/// responses while logs retain the precise cause.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stage was enabled but a required parameter resolved to nothing,
    /// neither provided per call nor set as an instance default.
    #[error("{stage}.{param}: A value must be provided.")]
    MissingParameter {
        stage: &'static str,
        param: &'static str,
    },

    /// A stage-level setting was present but malformed.
    #[error("invalid configuration for {stage}: {message}")]
    InvalidConfiguration { stage: &'static str, message: String },

    /// An inference call referenced a model name outside the configured roster.
    #[error("unknown model name {requested:?}; available: {available:?}")]
    UnknownModel {
        requested: String,
        available: Vec<String>,
    },

    /// The classifier backend failed to load a model or tokenizer.
    #[error("failed to load model {name:?}: {message}")]
    ModelLoad { name: String, message: String },

    /// The sentence segmentation backend failed.
    #[error("sentence segmentation failed: {0}")]
    Segmentation(String),

    /// The classification backend failed at inference time.
    #[error("inference failed: {0}")]
    Inference(String),

    /// A batch worker thread terminated abnormally.
    #[error("batch worker panicked")]
    WorkerPanicked,
}

impl EngineError {
    pub(crate) fn missing(stage: &'static str, param: &'static str) -> Self {
        Self::MissingParameter { stage, param }
    }
}
