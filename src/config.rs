use std::{collections::BTreeMap, env, num::NonZeroUsize, path::PathBuf};

use thiserror::Error;

use crate::pipeline::settings::ModelSpec;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_LENGTH: usize = 512;

/// Service configuration read from the environment.
///
/// The model roster comes from `API_ML_MODEL_NAMES` (comma-separated); each
/// named model reads `API_ML_<NAME>_{DEVICE,MODEL_PATH,TOKENIZER_PATH,
/// MAX_LENGTH}`. An empty roster simply leaves ML inference out of the
/// baseline pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    host: String,
    port: u16,
    workers: NonZeroUsize,
    ml_models: BTreeMap<String, ModelSpec>,
    pipeline_settings_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Read and validate the service configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a named model is missing its
    /// `MODEL_PATH` or when a numeric variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("API_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = parse_u16("API_PORT", DEFAULT_PORT)?;
        let workers = parse_non_zero_usize("API_WORKERS", crate::pipeline::DEFAULT_WORKERS)?;
        let ml_models = parse_model_roster()?;
        let pipeline_settings_path = env::var("PIPELINE_SETTINGS_PATH").ok().map(PathBuf::from);

        Ok(Self {
            host,
            port,
            workers,
            ml_models,
            pipeline_settings_path,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    #[must_use]
    pub fn ml_models(&self) -> &BTreeMap<String, ModelSpec> {
        &self.ml_models
    }

    #[must_use]
    pub fn pipeline_settings_path(&self) -> Option<&PathBuf> {
        self.pipeline_settings_path.as_ref()
    }
}

fn parse_model_roster() -> Result<BTreeMap<String, ModelSpec>, ConfigError> {
    let names = match env::var("API_ML_MODEL_NAMES") {
        Ok(raw) => raw,
        Err(_) => return Ok(BTreeMap::new()),
    };

    let mut models = BTreeMap::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let prefix = format!("API_ML_{}", name.to_uppercase().replace('-', "_"));
        let model_path_var = format!("{prefix}_MODEL_PATH");
        let model_path =
            env::var(&model_path_var).map_err(|_| ConfigError::Missing(model_path_var))?;
        let tokenizer_path =
            env::var(format!("{prefix}_TOKENIZER_PATH")).unwrap_or_else(|_| model_path.clone());
        let device = env::var(format!("{prefix}_DEVICE")).ok();
        let max_length = parse_usize_var(&format!("{prefix}_MAX_LENGTH"), DEFAULT_MAX_LENGTH)?;

        models.insert(
            name.to_string(),
            ModelSpec {
                device,
                model_path,
                tokenizer_path,
                max_length,
            },
        );
    }
    Ok(models)
}

fn parse_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u16>().map_err(|error| ConfigError::Invalid {
        name: name.to_string(),
        source: anyhow::Error::new(error),
    })
}

fn parse_usize_var(name: &str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name: name.to_string(),
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize_var(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name: name.to_string(),
        source: anyhow::anyhow!("must be greater than zero"),
    })
}
