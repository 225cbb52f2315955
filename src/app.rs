//! Application wiring: shared state, baseline pipeline settings, router.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;

use crate::{
    api,
    config::Config,
    observability::Telemetry,
    pipeline::{
        BatchPipeline, PipelineEngine, SinglePipeline,
        settings::{
            DuplicateCheckerSettings, EncodingFixerSettings, JoinerSettings, MlInferenceSettings,
            NoteFilterSettings, PatternReplacerSettings, PipelineSettings, SectionFilterSettings,
            SectionSplitterSettings, SentenceExpanderSettings, SentenceFilterSettings,
            SentenceSegmenterSettings, StageStatus, WordMaskerSettings,
        },
    },
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    single: Arc<Mutex<SinglePipeline>>,
    batch: Arc<BatchPipeline>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn single(&self) -> Arc<Mutex<SinglePipeline>> {
        Arc::clone(&self.registry.single)
    }

    pub(crate) fn batch(&self) -> Arc<BatchPipeline> {
        Arc::clone(&self.registry.batch)
    }
}

impl ComponentRegistry {
    /// Build the shared registry: telemetry, baseline settings, and both
    /// pipeline engines. The engines share the process-global model cache,
    /// so the roster loads once.
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let settings = Self::load_settings(&config)?;

        let single = SinglePipeline::new(
            PipelineEngine::new(&settings).context("failed to build single pipeline")?,
        );
        let batch = BatchPipeline::new(
            PipelineEngine::new(&settings).context("failed to build batch pipeline")?,
        );

        Ok(Self {
            config,
            telemetry,
            single: Arc::new(Mutex::new(single)),
            batch: Arc::new(batch),
        })
    }

    fn load_settings(config: &Config) -> Result<PipelineSettings> {
        let mut settings = match config.pipeline_settings_path() {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => baseline_settings(),
        };

        // The model roster always comes from the environment; a settings
        // file cannot smuggle model paths in.
        settings.ml_inference = if config.ml_models().is_empty() {
            None
        } else {
            Some(MlInferenceSettings {
                status: StageStatus::Enabled,
                models: Some(config.ml_models().clone()),
                use_preped_text: None,
            })
        };
        Ok(settings)
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

/// The stage settings the service boots with when no settings file is
/// given: the clinical thromboembolism defaults of the original deployment.
#[must_use]
pub fn baseline_settings() -> PipelineSettings {
    PipelineSettings {
        encoding_fixer: Some(EncodingFixerSettings {
            status: StageStatus::Enabled,
        }),
        pattern_replacer: Some(PatternReplacerSettings {
            status: StageStatus::Enabled,
            pattern: Some(r"\s{4,}".to_string()),
            target: Some("\n\n".to_string()),
        }),
        word_masker: Some(WordMaskerSettings {
            status: StageStatus::Enabled,
            words_to_mask: Some(vec!["PE CT".to_string(), "DVT ppx".to_string()]),
            mask_char: Some('*'),
        }),
        note_filter: Some(NoteFilterSettings {
            status: StageStatus::Enabled,
            words_to_search: Some(vec!["DVT".to_string(), "PE".to_string()]),
        }),
        section_splitter: Some(SectionSplitterSettings {
            status: StageStatus::Enabled,
            delimiter: Some("\n\n".to_string()),
        }),
        section_filter: Some(SectionFilterSettings {
            status: StageStatus::Enabled,
            section_inc_list: Some(vec![
                "Chief Complaint".to_string(),
                "Assessment".to_string(),
            ]),
            section_exc_list: Some(vec![
                "Review of System".to_string(),
                "System Review".to_string(),
            ]),
            fallback: Some(true),
        }),
        sentence_segmenter: Some(SentenceSegmenterSettings {
            status: StageStatus::Enabled,
            model_name: None,
            batch_size: Some(10),
        }),
        duplicate_checker: Some(DuplicateCheckerSettings {
            status: StageStatus::Enabled,
            num_perm: Some(256),
            sim_threshold: Some(0.9),
            length_threshold: Some(50),
        }),
        sentence_filter: Some(SentenceFilterSettings {
            status: StageStatus::Enabled,
            words_to_search: Some(vec!["DVT".to_string(), "PE".to_string()]),
        }),
        sentence_expander: Some(SentenceExpanderSettings {
            status: StageStatus::Enabled,
            length_threshold: Some(50),
        }),
        joiner: Some(JoinerSettings {
            status: StageStatus::Enabled,
            sentence_delimiter: Some("\n".to_string()),
            section_delimiter: Some("\n\n".to_string()),
        }),
        ml_inference: None,
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;

    #[test]
    fn component_registry_builds_without_a_model_roster() {
        let config = {
            let _lock = ENV_MUTEX.lock().expect("env mutex");
            temp_env::with_vars([("API_ML_MODEL_NAMES", None::<&str>)], || {
                Config::from_env().expect("config loads")
            })
        };
        let registry = ComponentRegistry::build(config).expect("registry builds");
        let state = AppState::new(registry);

        assert!(state.batch().engine().ml().is_none());
        let single = state.single();
        let mut guard = single.lock().expect("single pipeline");
        let mut patient =
            crate::data::Patient::new("p1", vec![crate::data::Note::new("Assessment: DVT found.")]);
        guard.process(&mut patient, None).expect("processes");
        assert!(patient.notes[0].preprocessed_text.is_some());
    }

    #[test]
    fn baseline_settings_enable_the_full_text_pipeline() {
        let settings = baseline_settings();
        assert!(settings.encoding_fixer.is_some());
        assert!(settings.joiner.is_some());
        assert!(settings.ml_inference.is_none());
        assert_eq!(
            settings.duplicate_checker.expect("present").length_threshold,
            Some(50)
        );
    }
}
