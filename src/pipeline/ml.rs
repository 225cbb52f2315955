//! Transformer text classification over preprocessed notes.
//!
//! The classification runtime is an external capability behind the
//! [`TextClassifier`] trait. Loaded models live in a process-global cache
//! keyed by `(model_name, model_path)` behind one mutex, so constructing a
//! second engine with the same roster reuses the already loaded pipelines
//! and concurrent first-touches coalesce. Entries are immutable after
//! insertion.
//!
//! The concrete rust-bert sequence-classification backend compiles in behind
//! the `with-bert` cargo feature; deployments without it must install a
//! loader via [`MlInference::with_loader`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::data::{Note, Patient};
use crate::error::EngineError;
use crate::pipeline::settings::{self, MlInferenceOverride, MlInferenceSettings, ModelSpec};

const STAGE: &str = "ml_inference";

/// A classification result: the single best class and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// External text classification capability.
pub trait TextClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Prediction, EngineError>;

    /// Classify many texts. The default implementation maps over
    /// [`TextClassifier::classify`]; batching backends override it.
    fn classify_batch(&self, texts: &[String]) -> Result<Vec<Prediction>, EngineError> {
        texts.iter().map(|text| self.classify(text)).collect()
    }
}

/// Loads a classifier for a model spec on a resolved device.
pub type ClassifierLoader =
    Arc<dyn Fn(&str, &ModelSpec, Device) -> Result<Arc<dyn TextClassifier>, EngineError> + Send + Sync>;

/// Inference device, parsed from `cpu | mps | cuda | cuda:K`.
///
/// Unrecognized specs fall back to the CPU; only a malformed CUDA ordinal is
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Mps,
    Cuda(usize),
}

impl Device {
    pub fn parse(spec: Option<&str>) -> Result<Self, EngineError> {
        let normalized = spec.unwrap_or("cpu").to_lowercase();
        if let Some(rest) = normalized.strip_prefix("cuda") {
            if let Some(ordinal) = rest.strip_prefix(':') {
                let index = ordinal
                    .parse::<usize>()
                    .map_err(|_| EngineError::InvalidConfiguration {
                        stage: STAGE,
                        message: format!("invalid CUDA device ordinal in {normalized:?}"),
                    })?;
                return Ok(Self::Cuda(index));
            }
            return Ok(Self::Cuda(0));
        }
        if normalized == "mps" {
            return Ok(Self::Mps);
        }
        Ok(Self::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Mps => write!(f, "mps"),
            Self::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// Metadata recorded when a model is first loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMeta {
    pub name: String,
    pub device: String,
    pub max_length: usize,
    pub loaded_at: String,
}

struct ModelCache {
    pipelines: FxHashMap<(String, String), Arc<dyn TextClassifier>>,
    meta: BTreeMap<String, ModelMeta>,
}

static MODEL_CACHE: Lazy<Mutex<ModelCache>> = Lazy::new(|| {
    Mutex::new(ModelCache {
        pipelines: FxHashMap::default(),
        meta: BTreeMap::new(),
    })
});

#[derive(Clone)]
pub struct MlInference {
    models: BTreeMap<String, ModelSpec>,
    default_name: String,
    use_preped_text: Option<bool>,
    loader: ClassifierLoader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlParams {
    pub use_preped_text: bool,
    pub model_name: Option<String>,
}

impl MlInference {
    /// Construct with the built-in backend and eagerly load every model in
    /// the roster.
    pub fn new(ml_settings: &MlInferenceSettings) -> Result<Self, EngineError> {
        Self::with_loader(ml_settings, default_loader())
    }

    /// Construct with an injected classifier loader (tests, alternative
    /// runtimes) and eagerly load every model in the roster.
    pub fn with_loader(
        ml_settings: &MlInferenceSettings,
        loader: ClassifierLoader,
    ) -> Result<Self, EngineError> {
        let models = ml_settings
            .models
            .clone()
            .filter(|models| !models.is_empty())
            .ok_or_else(|| EngineError::missing(STAGE, "models"))?;
        let default_name = models
            .keys()
            .next()
            .expect("roster is non-empty")
            .clone();

        let inference = Self {
            models,
            default_name,
            use_preped_text: Some(ml_settings.use_preped_text.unwrap_or(true)),
            loader,
        };
        for name in inference.models.keys() {
            inference.get_or_load(name)?;
        }
        Ok(inference)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn roster(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Metadata of every model loaded in this process, sorted by name.
    pub fn loaded_models() -> Vec<ModelMeta> {
        let cache = MODEL_CACHE.lock().expect("model cache poisoned");
        cache.meta.values().cloned().collect()
    }

    pub fn resolve(
        &self,
        overrides: Option<&MlInferenceOverride>,
    ) -> Result<MlParams, EngineError> {
        let use_preped_text = settings::required(
            STAGE,
            "use_preped_text",
            overrides.and_then(|o| o.use_preped_text.as_ref()),
            self.use_preped_text.as_ref(),
        )?;
        let model_name = overrides.and_then(|o| o.model_name.clone());
        Ok(MlParams {
            use_preped_text,
            model_name,
        })
    }

    fn get_or_load(&self, name: &str) -> Result<Arc<dyn TextClassifier>, EngineError> {
        let spec = self
            .models
            .get(name)
            .ok_or_else(|| EngineError::UnknownModel {
                requested: name.to_string(),
                available: self.roster(),
            })?;
        let key = (name.to_string(), spec.model_path.clone());

        let mut cache = MODEL_CACHE.lock().expect("model cache poisoned");
        if let Some(existing) = cache.pipelines.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let device = Device::parse(spec.device.as_deref())?;
        let classifier = (self.loader)(name, spec, device)?;
        cache.pipelines.insert(key, Arc::clone(&classifier));
        cache.meta.insert(
            name.to_string(),
            ModelMeta {
                name: name.to_string(),
                device: device.to_string(),
                max_length: spec.max_length,
                loaded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        );
        Ok(classifier)
    }

    fn classifier_for(&self, model_name: Option<&str>) -> Result<Arc<dyn TextClassifier>, EngineError> {
        self.get_or_load(model_name.unwrap_or(&self.default_name))
    }

    /// Classify one note; empty input text leaves the note untouched.
    pub fn process(&self, note: &mut Note, params: &MlParams) -> Result<(), EngineError> {
        let text = inference_text(note, params.use_preped_text);
        if text.is_empty() {
            return Ok(());
        }
        let classifier = self.classifier_for(params.model_name.as_deref())?;
        let prediction = classifier.classify(&text)?;
        note.predicted_label = Some(prediction.label);
        note.predicted_score = Some(round_two(prediction.score));
        Ok(())
    }

    /// Classify every non-empty note text across all patients in one batch
    /// call, scattering results back by position.
    pub fn process_batch(
        &self,
        patients: &mut [Patient],
        params: &MlParams,
    ) -> Result<(), EngineError> {
        let mut positions = Vec::new();
        let mut texts = Vec::new();
        for (patient_idx, patient) in patients.iter().enumerate() {
            for (note_idx, note) in patient.notes.iter().enumerate() {
                let text = inference_text(note, params.use_preped_text);
                if !text.is_empty() {
                    positions.push((patient_idx, note_idx));
                    texts.push(text);
                }
            }
        }
        if texts.is_empty() {
            return Ok(());
        }

        let classifier = self.classifier_for(params.model_name.as_deref())?;
        let predictions = classifier.classify_batch(&texts)?;
        if predictions.len() != positions.len() {
            return Err(EngineError::Inference(format!(
                "backend returned {} predictions for {} inputs",
                predictions.len(),
                positions.len()
            )));
        }

        for ((patient_idx, note_idx), prediction) in positions.into_iter().zip(predictions) {
            let note = &mut patients[patient_idx].notes[note_idx];
            note.predicted_label = Some(prediction.label);
            note.predicted_score = Some(round_two(prediction.score));
        }
        Ok(())
    }
}

impl fmt::Debug for MlInference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlInference")
            .field("models", &self.roster())
            .field("default_name", &self.default_name)
            .field("use_preped_text", &self.use_preped_text)
            .finish_non_exhaustive()
    }
}

fn inference_text(note: &Note, use_preped_text: bool) -> String {
    if use_preped_text {
        note.preprocessed_text.clone().unwrap_or_default()
    } else {
        note.text.clone()
    }
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn default_loader() -> ClassifierLoader {
    #[cfg(feature = "with-bert")]
    {
        Arc::new(|name, spec, device| bert::load(name, spec, device))
    }
    #[cfg(not(feature = "with-bert"))]
    {
        Arc::new(|name, _spec, _device| {
            Err(EngineError::ModelLoad {
                name: name.to_string(),
                message: "built without a classifier backend; enable the `with-bert` \
                          feature or install a loader"
                    .to_string(),
            })
        })
    }
}

/// rust-bert sequence classification backend.
#[cfg(feature = "with-bert")]
mod bert {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use rust_bert::pipelines::common::{ModelResource, ModelType};
    use rust_bert::pipelines::sequence_classification::{
        SequenceClassificationConfig, SequenceClassificationModel,
    };
    use rust_bert::resources::LocalResource;

    use super::{Device, Prediction, TextClassifier};
    use crate::error::EngineError;
    use crate::pipeline::settings::ModelSpec;

    /// The tch model is not `Sync`; predictions serialize on a mutex.
    struct BertClassifier {
        model: Mutex<SequenceClassificationModel>,
    }

    impl TextClassifier for BertClassifier {
        fn classify(&self, text: &str) -> Result<Prediction, EngineError> {
            let model = self.model.lock().expect("classifier poisoned");
            let labels = model
                .predict(&[text])
                .pop()
                .ok_or_else(|| EngineError::Inference("empty prediction".to_string()))?;
            Ok(Prediction {
                label: labels.text,
                score: labels.score,
            })
        }

        fn classify_batch(&self, texts: &[String]) -> Result<Vec<Prediction>, EngineError> {
            let model = self.model.lock().expect("classifier poisoned");
            let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
            Ok(model
                .predict(&inputs)
                .into_iter()
                .map(|label| Prediction {
                    label: label.text,
                    score: label.score,
                })
                .collect())
        }
    }

    fn local(path: PathBuf) -> LocalResource {
        LocalResource { local_path: path }
    }

    pub(super) fn load(
        name: &str,
        spec: &ModelSpec,
        device: Device,
    ) -> Result<Arc<dyn TextClassifier>, EngineError> {
        let model_dir = PathBuf::from(&spec.model_path);
        let tokenizer_dir = PathBuf::from(&spec.tokenizer_path);

        let mut config = SequenceClassificationConfig::new(
            ModelType::Bert,
            ModelResource::Torch(Box::new(local(model_dir.join("rust_model.ot")))),
            local(model_dir.join("config.json")),
            local(tokenizer_dir.join("vocab.txt")),
            None::<LocalResource>,
            true,
            None::<bool>,
            None::<bool>,
        );
        config.device = match device {
            Device::Cpu => tch::Device::Cpu,
            Device::Mps => tch::Device::Mps,
            Device::Cuda(index) => tch::Device::Cuda(index),
        };

        let model = SequenceClassificationModel::new(config).map_err(|error| {
            EngineError::ModelLoad {
                name: name.to_string(),
                message: error.to_string(),
            }
        })?;
        Ok(Arc::new(BertClassifier {
            model: Mutex::new(model),
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{settings_with, stub_loader};
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Device::Cpu)]
    #[case(Some("cpu"), Device::Cpu)]
    #[case(Some("CPU"), Device::Cpu)]
    #[case(Some("mps"), Device::Mps)]
    #[case(Some("cuda"), Device::Cuda(0))]
    #[case(Some("cuda:3"), Device::Cuda(3))]
    fn device_grammar(#[case] spec: Option<&str>, #[case] expected: Device) {
        assert_eq!(Device::parse(spec).expect("parses"), expected);
    }

    #[test]
    fn malformed_cuda_ordinal_is_an_error() {
        assert!(Device::parse(Some("cuda:abc")).is_err());
    }

    #[test]
    fn device_renders_the_canonical_string() {
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }

    #[test]
    fn classifies_preprocessed_text_and_rounds_to_two_decimals() {
        let inference = MlInference::with_loader(
            &settings_with("round-model", "/models/round"),
            stub_loader("POSITIVE", 0.987_654),
        )
        .expect("constructs");
        let params = inference.resolve(None).expect("resolves");

        let mut note = Note::new("raw text");
        note.preprocessed_text = Some("preprocessed text".to_string());
        inference.process(&mut note, &params).expect("classifies");

        assert_eq!(note.predicted_label.as_deref(), Some("POSITIVE"));
        assert_eq!(note.predicted_score, Some(0.99));
    }

    #[test]
    fn empty_text_is_skipped() {
        let inference = MlInference::with_loader(
            &settings_with("skip-model", "/models/skip"),
            stub_loader("POSITIVE", 0.9),
        )
        .expect("constructs");
        let params = inference.resolve(None).expect("resolves");

        let mut note = Note::new("raw text");
        note.preprocessed_text = Some(String::new());
        inference.process(&mut note, &params).expect("no-op");
        assert!(note.predicted_label.is_none());
    }

    #[test]
    fn raw_text_is_used_when_use_preped_text_is_false() {
        let inference = MlInference::with_loader(
            &settings_with("raw-model", "/models/raw"),
            stub_loader("NEGATIVE", 0.5),
        )
        .expect("constructs");
        let overrides = MlInferenceOverride {
            use_preped_text: Some(false),
            ..MlInferenceOverride::default()
        };
        let params = inference.resolve(Some(&overrides)).expect("resolves");

        let mut note = Note::new("raw text without preprocessing");
        inference.process(&mut note, &params).expect("classifies");
        assert_eq!(note.predicted_label.as_deref(), Some("NEGATIVE"));
    }

    #[test]
    fn unknown_model_error_names_the_available_set() {
        let inference = MlInference::with_loader(
            &settings_with("known-model", "/models/known"),
            stub_loader("X", 1.0),
        )
        .expect("constructs");
        let params = MlParams {
            use_preped_text: false,
            model_name: Some("missing-model".to_string()),
        };
        let mut note = Note::new("text");
        let error = inference.process(&mut note, &params).expect_err("must fail");
        let rendered = error.to_string();
        assert!(rendered.contains("missing-model"));
        assert!(rendered.contains("known-model"));
    }

    #[test]
    fn empty_roster_is_a_parameter_error() {
        let settings = MlInferenceSettings {
            status: crate::pipeline::settings::StageStatus::Enabled,
            models: Some(BTreeMap::new()),
            use_preped_text: None,
        };
        assert!(MlInference::with_loader(&settings, stub_loader("X", 1.0)).is_err());
    }

    #[test]
    fn cache_reuses_pipelines_and_records_metadata() {
        let first = MlInference::with_loader(
            &settings_with("cached-model", "/models/cached"),
            stub_loader("A", 0.8),
        )
        .expect("constructs");
        // Second construction with the same key must reuse the cached
        // pipeline even though its loader would produce a different label.
        let second = MlInference::with_loader(
            &settings_with("cached-model", "/models/cached"),
            stub_loader("B", 0.2),
        )
        .expect("constructs");

        let params = second.resolve(None).expect("resolves");
        let mut note = Note::new("x");
        note.preprocessed_text = Some("text".to_string());
        second.process(&mut note, &params).expect("classifies");
        assert_eq!(note.predicted_label.as_deref(), Some("A"));
        drop(first);

        let meta = MlInference::loaded_models();
        let entry = meta
            .iter()
            .find(|m| m.name == "cached-model")
            .expect("metadata recorded");
        assert_eq!(entry.device, "cpu");
        assert_eq!(entry.max_length, 128);
        assert!(!entry.loaded_at.is_empty());
    }

    #[test]
    fn batch_classification_scatters_by_position() {
        let inference = MlInference::with_loader(
            &settings_with("batch-model", "/models/batch"),
            stub_loader("LABEL", 0.75),
        )
        .expect("constructs");
        let params = inference.resolve(None).expect("resolves");

        let mut with_text = Note::new("a");
        with_text.preprocessed_text = Some("kept".to_string());
        let mut without_text = Note::new("b");
        without_text.preprocessed_text = Some(String::new());
        let mut patients = vec![
            Patient::new("p1", vec![with_text, without_text]),
            Patient::new("p2", vec![Note::new("c")]),
        ];
        // p2's note has no preprocessed text at all; it is also skipped.
        inference
            .process_batch(&mut patients, &params)
            .expect("classifies");

        assert_eq!(
            patients[0].notes[0].predicted_label.as_deref(),
            Some("LABEL")
        );
        assert_eq!(patients[0].notes[0].predicted_score, Some(0.75));
        assert!(patients[0].notes[1].predicted_label.is_none());
        assert!(patients[1].notes[0].predicted_label.is_none());
    }
}
