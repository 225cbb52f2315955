//! Stage settings, per-call overrides, and effective-parameter resolution.
//!
//! Construction settings (`PipelineSettings`) decide which stages exist and
//! carry their instance defaults. Per-call overrides (`Overrides`) may supply
//! alternative parameters and may flip a stage between `enabled` and
//! `disabled`; they cannot resurrect an `excluded` stage. Every parameter
//! resolves as `provided ?? instance_default`, and a required parameter that
//! resolves to nothing is a [`EngineError::MissingParameter`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Three-valued stage status.
///
/// `Excluded` prevents instantiation entirely (no resource cost); `Disabled`
/// keeps the instance but skips execution. The two are deliberately not
/// collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Enabled,
    Disabled,
    Excluded,
}

/// Classifier model specification, immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub device: Option<String>,
    pub model_path: String,
    pub tokenizer_path: String,
    pub max_length: usize,
}

/// Construction-time settings for the whole pipeline.
///
/// A stage that is absent, or present with status `excluded`, is never
/// instantiated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub encoding_fixer: Option<EncodingFixerSettings>,
    pub pattern_replacer: Option<PatternReplacerSettings>,
    pub word_masker: Option<WordMaskerSettings>,
    pub note_filter: Option<NoteFilterSettings>,
    pub section_splitter: Option<SectionSplitterSettings>,
    pub section_filter: Option<SectionFilterSettings>,
    pub sentence_segmenter: Option<SentenceSegmenterSettings>,
    pub duplicate_checker: Option<DuplicateCheckerSettings>,
    pub sentence_filter: Option<SentenceFilterSettings>,
    pub sentence_expander: Option<SentenceExpanderSettings>,
    pub joiner: Option<JoinerSettings>,
    pub ml_inference: Option<MlInferenceSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingFixerSettings {
    pub status: StageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReplacerSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordMaskerSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub words_to_mask: Option<Vec<String>>,
    #[serde(default)]
    pub mask_char: Option<char>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteFilterSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSplitterSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionFilterSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub section_inc_list: Option<Vec<String>>,
    #[serde(default)]
    pub section_exc_list: Option<Vec<String>>,
    #[serde(default)]
    pub fallback: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceSegmenterSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheckerSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub num_perm: Option<usize>,
    #[serde(default)]
    pub sim_threshold: Option<f64>,
    #[serde(default)]
    pub length_threshold: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceFilterSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceExpanderSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub length_threshold: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinerSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub sentence_delimiter: Option<String>,
    #[serde(default)]
    pub section_delimiter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlInferenceSettings {
    pub status: StageStatus,
    #[serde(default)]
    pub models: Option<BTreeMap<String, ModelSpec>>,
    #[serde(default)]
    pub use_preped_text: Option<bool>,
}

/// Per-call configuration overrides, one optional block per component.
///
/// Unknown component names are rejected at deserialization time. Fields that
/// only make sense at construction (`models`, `model_name` for the
/// segmenter) are accepted for schema compatibility and ignored at call
/// time, matching the original engine's behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Overrides {
    pub encoding_fixer: Option<EncodingFixerOverride>,
    pub pattern_replacer: Option<PatternReplacerOverride>,
    pub word_masker: Option<WordMaskerOverride>,
    pub note_filter: Option<NoteFilterOverride>,
    pub section_splitter: Option<SectionSplitterOverride>,
    pub section_filter: Option<SectionFilterOverride>,
    pub sentence_segmenter: Option<SentenceSegmenterOverride>,
    pub duplicate_checker: Option<DuplicateCheckerOverride>,
    pub sentence_filter: Option<SentenceFilterOverride>,
    pub sentence_expander: Option<SentenceExpanderOverride>,
    pub joiner: Option<JoinerOverride>,
    pub ml_inference: Option<MlInferenceOverride>,
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingFixerOverride {
    pub status: Option<StageStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternReplacerOverride {
    pub status: Option<StageStatus>,
    pub pattern: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WordMaskerOverride {
    pub status: Option<StageStatus>,
    pub words_to_mask: Option<Vec<String>>,
    pub mask_char: Option<char>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoteFilterOverride {
    pub status: Option<StageStatus>,
    pub words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionSplitterOverride {
    pub status: Option<StageStatus>,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionFilterOverride {
    pub status: Option<StageStatus>,
    pub section_inc_list: Option<Vec<String>>,
    pub section_exc_list: Option<Vec<String>>,
    pub fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentenceSegmenterOverride {
    pub status: Option<StageStatus>,
    pub model_name: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuplicateCheckerOverride {
    pub status: Option<StageStatus>,
    pub num_perm: Option<usize>,
    pub sim_threshold: Option<f64>,
    pub length_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentenceFilterOverride {
    pub status: Option<StageStatus>,
    pub words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentenceExpanderOverride {
    pub status: Option<StageStatus>,
    pub length_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JoinerOverride {
    pub status: Option<StageStatus>,
    pub sentence_delimiter: Option<String>,
    pub section_delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MlInferenceOverride {
    pub status: Option<StageStatus>,
    pub models: Option<BTreeMap<String, ModelSpec>>,
    pub use_preped_text: Option<bool>,
    pub model_name: Option<String>,
}

/// `provided ?? instance_default ?? error`.
pub(crate) fn required<T: Clone>(
    stage: &'static str,
    param: &'static str,
    provided: Option<&T>,
    instance: Option<&T>,
) -> Result<T, EngineError> {
    provided
        .or(instance)
        .cloned()
        .ok_or_else(|| EngineError::missing(stage, param))
}

/// `provided ?? instance_default`, absence allowed.
pub(crate) fn optional<T: Clone>(provided: Option<&T>, instance: Option<&T>) -> Option<T> {
    provided.or(instance).cloned()
}
