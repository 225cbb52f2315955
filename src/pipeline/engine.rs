//! Stage instantiation and per-invocation override resolution.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::dedup::{DedupParams, DuplicateChecker};
use crate::pipeline::encoding::EncodingFixer;
use crate::pipeline::expand::{ExpandParams, SentenceExpander};
use crate::pipeline::join::{JoinParams, Joiner};
use crate::pipeline::mask::{MaskParams, WordMasker};
use crate::pipeline::ml::{ClassifierLoader, MlInference, MlParams};
use crate::pipeline::note_filter::{Flow, NoteFilter, NoteFilterParams};
use crate::pipeline::replace::{PatternReplacer, ReplaceParams};
use crate::pipeline::section_filter::{SectionFilter, SectionFilterParams};
use crate::pipeline::section_split::{SectionSplitter, SplitParams};
use crate::pipeline::segment::{SegmentParams, SentenceSegmenter};
use crate::pipeline::sentence_filter::{SentenceFilter, SentenceFilterParams};
use crate::pipeline::settings::{Overrides, PipelineSettings, StageStatus};

/// An instantiated stage together with its construction-time status.
#[derive(Debug, Clone)]
struct Slot<T> {
    stage: T,
    status: StageStatus,
}

fn slot<T>(stage: T, status: StageStatus) -> Option<Slot<T>> {
    match status {
        StageStatus::Excluded => None,
        status => Some(Slot { stage, status }),
    }
}

/// The fixed-order composition of the twelve stages.
///
/// A stage configured as `excluded` (or absent from the settings) is never
/// instantiated and cannot be resurrected by a per-call override; a
/// `disabled` stage is instantiated but skipped until an override enables
/// it.
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    encoding_fixer: Option<Slot<EncodingFixer>>,
    pattern_replacer: Option<Slot<PatternReplacer>>,
    word_masker: Option<Slot<WordMasker>>,
    note_filter: Option<Slot<NoteFilter>>,
    section_splitter: Option<Slot<SectionSplitter>>,
    section_filter: Option<Slot<SectionFilter>>,
    sentence_segmenter: Option<Slot<SentenceSegmenter>>,
    duplicate_checker: Option<Slot<DuplicateChecker>>,
    sentence_filter: Option<Slot<SentenceFilter>>,
    sentence_expander: Option<Slot<SentenceExpander>>,
    joiner: Option<Slot<Joiner>>,
    ml_inference: Option<Slot<MlInference>>,
}

/// Effective per-invocation execution plan: one entry per stage that is
/// instantiated and enabled after override resolution, carrying fully
/// resolved parameters.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub encoding_fixer: bool,
    pub pattern_replacer: Option<ReplaceParams>,
    pub word_masker: Option<MaskParams>,
    pub note_filter: Option<NoteFilterParams>,
    pub section_splitter: Option<SplitParams>,
    pub section_filter: Option<SectionFilterParams>,
    pub sentence_segmenter: Option<SegmentParams>,
    pub duplicate_checker: Option<DedupParams>,
    pub sentence_filter: Option<SentenceFilterParams>,
    pub sentence_expander: Option<ExpandParams>,
    pub joiner: Option<JoinParams>,
    pub ml_inference: Option<MlParams>,
}

impl PipelineEngine {
    pub fn new(settings: &PipelineSettings) -> Result<Self, EngineError> {
        Self::build(settings, None)
    }

    /// Construct with an injected classifier loader (tests, alternative
    /// runtimes).
    pub fn with_classifier_loader(
        settings: &PipelineSettings,
        loader: ClassifierLoader,
    ) -> Result<Self, EngineError> {
        Self::build(settings, Some(loader))
    }

    fn build(
        settings: &PipelineSettings,
        ml_loader: Option<ClassifierLoader>,
    ) -> Result<Self, EngineError> {
        let ml_inference = match &settings.ml_inference {
            Some(s) if s.status != StageStatus::Excluded => {
                let inference = match &ml_loader {
                    Some(loader) => MlInference::with_loader(s, loader.clone())?,
                    None => MlInference::new(s)?,
                };
                slot(inference, s.status)
            }
            _ => None,
        };

        let sentence_segmenter = match &settings.sentence_segmenter {
            Some(s) if s.status != StageStatus::Excluded => {
                slot(SentenceSegmenter::new(s)?, s.status)
            }
            _ => None,
        };

        Ok(Self {
            encoding_fixer: settings
                .encoding_fixer
                .as_ref()
                .and_then(|s| slot(EncodingFixer, s.status)),
            pattern_replacer: settings
                .pattern_replacer
                .as_ref()
                .and_then(|s| slot(PatternReplacer::new(s), s.status)),
            word_masker: settings
                .word_masker
                .as_ref()
                .and_then(|s| slot(WordMasker::new(s), s.status)),
            note_filter: settings
                .note_filter
                .as_ref()
                .and_then(|s| slot(NoteFilter::new(s), s.status)),
            section_splitter: settings
                .section_splitter
                .as_ref()
                .and_then(|s| slot(SectionSplitter::new(s), s.status)),
            section_filter: settings
                .section_filter
                .as_ref()
                .and_then(|s| slot(SectionFilter::new(s), s.status)),
            sentence_segmenter,
            duplicate_checker: settings
                .duplicate_checker
                .as_ref()
                .and_then(|s| slot(DuplicateChecker::new(s), s.status)),
            sentence_filter: settings
                .sentence_filter
                .as_ref()
                .and_then(|s| slot(SentenceFilter::new(s), s.status)),
            sentence_expander: settings
                .sentence_expander
                .as_ref()
                .and_then(|s| slot(SentenceExpander::new(s), s.status)),
            joiner: settings
                .joiner
                .as_ref()
                .and_then(|s| slot(Joiner::new(s), s.status)),
            ml_inference,
        })
    }

    /// Resolve per-call overrides into an execution plan. An override may
    /// flip an instantiated stage between enabled and disabled; overrides
    /// for excluded stages are ignored.
    pub fn resolve(&self, overrides: Option<&Overrides>) -> Result<ExecutionPlan, EngineError> {
        let ov = overrides;
        let mut plan = ExecutionPlan::default();

        if let Some(s) = &self.encoding_fixer {
            let status = ov
                .and_then(|o| o.encoding_fixer.as_ref())
                .and_then(|o| o.status)
                .unwrap_or(s.status);
            plan.encoding_fixer = status == StageStatus::Enabled;
        }
        if let Some(s) = &self.pattern_replacer {
            let stage_ov = ov.and_then(|o| o.pattern_replacer.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.pattern_replacer = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.word_masker {
            let stage_ov = ov.and_then(|o| o.word_masker.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.word_masker = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.note_filter {
            let stage_ov = ov.and_then(|o| o.note_filter.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.note_filter = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.section_splitter {
            let stage_ov = ov.and_then(|o| o.section_splitter.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.section_splitter = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.section_filter {
            let stage_ov = ov.and_then(|o| o.section_filter.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.section_filter = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.sentence_segmenter {
            let stage_ov = ov.and_then(|o| o.sentence_segmenter.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.sentence_segmenter = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.duplicate_checker {
            let stage_ov = ov.and_then(|o| o.duplicate_checker.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.duplicate_checker = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.sentence_filter {
            let stage_ov = ov.and_then(|o| o.sentence_filter.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.sentence_filter = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.sentence_expander {
            let stage_ov = ov.and_then(|o| o.sentence_expander.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.sentence_expander = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.joiner {
            let stage_ov = ov.and_then(|o| o.joiner.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.joiner = Some(s.stage.resolve(stage_ov)?);
            }
        }
        if let Some(s) = &self.ml_inference {
            let stage_ov = ov.and_then(|o| o.ml_inference.as_ref());
            if enabled(stage_ov.and_then(|o| o.status), s.status) {
                plan.ml_inference = Some(s.stage.resolve(stage_ov)?);
            }
        }

        Ok(plan)
    }

    /// Stages 1–6: text normalization, filtering, and section derivation.
    pub(crate) fn run_phase_a(
        &self,
        note: &mut Note,
        plan: &ExecutionPlan,
    ) -> Result<Flow, EngineError> {
        if plan.encoding_fixer {
            EncodingFixer::process(note);
        }
        if let Some(params) = &plan.pattern_replacer {
            PatternReplacer::process(note, params)?;
        }
        if let Some(params) = &plan.word_masker {
            WordMasker::process(note, params)?;
        }
        if let Some(params) = &plan.note_filter {
            if NoteFilter::process(note, params)? == Flow::Drop {
                note.preprocessed_text = Some(String::new());
                return Ok(Flow::Drop);
            }
        }
        if let Some(params) = &plan.section_splitter {
            SectionSplitter::process(note, params);
        }
        if let Some(params) = &plan.section_filter {
            SectionFilter::process(note, params)?;
        }
        Ok(Flow::Continue)
    }

    /// Stage 7 for one note (single-patient mode).
    pub(crate) fn segment_note(
        &self,
        note: &mut Note,
        plan: &ExecutionPlan,
    ) -> Result<(), EngineError> {
        if let (Some(params), Some(s)) = (&plan.sentence_segmenter, &self.sentence_segmenter) {
            s.stage.process(note, params)?;
        }
        Ok(())
    }

    /// Stages 8–11: duplicate marking, sentence selection, joining. The
    /// duplicate checker is passed in because its index is invocation
    /// state: the single pipeline lends its own, batch workers bring fresh
    /// ones.
    pub(crate) fn run_phase_c(
        note: &mut Note,
        plan: &ExecutionPlan,
        checker: Option<&mut DuplicateChecker>,
    ) -> Result<(), EngineError> {
        if let (Some(params), Some(checker)) = (&plan.duplicate_checker, checker) {
            checker.process(note, params);
        }
        if let Some(params) = &plan.sentence_filter {
            SentenceFilter::process(note, params)?;
        }
        if let Some(params) = &plan.sentence_expander {
            SentenceExpander::process(note, params);
        }
        if let Some(params) = &plan.joiner {
            Joiner::process(note, params);
        }
        Ok(())
    }

    /// All twelve stages over one note, in order (single-patient mode).
    pub(crate) fn run_note(
        &mut self,
        note: &mut Note,
        plan: &ExecutionPlan,
    ) -> Result<(), EngineError> {
        if self.run_phase_a(note, plan)? == Flow::Drop {
            return Ok(());
        }
        self.segment_note(note, plan)?;
        let checker = self
            .duplicate_checker
            .as_mut()
            .map(|slot| &mut slot.stage);
        Self::run_phase_c(note, plan, checker)?;
        if let (Some(params), Some(s)) = (&plan.ml_inference, &self.ml_inference) {
            s.stage.process(note, params)?;
        }
        Ok(())
    }

    pub(crate) fn reset_duplicate_checker(&mut self, params: &DedupParams) {
        if let Some(s) = &mut self.duplicate_checker {
            s.stage.reset(params);
        }
    }

    pub(crate) fn segmenter(&self) -> Option<&SentenceSegmenter> {
        self.sentence_segmenter.as_ref().map(|s| &s.stage)
    }

    pub fn ml(&self) -> Option<&MlInference> {
        self.ml_inference.as_ref().map(|s| &s.stage)
    }
}

fn enabled(status_override: Option<StageStatus>, instance_status: StageStatus) -> bool {
    status_override.unwrap_or(instance_status) == StageStatus::Enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::settings::{
        DuplicateCheckerOverride, DuplicateCheckerSettings, NoteFilterOverride, NoteFilterSettings,
        SectionSplitterSettings,
    };

    fn minimal_settings() -> PipelineSettings {
        PipelineSettings {
            section_splitter: Some(SectionSplitterSettings {
                status: StageStatus::Enabled,
                delimiter: None,
            }),
            duplicate_checker: Some(DuplicateCheckerSettings {
                status: StageStatus::Excluded,
                num_perm: None,
                sim_threshold: None,
                length_threshold: Some(50),
            }),
            note_filter: Some(NoteFilterSettings {
                status: StageStatus::Disabled,
                words_to_search: Some(vec!["DVT".to_string()]),
            }),
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn excluded_stages_are_not_instantiated() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        assert!(engine.duplicate_checker.is_none());
        // Absent from settings entirely behaves the same way.
        assert!(engine.joiner.is_none());
    }

    #[test]
    fn disabled_stages_are_instantiated_but_not_planned() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        assert!(engine.note_filter.is_some());
        let plan = engine.resolve(None).expect("resolves");
        assert!(plan.note_filter.is_none());
        assert!(plan.section_splitter.is_some());
    }

    #[test]
    fn override_enables_a_disabled_stage() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        let overrides = Overrides {
            note_filter: Some(NoteFilterOverride {
                status: Some(StageStatus::Enabled),
                words_to_search: None,
            }),
            ..Overrides::default()
        };
        let plan = engine.resolve(Some(&overrides)).expect("resolves");
        let params = plan.note_filter.expect("planned");
        assert_eq!(params.words_to_search, vec!["DVT".to_string()]);
    }

    #[test]
    fn override_disables_an_enabled_stage() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        let overrides = Overrides {
            section_splitter: Some(crate::pipeline::settings::SectionSplitterOverride {
                status: Some(StageStatus::Disabled),
                delimiter: None,
            }),
            ..Overrides::default()
        };
        let plan = engine.resolve(Some(&overrides)).expect("resolves");
        assert!(plan.section_splitter.is_none());
    }

    #[test]
    fn override_cannot_resurrect_an_excluded_stage() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        let overrides = Overrides {
            duplicate_checker: Some(DuplicateCheckerOverride {
                status: Some(StageStatus::Enabled),
                ..DuplicateCheckerOverride::default()
            }),
            ..Overrides::default()
        };
        let plan = engine.resolve(Some(&overrides)).expect("resolves");
        assert!(plan.duplicate_checker.is_none());
    }

    #[test]
    fn missing_required_parameter_fails_resolution() {
        let settings = PipelineSettings {
            note_filter: Some(NoteFilterSettings {
                status: StageStatus::Enabled,
                words_to_search: None,
            }),
            ..PipelineSettings::default()
        };
        let engine = PipelineEngine::new(&settings).expect("builds");
        let error = engine.resolve(None).expect_err("must fail");
        assert!(error.to_string().contains("A value must be provided."));
    }

    #[test]
    fn call_time_parameters_do_not_mutate_instance_defaults() {
        let engine = PipelineEngine::new(&minimal_settings()).expect("builds");
        let overrides = Overrides {
            section_splitter: Some(crate::pipeline::settings::SectionSplitterOverride {
                status: None,
                delimiter: Some("----".to_string()),
            }),
            ..Overrides::default()
        };
        let with_override = engine.resolve(Some(&overrides)).expect("resolves");
        assert_eq!(
            with_override.section_splitter.expect("planned").delimiter,
            "----"
        );

        let without = engine.resolve(None).expect("resolves");
        assert_eq!(without.section_splitter.expect("planned").delimiter, "\n\n");
    }
}
