//! Sentence segmentation over section texts.
//!
//! The segmentation model is an external capability behind the [`Segmenter`]
//! trait: anything that can turn text into character-span sentences works.
//! The built-in backend performs UAX #29 sentence boundary detection via
//! `unicode-segmentation`; heavier NLP models plug in through
//! [`SentenceSegmenter::with_backend`].

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::data::{Note, Patient, Sentence};
use crate::error::EngineError;
use crate::pipeline::settings::{self, SentenceSegmenterOverride, SentenceSegmenterSettings};

const STAGE: &str = "sentence_segmenter";

pub const DEFAULT_MODEL_NAME: &str = "uax29";
const DEFAULT_BATCH_SIZE: usize = 10;

/// A sentence span, as byte offsets relative to the segmented input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// External sentence segmentation capability.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Result<Vec<Span>, EngineError>;

    /// Segment many inputs, honoring `batch_size` as the unit of work the
    /// backend processes at a time. The default implementation chunks and
    /// delegates to [`Segmenter::segment`].
    fn segment_batch(
        &self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<Span>>, EngineError> {
        let mut spans = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            for text in chunk {
                spans.push(self.segment(text)?);
            }
        }
        Ok(spans)
    }
}

/// UAX #29 sentence boundaries.
#[derive(Debug, Clone, Default)]
pub struct Uax29Segmenter;

impl Segmenter for Uax29Segmenter {
    fn segment(&self, text: &str) -> Result<Vec<Span>, EngineError> {
        Ok(text
            .split_sentence_bound_indices()
            .map(|(offset, sentence)| Span {
                start: offset,
                end: offset + sentence.len(),
            })
            .collect())
    }
}

/// Resolve a segmentation model name to a backend.
pub fn backend_for(model_name: &str) -> Result<Arc<dyn Segmenter>, EngineError> {
    match model_name {
        DEFAULT_MODEL_NAME | "unicode" => Ok(Arc::new(Uax29Segmenter)),
        other => Err(EngineError::InvalidConfiguration {
            stage: STAGE,
            message: format!("unknown segmentation model {other:?}"),
        }),
    }
}

#[derive(Clone)]
pub struct SentenceSegmenter {
    backend: Arc<dyn Segmenter>,
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentParams {
    pub batch_size: usize,
}

impl SentenceSegmenter {
    pub fn new(settings: &SentenceSegmenterSettings) -> Result<Self, EngineError> {
        let model_name = settings
            .model_name
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        Ok(Self {
            backend: backend_for(&model_name)?,
            batch_size: Some(settings.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)),
        })
    }

    /// Install a custom segmentation backend (e.g. an external NLP model).
    pub fn with_backend(backend: Arc<dyn Segmenter>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: Some(batch_size),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&SentenceSegmenterOverride>,
    ) -> Result<SegmentParams, EngineError> {
        let batch_size = settings::required(
            STAGE,
            "batch_size",
            overrides.and_then(|o| o.batch_size.as_ref()),
            self.batch_size.as_ref(),
        )?;
        Ok(SegmentParams { batch_size })
    }

    /// Segment every section of one note in place.
    pub fn process(&self, note: &mut Note, params: &SegmentParams) -> Result<(), EngineError> {
        let texts: Vec<&str> = note.sections.iter().map(|s| s.text.as_str()).collect();
        let spans = self.backend.segment_batch(&texts, params.batch_size)?;
        for (section, section_spans) in note.sections.iter_mut().zip(spans) {
            section.sentences =
                sentences_from_spans(&section.text, &section_spans, section.start_index);
        }
        Ok(())
    }

    /// Segment every section of every note of every patient in a single
    /// backend batch, scattering results back in order.
    pub fn process_batch_patients(
        &self,
        patients: &mut [Patient],
        params: &SegmentParams,
    ) -> Result<(), EngineError> {
        let texts: Vec<String> = patients
            .iter()
            .flat_map(|p| p.notes.iter())
            .flat_map(|n| n.sections.iter())
            .map(|s| s.text.clone())
            .collect();
        let borrowed: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut spans = self
            .backend
            .segment_batch(&borrowed, params.batch_size)?
            .into_iter();

        for patient in patients.iter_mut() {
            for note in &mut patient.notes {
                for section in &mut note.sections {
                    let section_spans = spans.next().ok_or_else(|| {
                        EngineError::Segmentation(
                            "backend returned fewer span lists than inputs".to_string(),
                        )
                    })?;
                    section.sentences =
                        sentences_from_spans(&section.text, &section_spans, section.start_index);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SentenceSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceSegmenter")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Strip each span's text and translate offsets: stripped leading and
/// trailing whitespace shifts the span inward, and the section's start
/// offset makes the result absolute within the note.
fn sentences_from_spans(text: &str, spans: &[Span], section_start: usize) -> Vec<Sentence> {
    let mut sentences = Vec::with_capacity(spans.len());
    for span in spans {
        let raw = &text[span.start..span.end];
        let stripped = raw.trim();
        if stripped.is_empty() {
            continue;
        }
        let leading = raw.len() - raw.trim_start().len();
        let start_index = section_start + span.start + leading;
        sentences.push(Sentence::new(stripped, start_index, start_index + stripped.len()));
    }
    sentences
}
