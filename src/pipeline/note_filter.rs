//! Keyword gate for whole notes.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, NoteFilterOverride, NoteFilterSettings};
use crate::util::matchers::keyword_matcher;

const STAGE: &str = "note_filter";

/// Outcome of a note-level stage: either the note continues through the
/// remaining stages, or it is dropped and the engine blanks its
/// `preprocessed_text`. A drop is a signal, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Drop,
}

#[derive(Debug, Clone)]
pub struct NoteFilter {
    words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFilterParams {
    pub words_to_search: Vec<String>,
}

impl NoteFilter {
    pub fn new(settings: &NoteFilterSettings) -> Self {
        Self {
            words_to_search: settings.words_to_search.clone(),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&NoteFilterOverride>,
    ) -> Result<NoteFilterParams, EngineError> {
        let words_to_search = settings::required(
            STAGE,
            "words_to_search",
            overrides.and_then(|o| o.words_to_search.as_ref()),
            self.words_to_search.as_ref(),
        )?;
        Ok(NoteFilterParams { words_to_search })
    }

    pub fn process(note: &Note, params: &NoteFilterParams) -> Result<Flow, EngineError> {
        let matcher = keyword_matcher(&params.words_to_search, "note_filter")?;
        if matcher.is_match(&note.text) {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Drop)
        }
    }
}
