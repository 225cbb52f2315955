//! Keyword flagging of important sentences.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, SentenceFilterOverride, SentenceFilterSettings};
use crate::util::matchers::keyword_matcher;

const STAGE: &str = "sentence_filter";

/// Marks non-duplicate sentences containing any listed whole-word term as
/// important and records their section-local indices in ascending order.
#[derive(Debug, Clone)]
pub struct SentenceFilter {
    words_to_search: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceFilterParams {
    pub words_to_search: Vec<String>,
}

impl SentenceFilter {
    pub fn new(settings: &SentenceFilterSettings) -> Self {
        Self {
            words_to_search: settings.words_to_search.clone(),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&SentenceFilterOverride>,
    ) -> Result<SentenceFilterParams, EngineError> {
        let words_to_search = settings::required(
            STAGE,
            "words_to_search",
            overrides.and_then(|o| o.words_to_search.as_ref()),
            self.words_to_search.as_ref(),
        )?;
        Ok(SentenceFilterParams { words_to_search })
    }

    pub fn process(note: &mut Note, params: &SentenceFilterParams) -> Result<(), EngineError> {
        let matcher = keyword_matcher(&params.words_to_search, "sentence_filter")?;

        for section in &mut note.sections {
            let mut important_indices = Vec::new();

            for (idx, sentence) in section.sentences.iter_mut().enumerate() {
                if sentence.is_duplicate {
                    continue;
                }
                if matcher.is_match(&sentence.text) {
                    sentence.is_important = true;
                    important_indices.push(idx);
                }
            }

            section.important_indices = important_indices;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Section, Sentence};

    fn note(texts: &[&str]) -> Note {
        let mut note = Note::new("note");
        let mut section = Section::new("section", 0, 200);
        let mut start = 0;
        for text in texts {
            section
                .sentences
                .push(Sentence::new(*text, start, start + text.len()));
            start += text.len() + 1;
        }
        note.sections.push(section);
        note
    }

    fn params() -> SentenceFilterParams {
        SentenceFilterParams {
            words_to_search: vec!["DVT".to_string(), "PE".to_string()],
        }
    }

    #[test]
    fn matching_sentences_are_marked_in_ascending_order() {
        let mut n = note(&[
            "No acute findings.",
            "DVT ruled out by ultrasound.",
            "Plan discussed.",
            "History of PE noted.",
        ]);
        SentenceFilter::process(&mut n, &params()).expect("filters");
        let section = &n.sections[0];
        assert_eq!(section.important_indices, vec![1, 3]);
        assert!(section.sentences[1].is_important);
        assert!(section.sentences[3].is_important);
        assert!(!section.sentences[0].is_important);
    }

    #[test]
    fn duplicate_sentences_are_skipped() {
        let mut n = note(&["DVT confirmed today.", "DVT confirmed today."]);
        n.sections[0].sentences[1].is_duplicate = true;
        SentenceFilter::process(&mut n, &params()).expect("filters");
        let section = &n.sections[0];
        assert_eq!(section.important_indices, vec![0]);
        assert!(!section.sentences[1].is_important);
    }

    #[test]
    fn embedded_terms_do_not_match() {
        let mut n = note(&["The word SPECIMEN embeds the term without matching."]);
        SentenceFilter::process(&mut n, &params()).expect("filters");
        assert!(n.sections[0].important_indices.is_empty());
    }
}
