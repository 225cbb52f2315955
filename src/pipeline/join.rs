//! Assembly of `preprocessed_text` from important sentences.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, JoinerOverride, JoinerSettings};

const STAGE: &str = "joiner";

/// Joins the important sentences of each important section with the
/// sentence delimiter, then joins the non-empty section strings with the
/// section delimiter. `expanded_indices` is deliberately not consumed here;
/// it is carried for downstream consumers.
#[derive(Debug, Clone)]
pub struct Joiner {
    sentence_delimiter: Option<String>,
    section_delimiter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub sentence_delimiter: String,
    pub section_delimiter: String,
}

impl Joiner {
    pub fn new(settings: &JoinerSettings) -> Self {
        Self {
            sentence_delimiter: Some(
                settings
                    .sentence_delimiter
                    .clone()
                    .unwrap_or_else(|| "\n".to_string()),
            ),
            section_delimiter: Some(
                settings
                    .section_delimiter
                    .clone()
                    .unwrap_or_else(|| "\n\n".to_string()),
            ),
        }
    }

    pub fn resolve(&self, overrides: Option<&JoinerOverride>) -> Result<JoinParams, EngineError> {
        let sentence_delimiter = settings::required(
            STAGE,
            "sentence_delimiter",
            overrides.and_then(|o| o.sentence_delimiter.as_ref()),
            self.sentence_delimiter.as_ref(),
        )?;
        let section_delimiter = settings::required(
            STAGE,
            "section_delimiter",
            overrides.and_then(|o| o.section_delimiter.as_ref()),
            self.section_delimiter.as_ref(),
        )?;
        Ok(JoinParams {
            sentence_delimiter,
            section_delimiter,
        })
    }

    pub fn process(note: &mut Note, params: &JoinParams) {
        let mut joined_sections = Vec::new();

        for section in &note.sections {
            if !section.is_important {
                continue;
            }

            let sentences: Vec<&str> = section
                .important_indices
                .iter()
                .filter_map(|&idx| section.sentences.get(idx))
                .map(|sentence| sentence.text.as_str())
                .collect();

            if !sentences.is_empty() {
                joined_sections.push(sentences.join(&params.sentence_delimiter));
            }
        }

        note.preprocessed_text = Some(joined_sections.join(&params.section_delimiter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Section, Sentence};

    fn params() -> JoinParams {
        JoinParams {
            sentence_delimiter: "\n".to_string(),
            section_delimiter: "\n\n".to_string(),
        }
    }

    fn section_with(texts: &[&str], important: &[usize], is_important: bool) -> Section {
        let mut section = Section::new("section", 0, 100);
        for (i, text) in texts.iter().enumerate() {
            section
                .sentences
                .push(Sentence::new(*text, i * 10, i * 10 + text.len()));
        }
        section.important_indices = important.to_vec();
        section.is_important = is_important;
        section
    }

    #[test]
    fn joins_important_sentences_within_important_sections() {
        let mut note = Note::new("note");
        note.sections
            .push(section_with(&["First.", "Skip.", "Third."], &[0, 2], true));
        note.sections
            .push(section_with(&["Other section."], &[0], true));

        Joiner::process(&mut note, &params());
        assert_eq!(
            note.preprocessed_text.as_deref(),
            Some("First.\nThird.\n\nOther section.")
        );
    }

    #[test]
    fn unimportant_sections_are_skipped() {
        let mut note = Note::new("note");
        note.sections
            .push(section_with(&["Hidden."], &[0], false));
        note.sections.push(section_with(&["Seen."], &[0], true));

        Joiner::process(&mut note, &params());
        assert_eq!(note.preprocessed_text.as_deref(), Some("Seen."));
    }

    #[test]
    fn important_section_without_important_sentences_contributes_nothing() {
        let mut note = Note::new("note");
        note.sections.push(section_with(&["A.", "B."], &[], true));

        Joiner::process(&mut note, &params());
        assert_eq!(note.preprocessed_text.as_deref(), Some(""));
    }

    #[test]
    fn expanded_indices_are_not_consumed() {
        let mut note = Note::new("note");
        let mut section = section_with(&["Short.", "Context one.", "Context two."], &[0], true);
        section.expanded_indices = vec![0, 1, 2];
        note.sections.push(section);

        Joiner::process(&mut note, &params());
        assert_eq!(note.preprocessed_text.as_deref(), Some("Short."));
    }

    #[test]
    fn custom_delimiters_resolve_from_overrides() {
        let joiner = Joiner::new(&JoinerSettings {
            status: crate::pipeline::settings::StageStatus::Enabled,
            sentence_delimiter: None,
            section_delimiter: None,
        });
        let overrides = JoinerOverride {
            sentence_delimiter: Some(" | ".to_string()),
            ..JoinerOverride::default()
        };
        let resolved = joiner.resolve(Some(&overrides)).expect("resolves");
        assert_eq!(resolved.sentence_delimiter, " | ");
        assert_eq!(resolved.section_delimiter, "\n\n");
    }
}
