//! Delimiter split of note text into sections with offset bookkeeping.

use crate::data::{Note, Section};
use crate::error::EngineError;
use crate::pipeline::settings::{self, SectionSplitterOverride, SectionSplitterSettings};

const STAGE: &str = "section_splitter";

/// Splits by a literal delimiter (no regex). Each piece becomes a section
/// whose half-open offsets point into the note text at split time; the
/// running offset advances by the piece length plus the delimiter length.
#[derive(Debug, Clone)]
pub struct SectionSplitter {
    delimiter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitParams {
    pub delimiter: String,
}

impl SectionSplitter {
    pub fn new(settings: &SectionSplitterSettings) -> Self {
        Self {
            delimiter: Some(
                settings
                    .delimiter
                    .clone()
                    .unwrap_or_else(|| "\n\n".to_string()),
            ),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&SectionSplitterOverride>,
    ) -> Result<SplitParams, EngineError> {
        let delimiter = settings::required(
            STAGE,
            "delimiter",
            overrides.and_then(|o| o.delimiter.as_ref()),
            self.delimiter.as_ref(),
        )?;
        Ok(SplitParams { delimiter })
    }

    pub fn process(note: &mut Note, params: &SplitParams) {
        if note.text.trim().is_empty() {
            return;
        }

        let mut sections = Vec::new();
        let mut start_index = 0;
        for piece in note.text.split(params.delimiter.as_str()) {
            let end_index = start_index + piece.len();
            sections.push(Section::new(piece, start_index, end_index));
            start_index = end_index + params.delimiter.len();
        }
        note.sections = sections;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Note {
        let mut note = Note::new(text);
        SectionSplitter::process(
            &mut note,
            &SplitParams {
                delimiter: "\n\n".to_string(),
            },
        );
        note
    }

    #[test]
    fn splits_and_records_absolute_offsets() {
        let note = split("Chief Complaint: cough\n\nAssessment: stable\n\nPlan");
        assert_eq!(note.sections.len(), 3);
        for section in &note.sections {
            assert_eq!(
                &note.text[section.start_index..section.end_index],
                section.text
            );
        }
        assert_eq!(note.sections[1].text, "Assessment: stable");
        assert_eq!(note.sections[1].start_index, 24);
    }

    #[test]
    fn text_without_delimiter_yields_one_section() {
        let note = split("single block of text");
        assert_eq!(note.sections.len(), 1);
        assert_eq!(note.sections[0].start_index, 0);
        assert_eq!(note.sections[0].end_index, note.text.len());
    }

    #[test]
    fn blank_text_is_a_no_op() {
        let note = split("   \n  ");
        assert!(note.sections.is_empty());
    }

    #[test]
    fn consecutive_delimiters_produce_empty_sections_with_correct_offsets() {
        let note = split("A\n\n\n\nB");
        assert_eq!(note.sections.len(), 3);
        assert_eq!(note.sections[1].text, "");
        assert_eq!(note.sections[1].start_index, 3);
        assert_eq!(note.sections[1].end_index, 3);
        assert_eq!(note.sections[2].text, "B");
        assert_eq!(&note.text[note.sections[2].start_index..], "B");
    }
}
