//! Context expansion for short important sentences.

use std::collections::BTreeSet;

use crate::data::{Note, Sentence};
use crate::error::EngineError;
use crate::pipeline::settings::{self, SentenceExpanderOverride, SentenceExpanderSettings};

const STAGE: &str = "sentence_expander";

const DEFAULT_LENGTH_THRESHOLD: usize = 50;

/// For each important sentence shorter than the threshold, widens a window
/// of neighboring sentences until the accumulated character length reaches
/// the threshold, alternating one step left then one step right per round.
/// A window that reaches both section boundaries stops even when still
/// short of the threshold. Windows from different important sentences are
/// unioned into one ascending index list; expansion never crosses section
/// boundaries.
#[derive(Debug, Clone)]
pub struct SentenceExpander {
    length_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandParams {
    pub length_threshold: usize,
}

impl SentenceExpander {
    pub fn new(settings: &SentenceExpanderSettings) -> Self {
        Self {
            length_threshold: Some(
                settings
                    .length_threshold
                    .unwrap_or(DEFAULT_LENGTH_THRESHOLD),
            ),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&SentenceExpanderOverride>,
    ) -> Result<ExpandParams, EngineError> {
        let length_threshold = settings::required(
            STAGE,
            "length_threshold",
            overrides.and_then(|o| o.length_threshold.as_ref()),
            self.length_threshold.as_ref(),
        )?;
        Ok(ExpandParams { length_threshold })
    }

    pub fn process(note: &mut Note, params: &ExpandParams) {
        for section in &mut note.sections {
            let expanded = expand_indices(
                &section.sentences,
                &section.important_indices,
                params.length_threshold,
            );
            for &idx in &expanded {
                section.sentences[idx].is_expanded = true;
            }
            section.expanded_indices = expanded;
        }
    }
}

fn expand_indices(
    sentences: &[Sentence],
    important_indices: &[usize],
    length_threshold: usize,
) -> Vec<usize> {
    let mut expanded: BTreeSet<usize> = BTreeSet::new();

    for &idx in important_indices {
        if sentence_len(&sentences[idx]) >= length_threshold {
            expanded.insert(idx);
            continue;
        }

        let (mut range_start, mut range_end) = (idx, idx + 1);
        let mut combined_len = sentence_len(&sentences[idx]);

        while combined_len < length_threshold {
            if range_start > 0 {
                range_start -= 1;
                combined_len += sentence_len(&sentences[range_start]);
            }

            if combined_len < length_threshold && range_end < sentences.len() {
                combined_len += sentence_len(&sentences[range_end]);
                range_end += 1;
            }

            if range_start == 0 && range_end == sentences.len() {
                break;
            }
        }

        expanded.extend(range_start..range_end);
    }

    expanded.into_iter().collect()
}

fn sentence_len(sentence: &Sentence) -> usize {
    sentence.text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Section;

    fn sentences_of_lengths(lengths: &[usize]) -> Vec<Sentence> {
        let mut start = 0;
        lengths
            .iter()
            .map(|&len| {
                let text = "x".repeat(len);
                let sentence = Sentence::new(text, start, start + len);
                start += len + 1;
                sentence
            })
            .collect()
    }

    #[test]
    fn windows_fan_out_and_merge_to_the_full_range() {
        let sentences = sentences_of_lengths(&[6, 22, 17, 18, 15]);
        let expanded = expand_indices(&sentences, &[0, 3], 50);
        assert_eq!(expanded, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn long_important_sentence_expands_to_itself() {
        let sentences = sentences_of_lengths(&[60, 10, 10]);
        assert_eq!(expand_indices(&sentences, &[0], 50), vec![0]);
    }

    #[test]
    fn window_stops_at_both_boundaries_even_if_short() {
        let sentences = sentences_of_lengths(&[5, 5, 5]);
        // Total length 15 < 50: the window saturates the section and stops.
        assert_eq!(expand_indices(&sentences, &[1], 50), vec![0, 1, 2]);
    }

    #[test]
    fn no_important_indices_means_no_expansion() {
        let sentences = sentences_of_lengths(&[10, 10]);
        assert!(expand_indices(&sentences, &[], 50).is_empty());
    }

    #[test]
    fn overlapping_windows_deduplicate() {
        let sentences = sentences_of_lengths(&[20, 20, 20, 20]);
        let expanded = expand_indices(&sentences, &[1, 2], 50);
        assert_eq!(expanded, vec![0, 1, 2, 3]);
    }

    #[test]
    fn expansion_is_recorded_on_sentences_and_section() {
        let mut note = Note::new("note");
        let mut section = Section::new("section", 0, 100);
        section.sentences = sentences_of_lengths(&[6, 22, 17, 18, 15]);
        section.important_indices = vec![0, 3];
        note.sections.push(section);

        SentenceExpander::process(
            &mut note,
            &ExpandParams {
                length_threshold: 50,
            },
        );

        let section = &note.sections[0];
        assert_eq!(section.expanded_indices, vec![0, 1, 2, 3, 4]);
        assert!(section.sentences.iter().all(|s| s.is_expanded));
    }
}
