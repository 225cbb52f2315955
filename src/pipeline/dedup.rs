//! Near-duplicate sentence detection across the notes of one invocation.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::minhash::{MinHashLsh, MinHasher, signature_key};
use crate::pipeline::settings::{self, DuplicateCheckerOverride, DuplicateCheckerSettings};

const STAGE: &str = "duplicate_checker";

const DEFAULT_NUM_PERM: usize = 256;
const DEFAULT_SIM_THRESHOLD: f64 = 0.9;

/// Marks near-duplicate sentences via MinHash + LSH.
///
/// The index persists across every note handed to one checker, so the first
/// occurrence of a near-duplicate cluster stays unmarked and all later
/// occurrences are flagged; order matters. Sentences below the length gate
/// are never inserted nor queried. The single-patient pipeline resets the
/// index at the start of each invocation; batch workers each hold an
/// independent checker, so duplicates are only detected within one worker's
/// patient set.
#[derive(Debug, Clone)]
pub struct DuplicateChecker {
    num_perm: usize,
    sim_threshold: f64,
    length_threshold: Option<usize>,
    hasher: MinHasher,
    lsh: MinHashLsh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupParams {
    pub num_perm: usize,
    pub sim_threshold: f64,
    pub length_threshold: usize,
}

impl DuplicateChecker {
    pub fn new(settings: &DuplicateCheckerSettings) -> Self {
        let num_perm = settings.num_perm.unwrap_or(DEFAULT_NUM_PERM);
        let sim_threshold = settings.sim_threshold.unwrap_or(DEFAULT_SIM_THRESHOLD);
        Self {
            num_perm,
            sim_threshold,
            length_threshold: settings.length_threshold,
            hasher: MinHasher::new(num_perm),
            lsh: MinHashLsh::new(num_perm, sim_threshold),
        }
    }

    /// Effective parameters for one invocation.
    pub fn resolve(
        &self,
        overrides: Option<&DuplicateCheckerOverride>,
    ) -> Result<DedupParams, EngineError> {
        let num_perm = settings::required(
            STAGE,
            "num_perm",
            overrides.and_then(|o| o.num_perm.as_ref()),
            Some(&self.num_perm),
        )?;
        let sim_threshold = settings::required(
            STAGE,
            "sim_threshold",
            overrides.and_then(|o| o.sim_threshold.as_ref()),
            Some(&self.sim_threshold),
        )?;
        let length_threshold = settings::required(
            STAGE,
            "length_threshold",
            overrides.and_then(|o| o.length_threshold.as_ref()),
            self.length_threshold.as_ref(),
        )?;
        Ok(DedupParams {
            num_perm,
            sim_threshold,
            length_threshold,
        })
    }

    /// Drop all indexed state and apply the effective MinHash/LSH geometry.
    pub fn reset(&mut self, params: &DedupParams) {
        if self.hasher.num_perm() != params.num_perm {
            self.hasher = MinHasher::new(params.num_perm);
        }
        self.lsh = MinHashLsh::new(params.num_perm, params.sim_threshold);
        self.num_perm = params.num_perm;
        self.sim_threshold = params.sim_threshold;
    }

    /// An empty checker with the same effective geometry, for batch workers.
    pub fn fresh(params: &DedupParams) -> Self {
        Self {
            num_perm: params.num_perm,
            sim_threshold: params.sim_threshold,
            length_threshold: Some(params.length_threshold),
            hasher: MinHasher::new(params.num_perm),
            lsh: MinHashLsh::new(params.num_perm, params.sim_threshold),
        }
    }

    pub fn process(&mut self, note: &mut Note, params: &DedupParams) {
        for section in &mut note.sections {
            let mut duplicate_indices = Vec::new();

            for (idx, sentence) in section.sentences.iter_mut().enumerate() {
                if sentence.text.chars().count() < params.length_threshold {
                    continue;
                }

                let signature = self.hasher.signature(&sentence.text);
                if self.lsh.query(&signature).is_empty() {
                    self.lsh.insert(signature_key(&signature), &signature);
                } else {
                    sentence.is_duplicate = true;
                    duplicate_indices.push(idx);
                }
            }

            section.duplicate_indices = duplicate_indices;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Section, Sentence};
    use crate::pipeline::settings::StageStatus;

    fn checker(length_threshold: usize) -> (DuplicateChecker, DedupParams) {
        let checker = DuplicateChecker::new(&DuplicateCheckerSettings {
            status: StageStatus::Enabled,
            num_perm: Some(256),
            sim_threshold: Some(0.9),
            length_threshold: Some(length_threshold),
        });
        let params = checker.resolve(None).expect("resolves");
        (checker, params)
    }

    fn note_with_sentences(texts: &[&str]) -> Note {
        let mut note = Note::new("note");
        let mut section = Section::new("section", 0, 100);
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

    #[test]
    fn unique_sentences_stay_unmarked() {
        let (mut checker, params) = checker(20);
        let mut note = note_with_sentences(&[
            "This is a unique sentence.",
            "Another unique sentence here.",
        ]);
        checker.process(&mut note, &params);
        assert!(note.sections[0].sentences.iter().all(|s| !s.is_duplicate));
        assert!(note.sections[0].duplicate_indices.is_empty());
    }

    #[test]
    fn later_occurrence_is_marked_first_is_kept() {
        let (mut checker, params) = checker(20);
        let mut note = note_with_sentences(&[
            "This is a duplicated long sentence.",
            "This is a duplicated long sentence.",
        ]);
        checker.process(&mut note, &params);
        let section = &note.sections[0];
        assert!(!section.sentences[0].is_duplicate);
        assert!(section.sentences[1].is_duplicate);
        assert_eq!(section.duplicate_indices, vec![1]);
    }

    #[test]
    fn duplicates_detected_across_notes() {
        let (mut checker, params) = checker(20);
        let sentence = "This long sentence appears in two different notes.";
        let mut first = note_with_sentences(&[sentence]);
        let mut second = note_with_sentences(&[sentence]);

        checker.process(&mut first, &params);
        checker.process(&mut second, &params);

        assert!(!first.sections[0].sentences[0].is_duplicate);
        assert!(second.sections[0].sentences[0].is_duplicate);
        assert_eq!(second.sections[0].duplicate_indices, vec![0]);
    }

    #[test]
    fn short_sentences_pass_the_length_gate_untouched() {
        let (mut checker, params) = checker(20);
        let mut note = note_with_sentences(&["Short.", "Short.", "Short."]);
        checker.process(&mut note, &params);
        assert!(note.sections[0].sentences.iter().all(|s| !s.is_duplicate));
        assert!(note.sections[0].duplicate_indices.is_empty());
    }

    #[test]
    fn reset_clears_indexed_state() {
        let (mut checker, params) = checker(20);
        let sentence = "This long sentence will be indexed and then forgotten.";
        let mut first = note_with_sentences(&[sentence]);
        checker.process(&mut first, &params);

        checker.reset(&params);

        let mut second = note_with_sentences(&[sentence]);
        checker.process(&mut second, &params);
        assert!(!second.sections[0].sentences[0].is_duplicate);
    }

    #[test]
    fn missing_length_threshold_is_a_parameter_error() {
        let checker = DuplicateChecker::new(&DuplicateCheckerSettings {
            status: StageStatus::Enabled,
            num_perm: None,
            sim_threshold: None,
            length_threshold: None,
        });
        let error = checker.resolve(None).expect_err("must error");
        assert_eq!(
            error.to_string(),
            "duplicate_checker.length_threshold: A value must be provided."
        );
    }

    #[test]
    fn reordered_words_are_near_duplicates() {
        // The signature is over the token set, so a reordering has Jaccard
        // similarity 1.0 and must always collide.
        let (mut checker, params) = checker(20);
        let mut note = note_with_sentences(&[
            "anticoagulation therapy was started for deep vein thrombosis today",
            "today anticoagulation therapy was started for deep vein thrombosis",
        ]);
        checker.process(&mut note, &params);
        assert!(!note.sections[0].sentences[0].is_duplicate);
        assert!(note.sections[0].sentences[1].is_duplicate);
        assert_eq!(note.sections[0].duplicate_indices, vec![1]);
    }
}
