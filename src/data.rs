//! Core data model: patients, notes, sections, and sentences.
//!
//! These structs are both the in-memory representation the stages mutate and
//! the wire model of the HTTP surface. Offsets are byte offsets into the note
//! text as it was when the owning structure was derived, so
//! `note.text[section.start_index..section.end_index] == section.text` holds
//! for every section produced by the splitter.

use serde::{Deserialize, Serialize};

/// A bundle of notes belonging to one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub notes: Vec<Note>,
}

impl Patient {
    pub fn new(patient_id: impl Into<String>, notes: Vec<Note>) -> Self {
        Self {
            patient_id: patient_id.into(),
            notes,
        }
    }
}

/// A single free-form clinical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessed_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_score: Option<f64>,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sections: Vec::new(),
            preprocessed_text: None,
            predicted_label: None,
            predicted_score: None,
        }
    }
}

/// A delimiter-bounded region of a note.
///
/// Index sequences (`important_indices`, `duplicate_indices`,
/// `expanded_indices`) refer to positions in `sentences` and are kept in
/// ascending order by the stages that populate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub text: String,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub important_indices: Vec<usize>,
    #[serde(default)]
    pub duplicate_indices: Vec<usize>,
    #[serde(default)]
    pub expanded_indices: Vec<usize>,
    #[serde(default)]
    pub is_important: bool,
}

impl Section {
    pub fn new(text: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            text: text.into(),
            start_index,
            end_index,
            sentences: Vec::new(),
            important_indices: Vec::new(),
            duplicate_indices: Vec::new(),
            expanded_indices: Vec::new(),
            is_important: false,
        }
    }
}

/// A segmenter-produced unit inside a section, stripped of outer whitespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default)]
    pub is_expanded: bool,
}

impl Sentence {
    pub fn new(text: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            text: text.into(),
            start_index,
            end_index,
            is_duplicate: false,
            is_important: false,
            is_expanded: false,
        }
    }
}
