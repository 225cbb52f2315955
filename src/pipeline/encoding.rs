//! Mojibake repair for note text.
//!
//! The classic corruption in exported clinical notes is UTF-8 that was
//! decoded as Windows-1252 and re-encoded, turning `’` into `â€™`. Undoing
//! it is the inverse trip: encode the text back to Windows-1252 bytes and
//! reinterpret those bytes as UTF-8. The round trip is attempted repeatedly
//! (doubly-corrupted exports exist) and accepted only when it yields valid
//! UTF-8 with strictly fewer characters, which makes the stage a fixpoint:
//! already-clean text passes through unchanged.

use encoding_rs::WINDOWS_1252;

use crate::data::Note;

const MAX_REPAIR_PASSES: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct EncodingFixer;

impl EncodingFixer {
    pub fn process(note: &mut Note) {
        note.text = fix_text(&note.text);
    }
}

/// Trim outer whitespace and undo mojibake round trips.
pub fn fix_text(text: &str) -> String {
    let mut current = text.trim().to_string();
    for _ in 0..MAX_REPAIR_PASSES {
        match undo_windows1252_round_trip(&current) {
            Some(repaired) => current = repaired,
            None => break,
        }
    }
    current
}

fn undo_windows1252_round_trip(text: &str) -> Option<String> {
    let (bytes, _, had_unmappable) = WINDOWS_1252.encode(text);
    if had_unmappable {
        return None;
    }
    let repaired = String::from_utf8(bytes.into_owned()).ok()?;
    // A genuine double-encoding always shrinks; equality means clean text.
    if repaired.chars().count() < text.chars().count() {
        Some(repaired)
    } else {
        None
    }
}
