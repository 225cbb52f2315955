//! Length-preserving masking of listed terms.

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, WordMaskerOverride, WordMaskerSettings};
use crate::util::matchers::keyword_matcher;

const STAGE: &str = "word_masker";

/// Replaces each whole-word occurrence of a listed term with the mask
/// character repeated to the occurrence's character length, so every offset
/// computed downstream stays valid.
#[derive(Debug, Clone)]
pub struct WordMasker {
    words_to_mask: Option<Vec<String>>,
    mask_char: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskParams {
    pub words_to_mask: Vec<String>,
    pub mask_char: char,
}

impl WordMasker {
    pub fn new(settings: &WordMaskerSettings) -> Self {
        Self {
            words_to_mask: Some(settings.words_to_mask.clone().unwrap_or_default()),
            mask_char: Some(settings.mask_char.unwrap_or('*')),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&WordMaskerOverride>,
    ) -> Result<MaskParams, EngineError> {
        let words_to_mask = settings::required(
            STAGE,
            "words_to_mask",
            overrides.and_then(|o| o.words_to_mask.as_ref()),
            self.words_to_mask.as_ref(),
        )?;
        let mask_char = settings::required(
            STAGE,
            "mask_char",
            overrides.and_then(|o| o.mask_char.as_ref()),
            self.mask_char.as_ref(),
        )?;
        Ok(MaskParams {
            words_to_mask,
            mask_char,
        })
    }

    pub fn process(note: &mut Note, params: &MaskParams) -> Result<(), EngineError> {
        if params.words_to_mask.is_empty() {
            return Ok(());
        }
        let matcher = keyword_matcher(&params.words_to_mask, "word_masker")?;
        let spans = matcher.find_word_spans(&note.text);
        if spans.is_empty() {
            return Ok(());
        }

        let mut masked = String::with_capacity(note.text.len());
        let mut cursor = 0;
        for (start, end) in spans {
            masked.push_str(&note.text[cursor..start]);
            let width = note.text[start..end].chars().count();
            masked.extend(std::iter::repeat_n(params.mask_char, width));
            cursor = end;
        }
        masked.push_str(&note.text[cursor..]);
        note.text = masked;
        Ok(())
    }
}
