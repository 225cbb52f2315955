//! Regex substitution over note text.

use regex::NoExpand;

use crate::data::Note;
use crate::error::EngineError;
use crate::pipeline::settings::{self, PatternReplacerOverride, PatternReplacerSettings};
use crate::util::matchers::cached_regex;

const STAGE: &str = "pattern_replacer";

/// Collapses runs of four or more whitespace characters into a paragraph
/// break by default; both the pattern and the replacement are overridable.
#[derive(Debug, Clone)]
pub struct PatternReplacer {
    pattern: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceParams {
    pub pattern: String,
    pub target: String,
}

impl PatternReplacer {
    pub fn new(settings: &PatternReplacerSettings) -> Self {
        Self {
            pattern: Some(
                settings
                    .pattern
                    .clone()
                    .unwrap_or_else(|| r"\s{4,}".to_string()),
            ),
            target: Some(settings.target.clone().unwrap_or_else(|| "\n\n".to_string())),
        }
    }

    pub fn resolve(
        &self,
        overrides: Option<&PatternReplacerOverride>,
    ) -> Result<ReplaceParams, EngineError> {
        let pattern = settings::required(
            STAGE,
            "pattern",
            overrides.and_then(|o| o.pattern.as_ref()),
            self.pattern.as_ref(),
        )?;
        let target = settings::required(
            STAGE,
            "target",
            overrides.and_then(|o| o.target.as_ref()),
            self.target.as_ref(),
        )?;
        Ok(ReplaceParams { pattern, target })
    }

    pub fn process(note: &mut Note, params: &ReplaceParams) -> Result<(), EngineError> {
        let regex = cached_regex(&params.pattern, "pattern_replacer")?;
        note.text = regex
            .replace_all(&note.text, NoExpand(&params.target))
            .into_owned();
        Ok(())
    }
}
