//! Keyword and regex machines shared by the filtering and masking stages.
//!
//! Keyword lists compile into Aho-Corasick automata that locate candidate
//! positions; at each candidate, the alternatives are verified in list
//! order against the whole-word boundary rule (neither preceded nor
//! followed by an ASCII alphanumeric character). This reproduces the
//! semantics of a `(term1|term2|…)` alternation wrapped in boundary
//! look-arounds: a hit whose boundary fails does not hide a different
//! alternative at the same position, and scanning resumes one character
//! later.
//!
//! Compiled machines are held in bounded LRU caches keyed by the full
//! argument tuple. The bound (16 entries) is a cost cap against adversarial
//! per-call configurations, not a correctness property.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, Input, MatchKind};
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::EngineError;

const CACHE_CAPACITY: usize = 16;

static KEYWORD_CACHE: Lazy<Mutex<LruCache<Vec<String>, Arc<KeywordMatcher>>>> = Lazy::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity"),
    ))
});

static REGEX_CACHE: Lazy<Mutex<LruCache<String, Arc<Regex>>>> = Lazy::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity"),
    ))
});

/// A case-insensitive whole-word matcher over a fixed keyword list.
#[derive(Debug)]
pub struct KeywordMatcher {
    words: Vec<String>,
    automaton: AhoCorasick,
}

impl KeywordMatcher {
    fn build(words: &[String], stage: &'static str) -> Result<Self, EngineError> {
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .ascii_case_insensitive(true)
            .build(words)
            .map_err(|error| EngineError::InvalidConfiguration {
                stage,
                message: error.to_string(),
            })?;
        Ok(Self {
            words: words.to_vec(),
            automaton,
        })
    }

    /// Whether `text` contains any keyword as a whole word.
    pub fn is_match(&self, text: &str) -> bool {
        self.next_word_match(text, 0).is_some()
    }

    /// Non-overlapping whole-word match spans in scan order.
    pub fn find_word_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut pos = 0;
        while let Some((start, end)) = self.next_word_match(text, pos) {
            spans.push((start, end));
            pos = end;
        }
        spans
    }

    /// Whether `text` begins with a keyword. When `trailing_boundary` is
    /// set, the keyword must also end at a word boundary.
    pub fn matches_at_start(&self, text: &str, trailing_boundary: bool) -> bool {
        self.words.iter().any(|word| {
            word_at(text, 0, word) && (!trailing_boundary || boundary_after(text, word.len()))
        })
    }

    fn next_word_match(&self, text: &str, mut pos: usize) -> Option<(usize, usize)> {
        while pos <= text.len() {
            let hit = self.automaton.find(Input::new(text).range(pos..))?;
            let start = hit.start();
            if let Some(end) = self.word_match_at(text, start) {
                return Some((start, end));
            }
            // No alternative forms a whole word here; resume one character
            // past the candidate's start.
            pos = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }

    /// First alternative (in list order) that forms a whole word at `start`.
    fn word_match_at(&self, text: &str, start: usize) -> Option<usize> {
        if !boundary_before(text, start) {
            return None;
        }
        for word in &self.words {
            let end = start + word.len();
            if word_at(text, start, word) && boundary_after(text, end) {
                return Some(end);
            }
        }
        None
    }
}

fn word_at(text: &str, start: usize, word: &str) -> bool {
    let end = start + word.len();
    end <= text.len()
        && text.is_char_boundary(end)
        && text[start..end].eq_ignore_ascii_case(word)
}

fn boundary_before(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_ascii_alphanumeric())
}

fn boundary_after(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .is_none_or(|c| !c.is_ascii_alphanumeric())
}

/// Fetch or compile the whole-word matcher for `words`.
pub fn keyword_matcher(
    words: &[String],
    stage: &'static str,
) -> Result<Arc<KeywordMatcher>, EngineError> {
    let mut cache = KEYWORD_CACHE.lock().expect("keyword cache poisoned");
    if let Some(matcher) = cache.get(words) {
        return Ok(Arc::clone(matcher));
    }
    let matcher = Arc::new(KeywordMatcher::build(words, stage)?);
    cache.put(words.to_vec(), Arc::clone(&matcher));
    Ok(matcher)
}

/// Fetch or compile a raw regex (used by the pattern replacer).
pub fn cached_regex(pattern: &str, stage: &'static str) -> Result<Arc<Regex>, EngineError> {
    let mut cache = REGEX_CACHE.lock().expect("regex cache poisoned");
    if let Some(regex) = cache.get(pattern) {
        return Ok(Arc::clone(regex));
    }
    let regex =
        Arc::new(
            Regex::new(pattern).map_err(|error| EngineError::InvalidConfiguration {
                stage,
                message: error.to_string(),
            })?,
        );
    cache.put(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}
