#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(
    // Acceptable for trait naming consistency (e.g., SentenceSegmenter, SentenceFilter)
    clippy::module_name_repetitions,

    // Required for score rounding and LSH band probability math: f64 ↔ f32/i32 conversions
    clippy::cast_precision_loss,

    // Necessary for offset arithmetic: usize ↔ u64 for hashing and index bookkeeping
    clippy::cast_possible_truncation,

    // Error context via anyhow::Context already provides sufficient documentation
    clippy::missing_errors_doc,

    // Panic paths are defensive (e.g., mutex poisoning), not part of normal flow
    clippy::missing_panics_doc,

    // Technical identifiers (e.g., XXH3, LSH, UAX29) don't need markdown formatting
    clippy::doc_markdown,

    // Long error messages read better with positional format args
    clippy::uninlined_format_args,

    // if-let-else reads better than map_or in the stage resolution paths
    clippy::option_if_let_else,

    // Pass-by-value necessary for handler methods (Arc, Config types)
    clippy::needless_pass_by_value,

    // Too noisy: many utility methods return useful values but aren't always used
    clippy::must_use_candidate,

    // Stage resolution walks all twelve components in one function
    clippy::too_many_lines,

    // Explicit .iter_mut() loops keep the nested scatter code symmetric
    clippy::explicit_iter_loop
)]

pub(crate) mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod util;
