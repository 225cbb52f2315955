//! The note preprocessing pipeline.
//!
//! Twelve stages compose in a fixed order: encoding repair, pattern
//! replacement, word masking, note filtering, section splitting, section
//! filtering, sentence segmentation, duplicate checking, sentence
//! filtering, sentence expansion, joining, and ML inference. Each stage is
//! `enabled`, `disabled`, or `excluded` per configuration, with a per-call
//! override protocol resolved by the engine before any note is touched.

pub mod batch;
pub mod dedup;
pub mod encoding;
pub mod engine;
pub mod expand;
pub mod join;
pub mod mask;
pub mod minhash;
pub mod ml;
pub mod note_filter;
pub mod replace;
pub mod section_filter;
pub mod section_split;
pub mod segment;
pub mod sentence_filter;
pub mod settings;
pub mod single;

pub use batch::{BatchPipeline, DEFAULT_WORKERS};
pub use engine::{ExecutionPlan, PipelineEngine};
pub use settings::{Overrides, PipelineSettings, StageStatus};
pub use single::SinglePipeline;
