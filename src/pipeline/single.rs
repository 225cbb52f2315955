//! Serial single-patient execution.

use crate::data::Patient;
use crate::error::EngineError;
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::settings::{Overrides, PipelineSettings};

/// Runs every enabled stage in order over each note of one patient.
///
/// The duplicate checker's LSH index is cleared at the start of every
/// invocation with the effective `num_perm`/`sim_threshold`, so duplicate
/// detection spans all notes of the call and never leaks across calls.
#[derive(Debug)]
pub struct SinglePipeline {
    engine: PipelineEngine,
}

impl SinglePipeline {
    pub fn new(engine: PipelineEngine) -> Self {
        Self { engine }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, EngineError> {
        Ok(Self::new(PipelineEngine::new(settings)?))
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    pub fn process(
        &mut self,
        patient: &mut Patient,
        overrides: Option<&Overrides>,
    ) -> Result<(), EngineError> {
        let plan = self.engine.resolve(overrides)?;

        if let Some(params) = &plan.duplicate_checker {
            self.engine.reset_duplicate_checker(params);
        }

        for note in &mut patient.notes {
            self.engine.run_note(note, &plan)?;
        }
        Ok(())
    }
}
