//! Multi-patient execution with worker fan-out.
//!
//! Stages split into four phases. Phase A (stages 1–6) and Phase C (stages
//! 8–11) run in a pool of worker threads over disjoint patient chunks; the
//! workers receive ownership of their chunk and none of the coordinator's
//! model objects. Phase B (sentence segmentation) and Stage D (ML
//! inference) run once in the coordinator, where the heavy backends live
//! and batch calls amortize their throughput.
//!
//! Each Phase C worker brings its own fresh duplicate-checker index, so
//! near-duplicate detection is scoped to a worker's patient set; callers
//! needing global first-occurrence semantics use the single-patient
//! pipeline.

use std::thread;

use crate::data::Patient;
use crate::error::EngineError;
use crate::pipeline::dedup::DuplicateChecker;
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::settings::{Overrides, PipelineSettings};

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug)]
pub struct BatchPipeline {
    engine: PipelineEngine,
}

impl BatchPipeline {
    pub fn new(engine: PipelineEngine) -> Self {
        Self { engine }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, EngineError> {
        Ok(Self::new(PipelineEngine::new(settings)?))
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Process all patients in place. Order and length of the slice are
    /// preserved; any worker error fails the whole call.
    pub fn process(
        &self,
        patients: &mut [Patient],
        overrides: Option<&Overrides>,
        workers: usize,
    ) -> Result<(), EngineError> {
        let plan = self.engine.resolve(overrides)?;
        let workers = workers.max(1);

        // Phase A: stages 1-6 in the worker pool.
        run_chunked(patients, workers, |chunk| {
            for patient in chunk {
                for note in &mut patient.notes {
                    // Blanks dropped notes and skips their remaining stages.
                    self.engine.run_phase_a(note, &plan)?;
                }
            }
            Ok(())
        })?;

        // Phase B: one segmentation batch in the coordinator.
        if let (Some(params), Some(segmenter)) = (&plan.sentence_segmenter, self.engine.segmenter())
        {
            segmenter.process_batch_patients(patients, params)?;
        }

        // Phase C: stages 8-11 in the worker pool, one LSH index per worker.
        run_chunked(patients, workers, |chunk| {
            let mut checker = plan.duplicate_checker.as_ref().map(DuplicateChecker::fresh);
            for patient in chunk {
                for note in &mut patient.notes {
                    PipelineEngine::run_phase_c(note, &plan, checker.as_mut())?;
                }
            }
            Ok(())
        })?;

        // Stage D: one classification batch in the coordinator.
        if let (Some(params), Some(ml)) = (&plan.ml_inference, self.engine.ml()) {
            ml.process_batch(patients, params)?;
        }

        Ok(())
    }
}

/// Split `patients` into at most `workers` contiguous chunks and run `job`
/// over each chunk on its own scoped thread.
fn run_chunked<F>(patients: &mut [Patient], workers: usize, job: F) -> Result<(), EngineError>
where
    F: Fn(&mut [Patient]) -> Result<(), EngineError> + Sync,
{
    if patients.is_empty() {
        return Ok(());
    }
    let chunk_size = patients.len().div_ceil(workers).max(1);
    let job = &job;

    thread::scope(|scope| {
        let mut handles = Vec::new();
        for chunk in patients.chunks_mut(chunk_size) {
            handles.push(scope.spawn(move || job(chunk)));
        }
        for handle in handles {
            handle.join().map_err(|_| EngineError::WorkerPanicked)??;
        }
        Ok(())
    })
}
