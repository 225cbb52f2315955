/// Prometheus metric definitions.
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub notes_processed: Counter,
    pub notes_dropped: Counter,
    pub patients_processed: Counter,
    pub batches_total: Counter,
    pub pipeline_duration: Histogram,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            notes_processed: register_counter_with_registry!(
                "clinpipe_notes_processed_total",
                "Total number of notes run through the pipeline",
                registry
            )?,
            notes_dropped: register_counter_with_registry!(
                "clinpipe_notes_dropped_total",
                "Total number of notes dropped by the note filter",
                registry
            )?,
            patients_processed: register_counter_with_registry!(
                "clinpipe_patients_processed_total",
                "Total number of patients processed",
                registry
            )?,
            batches_total: register_counter_with_registry!(
                "clinpipe_batches_total",
                "Total number of batch invocations",
                registry
            )?,
            pipeline_duration: register_histogram_with_registry!(
                "clinpipe_pipeline_duration_seconds",
                "Wall-clock duration of pipeline invocations",
                vec![0.005, 0.025, 0.1, 0.5, 2.5, 10.0, 60.0],
                registry
            )?,
        })
    }

    /// Record the outcome of one invocation over a set of patients.
    pub fn observe_invocation(&self, patients: usize, notes: usize, dropped: usize, seconds: f64) {
        self.patients_processed.inc_by(patients as f64);
        self.notes_processed.inc_by(notes as f64);
        self.notes_dropped.inc_by(dropped as f64);
        self.pipeline_duration.observe(seconds);
    }
}
