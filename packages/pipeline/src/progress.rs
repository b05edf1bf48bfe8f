//! Run progress reporting.
//!
//! The run reports which source it is reading, then one tick per finished
//! partition. Rendering is left to the caller: the CLI draws an `indicatif`
//! bar, library users get [`NullProgress`] by default.

use std::sync::Arc;

/// Receives progress from a [`Pipeline`](crate::Pipeline) run.
///
/// Workers tick from their own threads, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of partitions the run will process.
    fn set_total(&self, total: u64);

    /// `delta` more partitions finished, successfully or not.
    fn inc(&self, delta: u64);

    /// Describes the current step, e.g. the source being read.
    fn set_message(&self, msg: String);

    /// The run is over; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_progress_accepts_updates() {
        let progress = null_progress();
        progress.set_total(3);
        progress.set_message("Reading points.csv".to_string());
        progress.inc(3);
        progress.finish("done".to_string());
    }
}
