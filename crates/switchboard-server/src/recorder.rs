//! Evaluation record export.
//!
//! The evaluation path hands each result to a [`Recorder`] exactly once and
//! never waits on it. The production recorder buffers records in a bounded
//! queue; when the queue is full the newest record is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use switchboard_core::EvaluationResult;

/// Sink for evaluation results.
pub trait Recorder: Send + Sync {
    /// Accepts one evaluation result. Must not block or fail the
    /// evaluation path.
    fn record(&self, result: &EvaluationResult);
}

/// Recorder that writes records as JSON lines through tracing.
///
/// Only evaluations of flags with a data record type are exported; the
/// type is emitted with each line so downstream sinks can route on it.
#[derive(Clone)]
pub struct JsonLogRecorder {
    tx: mpsc::Sender<EvaluationResult>,
    dropped: Arc<AtomicU64>,
}

impl JsonLogRecorder {
    /// Creates the recorder and spawns its drain task. The task exits when
    /// every recorder clone has been dropped.
    pub fn spawn(queue_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EvaluationResult>(queue_size);
        let handle = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                let record_type = result.data_record_type.clone().unwrap_or_default();
                match serde_json::to_string(&result) {
                    Ok(line) => {
                        tracing::info!(
                            target: "switchboard::records",
                            record_type = %record_type,
                            "{}",
                            line
                        );
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode evaluation record");
                    },
                }
            }
            tracing::info!("record drain stopped");
        });
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Number of records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Recorder for JsonLogRecorder {
    fn record(&self, result: &EvaluationResult) {
        if result.data_record_type.is_none() {
            return;
        }
        if self.tx.try_send(result.clone()).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 10_000 == 0 {
                tracing::warn!(dropped, "record queue full, dropping newest records");
            }
        }
    }
}

/// Recorder that discards everything; used when export is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record(&self, _result: &EvaluationResult) {}
}

#[cfg(test)]
mod tests {
    use switchboard_core::EvaluationContext;

    use super::*;

    fn recorded_result(record_type: Option<&str>) -> EvaluationResult {
        let context = EvaluationContext::with_entity_id("u-1");
        let mut result = EvaluationResult::flag_not_found(None, None, &context, false);
        result.data_record_type = record_type.map(str::to_string);
        result
    }

    #[tokio::test]
    async fn test_records_without_type_are_skipped() {
        let (recorder, handle) = JsonLogRecorder::spawn(2);
        recorder.record(&recorded_result(None));
        assert_eq!(recorder.dropped(), 0);

        drop(recorder);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        // Queue of one with no running drain consumer scheduled yet: the
        // second and third sends overflow.
        let (recorder, handle) = JsonLogRecorder::spawn(1);
        recorder.record(&recorded_result(Some("checkout")));
        recorder.record(&recorded_result(Some("checkout")));
        recorder.record(&recorded_result(Some("checkout")));
        assert!(recorder.dropped() >= 1);

        drop(recorder);
        handle.await.unwrap();
    }
}
