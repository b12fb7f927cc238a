use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use vox_queue::{Delivery, JobConsumer};
use vox_stt_interface::{JobMessage, JobStore, PipelineResult};

use crate::Orchestrator;

/// What to answer the broker with for one processed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    Reject,
}

/// The terminal disposition for an orchestration outcome: done is acked,
/// transient failures are requeued for redelivery, permanent failures are
/// rejected into the dead-letter queue.
pub fn disposition(result: &PipelineResult<()>) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(err) if err.is_transient() => Disposition::Requeue,
        Err(_) => Disposition::Reject,
    }
}

/// The queue loop of one worker process: lease messages with bounded
/// prefetch, dispatch each to the orchestrator, translate the outcome to
/// an ack / requeue / reject.
pub struct Consumer {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn JobStore>,
    max_concurrent_jobs: usize,
    drain_timeout: Duration,
}

impl Consumer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn JobStore>,
        max_concurrent_jobs: usize,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            store,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            drain_timeout,
        }
    }

    /// Consume until `shutdown` fires or the delivery stream ends, then
    /// drain in-flight jobs within the drain window. Jobs still running
    /// when the window closes are aborted unacked; the broker redelivers
    /// them.
    pub async fn run(
        &self,
        consumer: JobConsumer,
        shutdown: CancellationToken,
    ) -> Result<(), vox_queue::Error> {
        let mut deliveries = consumer.deliveries().await?;
        let mut inflight: JoinSet<()> = JoinSet::new();

        tracing::info!(prefetch = self.max_concurrent_jobs, "consumer_started");

        loop {
            // Local bound matching the broker-side max_ack_pending.
            while inflight.len() >= self.max_concurrent_jobs {
                inflight.join_next().await;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown_signal_received");
                    break;
                }
                next = deliveries.next() => match next {
                    None => {
                        tracing::warn!("delivery_stream_ended");
                        break;
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "delivery_receive_failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Some(Ok(delivery)) => {
                        let orchestrator = self.orchestrator.clone();
                        let store = self.store.clone();
                        inflight.spawn(async move {
                            handle_delivery(orchestrator, store, delivery).await;
                        });
                    }
                },
            }
        }

        tracing::info!(inflight = inflight.len(), "draining_inflight_jobs");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("drain_window_expired_aborting_inflight");
            inflight.abort_all();
        }

        tracing::info!("consumer_stopped");
        Ok(())
    }
}

async fn handle_delivery(
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn JobStore>,
    delivery: Delivery,
) {
    let message: JobMessage = match serde_json::from_slice(delivery.payload()) {
        Ok(message) => message,
        Err(err) => {
            // MalformedMessage: nothing to retry, straight to the DLQ.
            tracing::error!(error = %err, "malformed_message_rejected");
            if let Err(err) = delivery.reject().await {
                tracing::warn!(error = %err, "reject_failed");
            }
            return;
        }
    };

    let job_id = message.job_id;
    tracing::info!(
        %job_id,
        delivered_count = delivery.delivered_count(),
        "message_received"
    );

    // A panic inside the pipeline is indistinguishable from a crash of
    // unknown cause: treat it as transient and let the broker redeliver.
    let outcome = std::panic::AssertUnwindSafe(orchestrator.run(job_id))
        .catch_unwind()
        .await;

    let action = match &outcome {
        Ok(result) => disposition(result),
        Err(_) => {
            tracing::error!(%job_id, "orchestrator_panicked");
            Disposition::Requeue
        }
    };

    match action {
        Disposition::Ack => {
            if let Err(err) = delivery.ack().await {
                tracing::warn!(%job_id, error = %err, "ack_failed");
            }
        }
        Disposition::Requeue => {
            // Count the redelivery before giving the message back.
            if let Err(err) = store.increment_retry(job_id).await {
                tracing::warn!(%job_id, error = %err, "retry_count_increment_failed");
            }
            if let Err(err) = delivery.requeue().await {
                tracing::warn!(%job_id, error = %err, "requeue_failed");
            } else {
                tracing::info!(%job_id, "message_requeued");
            }
        }
        Disposition::Reject => {
            if let Err(err) = delivery.reject().await {
                tracing::warn!(%job_id, error = %err, "reject_failed");
            } else {
                tracing::info!(%job_id, "message_rejected_to_dlq");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use vox_stt_interface::{PermanentError, PipelineError, TransientError};

    use super::*;

    #[test]
    fn success_acks() {
        assert_eq!(disposition(&Ok(())), Disposition::Ack);
    }

    #[test]
    fn transient_failures_requeue() {
        for err in [
            TransientError::BrokerConnect("refused".into()),
            TransientError::BlobIo("timeout".into()),
            TransientError::JobStoreUnavailable("pool closed".into()),
            TransientError::TranscriberCrashed("ggml abort".into()),
            TransientError::TranscriberTimeout("300s".into()),
        ] {
            assert_eq!(
                disposition(&Err(PipelineError::Transient(err))),
                Disposition::Requeue
            );
        }
    }

    #[test]
    fn permanent_failures_reject() {
        for err in [
            PermanentError::JobNotFound(Uuid::nil()),
            PermanentError::CorruptedAudio("truncated".into()),
            PermanentError::InvalidAudioFormat("midi".into()),
            PermanentError::MissingDependency("no model".into()),
            PermanentError::AllChunksFailed,
            PermanentError::MalformedMessage("not json".into()),
        ] {
            assert_eq!(
                disposition(&Err(PipelineError::Permanent(err))),
                Disposition::Reject
            );
        }
    }
}
