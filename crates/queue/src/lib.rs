//! Durable work queue on NATS JetStream.
//!
//! One work-queue stream holds the job messages; workers share a durable
//! pull consumer whose `max_ack_pending` is the prefetch bound. Delivery
//! is at-least-once: a message stays in flight until the handler answers
//! with ack (done), NAK (requeue after a delay) or TERM (permanent
//! disposal, routed to the dead-letter stream by broker configuration).

use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer, stream};
use async_trait::async_trait;
use futures_util::StreamExt;

use vox_stt_interface::{
    JOB_ID_HEADER, JobMessage, JobPublisher, MAX_PRIORITY, PRIORITY_HEADER, PUBLISHED_AT_HEADER,
    PipelineError, PipelineResult,
};

mod error;

pub use error::Error;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub stream: String,
    pub subject: String,
    /// Durable consumer name shared by all worker processes.
    pub durable: String,
    /// How long a NAKed message stays invisible before redelivery.
    pub requeue_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".into(),
            stream: "STT_JOBS".into(),
            subject: "stt.jobs".into(),
            durable: "stt-workers".into(),
            requeue_delay: Duration::from_secs(5),
        }
    }
}

pub struct JobQueue {
    jetstream: jetstream::Context,
    config: QueueConfig,
}

impl JobQueue {
    pub async fn connect(config: QueueConfig) -> Result<Self, Error> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        tracing::info!(url = %config.url, "nats_connected");
        Ok(Self {
            jetstream: jetstream::new(client),
            config,
        })
    }

    fn stream_config(&self) -> stream::Config {
        stream::Config {
            name: self.config.stream.clone(),
            subjects: vec![self.config.subject.clone()],
            retention: stream::RetentionPolicy::WorkQueue,
            storage: stream::StorageType::File,
            ..Default::default()
        }
    }

    /// Idempotent stream setup, run once at startup.
    pub async fn ensure_stream(&self) -> Result<(), Error> {
        self.jetstream
            .get_or_create_stream(self.stream_config())
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;
        Ok(())
    }

    /// Messages currently waiting in the stream.
    pub async fn depth(&self) -> Result<u64, Error> {
        let mut stream = self
            .jetstream
            .get_stream(&self.config.stream)
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;
        let info = stream.info().await.map_err(|e| Error::Stream(e.to_string()))?;
        Ok(info.state.messages)
    }

    pub async fn publish_message(&self, message: &JobMessage, priority: u8) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(JOB_ID_HEADER, message.job_id.to_string().as_str());
        headers.insert(PUBLISHED_AT_HEADER, message.published_at.to_string().as_str());
        headers.insert(
            PRIORITY_HEADER,
            priority.min(MAX_PRIORITY).to_string().as_str(),
        );

        // Double await: the outer send, then the broker's persistence ack.
        self.jetstream
            .publish_with_headers(self.config.subject.clone(), headers, payload.into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        tracing::info!(job_id = %message.job_id, priority, "job_published");
        Ok(())
    }

    /// Build the shared durable pull consumer with `prefetch` as the bound
    /// on unacknowledged in-flight deliveries.
    pub async fn consumer(&self, prefetch: usize) -> Result<JobConsumer, Error> {
        let stream = self
            .jetstream
            .get_or_create_stream(self.stream_config())
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable,
                consumer::pull::Config {
                    durable_name: Some(self.config.durable.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    max_ack_pending: prefetch as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Consumer(e.to_string()))?;

        Ok(JobConsumer {
            consumer,
            requeue_delay: self.config.requeue_delay,
        })
    }
}

#[async_trait]
impl JobPublisher for JobQueue {
    async fn publish(&self, message: &JobMessage, priority: u8) -> PipelineResult<()> {
        self.publish_message(message, priority)
            .await
            .map_err(PipelineError::broker)
    }
}

pub struct JobConsumer {
    consumer: consumer::PullConsumer,
    requeue_delay: Duration,
}

impl JobConsumer {
    pub async fn deliveries(&self) -> Result<DeliveryStream, Error> {
        let messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| Error::Consumer(e.to_string()))?;
        Ok(DeliveryStream {
            inner: messages,
            requeue_delay: self.requeue_delay,
        })
    }
}

pub struct DeliveryStream {
    inner: consumer::pull::Stream,
    requeue_delay: Duration,
}

impl DeliveryStream {
    pub async fn next(&mut self) -> Option<Result<Delivery, Error>> {
        let item = self.inner.next().await?;
        Some(
            item.map(|message| Delivery {
                message,
                requeue_delay: self.requeue_delay,
            })
            .map_err(|e| Error::Consumer(e.to_string())),
        )
    }
}

/// One leased message. In flight until exactly one of `ack`, `requeue` or
/// `reject` runs; if the process dies first, the broker redelivers.
pub struct Delivery {
    message: jetstream::Message,
    requeue_delay: Duration,
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub fn job_id_header(&self) -> Option<&str> {
        self.message
            .headers
            .as_ref()
            .and_then(|h| h.get(JOB_ID_HEADER))
            .map(|v| v.as_str())
    }

    /// How many times the broker has handed this message out, this
    /// delivery included.
    pub fn delivered_count(&self) -> u64 {
        self.message.info().map(|i| i.delivered as u64).unwrap_or(1)
    }

    pub async fn ack(&self) -> Result<(), Error> {
        self.message
            .ack()
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }

    pub async fn requeue(&self) -> Result<(), Error> {
        self.message
            .ack_with(AckKind::Nak(Some(self.requeue_delay)))
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }

    pub async fn reject(&self) -> Result<(), Error> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }
}
