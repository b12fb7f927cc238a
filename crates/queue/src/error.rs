#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("nats connect failed: {0}")]
    Connect(String),

    #[error("stream operation failed: {0}")]
    Stream(String),

    #[error("consumer operation failed: {0}")]
    Consumer(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("ack failed: {0}")]
    Ack(String),

    #[error(transparent)]
    Payload(#[from] serde_json::Error),
}
