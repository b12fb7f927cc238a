use aws_sdk_s3::error::DisplayErrorContext;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid blob store configuration: {0}")]
    Config(String),

    #[error("s3 {operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    pub(crate) fn sdk<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Sdk {
            operation,
            // DisplayErrorContext walks the source chain, which is where
            // the SDK hides the actual service response.
            message: format!("{}", DisplayErrorContext(err)),
        }
    }
}
