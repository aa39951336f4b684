use thiserror::Error;

/// Failure talking to the coordination store.
///
/// Every store operation is a single command, so there is no partial
/// success to report: either the command happened or the store was
/// unreachable. The backend error is kept as the source when one exists.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[derive(Debug, Error)]
pub enum WeirError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("handler: {0}")]
    Handler(String),
}
