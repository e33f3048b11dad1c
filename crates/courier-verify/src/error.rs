use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("nothing to verify")]
    Empty,
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("export has no chat id")]
    MissingChatId,
    #[error("invalid export: {0}")]
    Export(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker channel closed")]
    Closed,
}
