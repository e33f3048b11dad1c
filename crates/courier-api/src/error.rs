use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user {0} is not allowed")]
    Unauthorized(courier_model::UserId),

    #[error("status message failed: {0}")]
    StatusMessage(#[source] courier_exec::ExecError),

    #[error("verification failed: {0}")]
    Verify(#[from] courier_verify::VerifyError),

    #[cfg(feature = "http")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subscription api not configured")]
    NotConfigured,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("core error: {0}")]
    Core(#[from] courier_core::CoreError),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("batch driver failed: {err}"))
    }
}
