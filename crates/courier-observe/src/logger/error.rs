use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format `{0}` (use text, json or journald)")]
    InvalidFormat(String),
    #[error("invalid log level `{level}`: {reason}")]
    InvalidLogLevel { level: String, reason: String },
    #[error("journald output needs linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("journald socket unavailable: {0}")]
    Journald(#[source] std::io::Error),
    #[error("a global logger is already installed")]
    AlreadyInitialized,
    #[error("logger setup failed: {0}")]
    InitializationFailed(String),
}
