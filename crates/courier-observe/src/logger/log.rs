//! Global subscriber setup: one env filter plus one output layer picked by format.

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::{Directive, ParseError},
    fmt::{self, time::OffsetTime},
    layer::{Layered, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// HTTP stack crates that log every request; held at `warn` unless the level names them.
const QUIET_DEPS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

type Filtered = Layered<EnvFilter, Registry>;
type Output = Box<dyn Layer<Filtered> + Send + Sync>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(cfg.level.as_str())?;
    let output = mk_output(cfg)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(as_error)
}

fn mk_output(cfg: &LoggerConfig) -> Result<Output, LoggerError> {
    match cfg.format {
        LoggerFormat::Text => Ok(fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
            .boxed()),
        LoggerFormat::Json => Ok(fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
            .boxed()),
        LoggerFormat::Journald => mk_journald(),
    }
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let invalid = |reason: String| LoggerError::InvalidLogLevel {
        level: level.to_string(),
        reason,
    };
    let mut filter = EnvFilter::try_new(level).map_err(|e| invalid(e.to_string()))?;
    for dep in QUIET_DEPS.iter().filter(|dep| !mentions(level, dep)) {
        let directive: Directive = format!("{dep}=warn")
            .parse()
            .map_err(|e: ParseError| invalid(e.to_string()))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// True if some directive of `level` targets `krate` (or one of its modules).
fn mentions(level: &str, krate: &str) -> bool {
    level.split(',').any(|directive| {
        directive
            .trim()
            .split(['=', ':', '['])
            .next()
            .is_some_and(|target| target == krate)
    })
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(err: TryInitError) -> LoggerError {
    let msg = err.to_string();
    if is_already_set(&msg) {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(msg)
    }
}

// Both the dispatcher and the `log` bridge report a second install this way.
fn is_already_set(msg: &str) -> bool {
    msg.contains("already been set") || msg.contains("already initialized")
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald() -> Result<Output, LoggerError> {
    let layer = tracing_journald::layer().map_err(LoggerError::Journald)?;
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald() -> Result<Output, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_targets_are_matched_exactly() {
        assert!(mentions("info,hyper=debug", "hyper"));
        assert!(mentions(" reqwest::connect=trace ", "reqwest"));
        assert!(!mentions("hyper_util=debug", "hyper"));
        assert!(!mentions("debug", "hyper"));
    }

    #[test]
    fn filter_keeps_explicit_dependency_levels() {
        let filter = mk_filter("courier=debug,h2=trace").unwrap().to_string();
        assert!(filter.contains("courier=debug"));
        assert!(filter.contains("h2=trace"));
        assert!(!filter.contains("h2=warn"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn bad_level_reports_directive() {
        let err = mk_filter("courier=shout").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidLogLevel { level, .. } if level == "courier=shout"));
    }

    #[test]
    fn second_install_is_rejected() {
        let cfg = LoggerConfig {
            use_color: false,
            ..LoggerConfig::default()
        };
        let _ = install(&cfg);
        assert!(matches!(install(&cfg), Err(LoggerError::AlreadyInitialized)));
    }

    #[test]
    fn already_set_messages() {
        assert!(is_already_set("a global default trace dispatcher has already been set"));
        assert!(is_already_set(
            "attempted to set a logger after the logging system was already initialized"
        ));
        assert!(!is_already_set("permission denied"));
    }
}
