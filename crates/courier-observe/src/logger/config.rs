use std::io::IsTerminal;

use courier_core::LoggerSection;

use crate::logger::{error::LoggerError, format::LoggerFormat, level::LoggerLevel};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: LoggerLevel,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Build a config from the raw strings of the `logger` config section.
    pub fn from_parts(format: &str, level: &str) -> Result<Self, LoggerError> {
        Ok(Self {
            format: format.parse()?,
            level: LoggerLevel::new(level)?,
            ..Self::default()
        })
    }
}

impl TryFrom<&LoggerSection> for LoggerConfig {
    type Error = LoggerError;

    fn try_from(section: &LoggerSection) -> Result<Self, Self::Error> {
        Self::from_parts(&section.format, &section.level)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: LoggerLevel::default(),
            with_targets: true,
            use_color,
        }
    }
}
