use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

const BOT_TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN";
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY";
const ADD_URL_PLACEHOLDER: &str = "YOUR_API_ADD_URL";
const MIN_BOT_TOKEN_LEN: usize = 20;

/// Top-level agent configuration, loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub bot: BotConfig,
    pub monitor: MonitorConfig,
    pub executor: ExecutorConfig,
    pub verify: VerifyConfig,
    pub logger: LoggerSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Re-send content as new messages.
    #[default]
    Clone,
    /// Native forward keeping the original author.
    Direct,
}

impl ForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Clone => "clone",
            ForwardMode::Direct => "direct",
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    pub token: String,
    /// Users allowed to submit work; empty means everyone.
    pub allowed_users: Vec<i64>,
    /// Default destination chat for forwarded items.
    pub forward_target: i64,
    pub forward_mode: ForwardMode,
}

impl BotConfig {
    /// Empty allow-list admits everyone.
    pub fn is_user_allowed(&self, user: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionApiConfig {
    pub api_key: String,
    pub add_url: String,
}

impl SubscriptionApiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
            && self.api_key != API_KEY_PLACEHOLDER
            && !self.add_url.is_empty()
            && self.add_url != ADD_URL_PLACEHOLDER
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Protocols of subscription links, e.g. `"https://"`.
    pub subs: Vec<String>,
    /// Protocols of proxy node URIs, e.g. `"vmess://"`.
    pub ss: Vec<String>,
    /// Keywords a message must contain for its subscription links to count.
    pub content_filter: Vec<String>,
    pub link_blacklist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub subscription_api: SubscriptionApiConfig,
    pub channels: Vec<i64>,
    pub whitelist_channels: Vec<i64>,
    pub filters: FilterConfig,
    /// Messages fetched from each channel on startup; `0` disables it.
    pub fetch_history_count: u32,
    pub cache_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            subscription_api: SubscriptionApiConfig::default(),
            channels: Vec::new(),
            whitelist_channels: Vec::new(),
            filters: FilterConfig::default(),
            fetch_history_count: 0,
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub inter_task_delay_ms: u64,
    pub link_render_interval_ms: u64,
    pub bulk_render_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            inter_task_delay_ms: 1_000,
            link_render_interval_ms: 1_000,
            bulk_render_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub workers: usize,
    pub call_delay_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            call_delay_ms: 10,
        }
    }
}

/// Raw logger settings; parsed into a logger config by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSection {
    pub format: String,
    pub level: String,
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            level: "info".to_string(),
        }
    }
}

impl CourierConfig {
    /// Read and parse a YAML file. Does not call [`CourierConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, CoreError> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.check_limits()?;
        Ok(cfg)
    }

    /// Disable features whose settings are missing or left as placeholders.
    ///
    /// Returns one warning per feature switched off while it was enabled.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        let token = self.bot.token.trim();
        if token.is_empty() || token == BOT_TOKEN_PLACEHOLDER || token.len() < MIN_BOT_TOKEN_LEN {
            if self.bot.enabled {
                warnings.push("bot token missing or invalid, bot disabled".to_string());
            }
            self.bot.enabled = false;
        }

        let mut monitor_valid = true;
        if !self.monitor.subscription_api.is_configured() {
            monitor_valid = false;
            if self.monitor.enabled {
                warnings.push("subscription api not configured, monitor disabled".to_string());
            }
        }
        if self.monitor.channels.is_empty() {
            monitor_valid = false;
            if self.monitor.enabled {
                warnings.push("no channels to monitor, monitor disabled".to_string());
            }
        }
        if !monitor_valid {
            self.monitor.enabled = false;
        }

        if !self.bot.enabled && !self.monitor.enabled {
            warn!(target: "courier.core.config", "all features are disabled");
        }
        warnings
    }

    pub fn is_user_allowed(&self, user: i64) -> bool {
        self.bot.is_user_allowed(user)
    }

    fn check_limits(&self) -> Result<(), CoreError> {
        if self.monitor.cache_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "monitor.cache_capacity must be greater than 0".into(),
            ));
        }
        if self.verify.workers == 0 {
            return Err(CoreError::InvalidConfig(
                "verify.workers must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
