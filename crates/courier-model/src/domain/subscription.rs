use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// What a submitted link is registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionKind {
    /// Subscription URL, fetched and expanded by the remote service.
    Subscription,
    /// One or more proxy node URIs.
    Node,
}

/// Body of a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ss: Option<String>,
    /// Ask the service to test nodes before adding them.
    pub test: bool,
}

impl SubscriptionRequest {
    pub fn subscription(link: impl Into<String>) -> Self {
        Self {
            sub_url: Some(link.into()),
            ss: None,
            test: true,
        }
    }

    /// Nodes are submitted together, newline separated.
    pub fn nodes<S: AsRef<str>>(nodes: &[S]) -> Self {
        let joined = nodes
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            sub_url: None,
            ss: Some(joined),
            test: true,
        }
    }

    pub fn kind(&self) -> SubscriptionKind {
        if self.ss.is_some() {
            SubscriptionKind::Node
        } else {
            SubscriptionKind::Subscription
        }
    }
}

/// Node probing statistics reported by the registration service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub tested: u32,
    pub passed: u32,
    pub failed: u32,
    pub added: u32,
    /// Service-formatted duration such as `"1.5s"` or `"850ms"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionStats {
    /// A detection run counts as success when at least one node was added.
    pub fn is_success(&self) -> bool {
        self.added > 0
    }

    /// Duration in seconds, `0.0` when absent or unparseable.
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_deref().map(parse_duration_secs).unwrap_or(0.0)
    }
}

impl AddAssign<&DetectionStats> for DetectionStats {
    fn add_assign(&mut self, rhs: &DetectionStats) {
        self.tested += rhs.tested;
        self.passed += rhs.passed;
        self.failed += rhs.failed;
        self.added += rhs.added;
    }
}

fn parse_duration_secs(raw: &str) -> f64 {
    let raw = raw.trim();
    if let Some(ms) = raw.strip_suffix("ms") {
        return ms.trim().parse::<f64>().map(|v| v / 1000.0).unwrap_or(0.0);
    }
    if let Some(s) = raw.strip_suffix('s') {
        return s.trim().parse::<f64>().unwrap_or(0.0);
    }
    0.0
}

/// Classified response of the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubscriptionOutcome {
    /// Plain success without probing statistics.
    Accepted { message: String },
    /// Probing ran; success depends on [`DetectionStats::is_success`].
    Detection(DetectionStats),
    /// The link or node is already registered.
    Conflict { message: String },
    /// Any other failure.
    Error { message: String },
}

impl SubscriptionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            SubscriptionOutcome::Accepted { .. } => true,
            SubscriptionOutcome::Detection(stats) => stats.is_success(),
            SubscriptionOutcome::Conflict { .. } | SubscriptionOutcome::Error { .. } => false,
        }
    }

    pub fn stats(&self) -> Option<&DetectionStats> {
        match self {
            SubscriptionOutcome::Detection(stats) => Some(stats),
            _ => None,
        }
    }
}
