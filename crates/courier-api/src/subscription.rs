use async_trait::async_trait;
use courier_model::{DetectionStats, SubscriptionKind, SubscriptionOutcome, SubscriptionRequest};
use serde::Deserialize;

use crate::error::ApiError;

/// Registers subscription links and proxy nodes with the remote service.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    async fn submit(&self, request: SubscriptionRequest) -> Result<SubscriptionOutcome, ApiError>;
}

/// Wire shape of a registration response; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResponse {
    message: String,
    error: String,
    tested_nodes: Option<u32>,
    passed_nodes: Option<u32>,
    failed_nodes: Option<u32>,
    added_nodes: Option<u32>,
    duration: String,
    timeout: Option<bool>,
    warning: String,
}

impl RawResponse {
    fn detection(self) -> Option<DetectionStats> {
        let tested = self.tested_nodes?;
        let timed_out = self.timeout.unwrap_or(false);
        Some(DetectionStats {
            tested,
            passed: self.passed_nodes.unwrap_or(0),
            failed: self.failed_nodes.unwrap_or(0),
            added: self.added_nodes.unwrap_or(0),
            duration: non_empty(self.duration),
            warning: if timed_out { non_empty(self.warning) } else { None },
            error: non_empty(self.error),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

fn noun(kind: SubscriptionKind) -> &'static str {
    match kind {
        SubscriptionKind::Subscription => "subscription",
        SubscriptionKind::Node => "node",
    }
}

/// Map an HTTP status and body to an outcome.
///
/// A 200 carrying `tested_nodes` is a detection run, otherwise a plain
/// acceptance (non-JSON 200 bodies included). A 400 with `tested_nodes` is a
/// detection run that added nothing; 409 means already registered.
pub fn classify(kind: SubscriptionKind, status: u16, body: &str) -> SubscriptionOutcome {
    let noun = noun(kind);
    let Ok(raw) = serde_json::from_str::<RawResponse>(body) else {
        return if status == 200 {
            SubscriptionOutcome::Accepted {
                message: format!("{noun} added"),
            }
        } else {
            SubscriptionOutcome::Error {
                message: format!("{noun} rejected (status {status})"),
            }
        };
    };

    match status {
        200 | 400 if raw.tested_nodes.is_some() => match raw.detection() {
            Some(stats) => SubscriptionOutcome::Detection(stats),
            None => SubscriptionOutcome::Error {
                message: format!("{noun} rejected (status {status})"),
            },
        },
        200 => SubscriptionOutcome::Accepted {
            message: non_empty(raw.message).unwrap_or_else(|| format!("{noun} added")),
        },
        409 => SubscriptionOutcome::Conflict {
            message: non_empty(raw.error).unwrap_or_else(|| format!("{noun} already exists")),
        },
        _ => SubscriptionOutcome::Error {
            message: non_empty(raw.error)
                .or_else(|| non_empty(raw.message))
                .unwrap_or_else(|| format!("{noun} rejected (status {status})")),
        },
    }
}

/// Totals over several registration calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub stats: DetectionStats,
    pub duration_secs: f64,
}

impl SubmissionSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a SubscriptionOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.submitted += 1;
            if outcome.is_success() {
                summary.succeeded += 1;
            }
            if let Some(stats) = outcome.stats() {
                summary.stats += stats;
                summary.duration_secs += stats.duration_secs();
            }
        }
        summary
    }
}

#[cfg(feature = "http")]
pub use http::HttpSubscriptionClient;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_core::SubscriptionApiConfig;
    use courier_model::{SubscriptionOutcome, SubscriptionRequest};
    use tracing::{debug, info};

    use super::{SubscriptionClient, classify};
    use crate::error::ApiError;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// JSON-over-HTTP client authenticating with an `X-API-Key` header.
    #[derive(Debug, Clone)]
    pub struct HttpSubscriptionClient {
        http: reqwest::Client,
        add_url: String,
        api_key: String,
    }

    impl HttpSubscriptionClient {
        pub fn new(cfg: &SubscriptionApiConfig) -> Result<Self, ApiError> {
            if !cfg.is_configured() {
                return Err(ApiError::NotConfigured);
            }
            let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
            Ok(Self {
                http,
                add_url: cfg.add_url.clone(),
                api_key: cfg.api_key.clone(),
            })
        }
    }

    #[async_trait]
    impl SubscriptionClient for HttpSubscriptionClient {
        async fn submit(
            &self,
            request: SubscriptionRequest,
        ) -> Result<SubscriptionOutcome, ApiError> {
            let kind = request.kind();
            let response = self
                .http
                .post(&self.add_url)
                .header("X-API-Key", &self.api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status().as_u16();
            let body = response.text().await?;
            debug!(target: "courier.api.subscription", status, body = %body, "registration response");

            let outcome = classify(kind, status, &body);
            info!(target: "courier.api.subscription", ?kind, status, success = outcome.is_success(), "registration finished");
            Ok(outcome)
        }
    }
}
