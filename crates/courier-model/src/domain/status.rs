use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BatchId, ChatId, MessageId, UserId};

const CANCEL_PREFIX: &str = "cancel_batch";

/// Location of a rendered status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHandle {
    pub chat: ChatId,
    pub message: MessageId,
}

/// Inline "cancel" button attached to a batch status message.
///
/// Encoded as `cancel_batch_<user>_<batch>` in the button callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAffordance {
    pub user: UserId,
    pub batch: BatchId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CancelAffordanceError {
    #[error("not a cancel payload: {0}")]
    Malformed(String),
}

impl CancelAffordance {
    pub fn new(user: UserId, batch: BatchId) -> Self {
        Self { user, batch }
    }

    /// Button label.
    pub fn label(&self) -> &'static str {
        "🛑 Cancel all tasks"
    }

    /// Callback payload carried by the button.
    pub fn callback_data(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CancelAffordance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CANCEL_PREFIX}_{}_{}", self.user, self.batch)
    }
}

impl FromStr for CancelAffordance {
    type Err = CancelAffordanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CancelAffordanceError::Malformed(s.to_string());

        let rest = s
            .strip_prefix(CANCEL_PREFIX)
            .and_then(|r| r.strip_prefix('_'))
            .ok_or_else(malformed)?;
        // user ids may be negative, so split on the last separator.
        let (user, batch) = rest.rsplit_once('_').ok_or_else(malformed)?;
        let user = user.parse::<i64>().map_err(|_| malformed())?;
        let batch = batch.parse::<u64>().map_err(|_| malformed())?;

        Ok(Self::new(UserId(user), BatchId(batch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_data_format() {
        let affordance = CancelAffordance::new(UserId(1001), BatchId(4));
        assert_eq!(affordance.callback_data(), "cancel_batch_1001_4");
    }

    #[test]
    fn parse_accepts_own_format() {
        let parsed: CancelAffordance = "cancel_batch_1001_4".parse().unwrap();
        assert_eq!(parsed, CancelAffordance::new(UserId(1001), BatchId(4)));

        let negative: CancelAffordance = "cancel_batch_-77_2".parse().unwrap();
        assert_eq!(negative.user, UserId(-77));
    }

    #[test]
    fn parse_rejects_garbage() {
        for data in ["", "cancel_batch", "cancel_batch_1", "retry_batch_1_2", "cancel_batch_x_2", "cancel_batch_1_-2"] {
            assert!(data.parse::<CancelAffordance>().is_err(), "{data}");
        }
    }
}
