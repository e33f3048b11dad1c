use serde::{Deserialize, Serialize};

/// One identifier to check, tagged with its position in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationJob {
    pub index: usize,
    pub id: i64,
}

/// Outcome of checking one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub index: usize,
    pub id: i64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerificationResult {
    pub fn valid(job: VerificationJob) -> Self {
        Self {
            index: job.index,
            id: job.id,
            valid: true,
            message: None,
        }
    }

    pub fn invalid(job: VerificationJob, message: impl Into<String>) -> Self {
        Self {
            index: job.index,
            id: job.id,
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// The lowest-index invalid identifier of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstFailure {
    pub index: usize,
    pub id: i64,
    pub message: String,
}

/// Reconciled result of a verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// Number of identifiers submitted.
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Invalid identifiers in input order.
    pub invalid_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FirstFailure>,
    /// `false` when the run was cancelled before every job was processed.
    pub complete: bool,
}

impl VerificationReport {
    /// Number of results that arrived.
    pub fn processed(&self) -> usize {
        self.valid + self.invalid
    }

    /// Share of valid identifiers in percent of `total`.
    pub fn valid_ratio(&self) -> f64 {
        ratio(self.valid, self.total)
    }

    /// Share of invalid identifiers in percent of `total`.
    pub fn invalid_ratio(&self) -> f64 {
        ratio(self.invalid, self.total)
    }

    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_use_total() {
        let report = VerificationReport {
            total: 8,
            valid: 6,
            invalid: 2,
            invalid_ids: vec![3, 9],
            first_failure: None,
            complete: true,
        };
        assert_eq!(report.processed(), 8);
        assert!((report.valid_ratio() - 75.0).abs() < f64::EPSILON);
        assert!((report.invalid_ratio() - 25.0).abs() < f64::EPSILON);
        assert!(!report.is_clean());
    }

    #[test]
    fn empty_report_has_zero_ratio() {
        let report = VerificationReport::default();
        assert_eq!(report.valid_ratio(), 0.0);
        assert!(report.is_clean());
    }
}
