//! Run records and reports

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::common::{Error, Result};
use crate::scenario::StepKind;

/// What happened at one step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based position in the scenario
    pub index: usize,
    pub kind: StepKind,
    pub description: String,
    pub elapsed_ms: u64,
    /// Error the step was expected to produce, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_failure: Option<String>,
    /// Step output, unless the step opted out of saving it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Outcome of one scenario run
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub steps_total: usize,
    /// Records of the steps that completed, in order
    pub records: Vec<StepRecord>,
    pub elapsed: Duration,
    /// The error that aborted the run
    pub error: Option<Error>,
}

/// Serializable view of a [`ScenarioReport`]
#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub name: &'a str,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: &'a [StepRecord],
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// Steps attempted, counting the one in flight when the run failed
    ///
    /// A background failure is attributed to the earlier step that launched
    /// it, so only an index past the completed records counts as attempted.
    pub fn steps_run(&self) -> usize {
        let completed = self.records.len();
        match self.error.as_ref().and_then(Error::step_index) {
            Some(index) if index > completed => index,
            _ => completed,
        }
    }

    pub fn summary(&self) -> ReportSummary<'_> {
        ReportSummary {
            name: &self.name,
            passed: self.passed(),
            steps_run: self.steps_run(),
            steps_total: self.steps_total,
            elapsed_ms: self.elapsed.as_millis() as u64,
            failed_step: self.error.as_ref().and_then(Error::step_index),
            error: self.error.as_ref().map(ToString::to_string),
            steps: &self.records,
        }
    }

    /// Write the summary as JSON into `dir`, returning the file path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", file_stem(&self.name)));
        let json = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Fail with the aborting error, if any
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize) -> StepRecord {
        StepRecord {
            index,
            kind: StepKind::Sleep,
            description: "sleep 5s".to_string(),
            elapsed_ms: 5000,
            expected_failure: None,
            output: None,
        }
    }

    #[test]
    fn test_failed_report_counts_failing_step() {
        let report = ScenarioReport {
            name: "basic dns".to_string(),
            steps_total: 11,
            records: vec![record(1), record(2)],
            elapsed: Duration::from_secs(10),
            error: Some(Error::ExpectationMismatch.at_step(3, StepKind::ExecInPod)),
        };
        assert!(!report.passed());
        assert_eq!(report.steps_run(), 3);
        assert_eq!(report.summary().failed_step, Some(3));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_background_failure_counts_completed_steps() {
        let report = ScenarioReport {
            name: "tunnel died".to_string(),
            steps_total: 7,
            records: (1..=5).map(record).collect(),
            elapsed: Duration::from_secs(9),
            error: Some(
                Error::Execution("tunnel died".to_string()).at_step(1, StepKind::PortForward),
            ),
        };
        assert_eq!(report.steps_run(), 5);
        let summary = report.summary();
        assert_eq!(summary.steps_run, 5);
        assert_eq!(summary.failed_step, Some(1));
    }

    #[test]
    fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = ScenarioReport {
            name: "basic dns: valid domain".to_string(),
            steps_total: 1,
            records: vec![record(1)],
            elapsed: Duration::from_millis(1),
            error: None,
        };
        let path = report.save(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "basic_dns__valid_domain.json");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["passed"], true);
        assert_eq!(json["steps"][0]["kind"], "sleep");
        assert!(json.get("error").is_none());
    }
}
