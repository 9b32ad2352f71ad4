//! The structured outcome of one observed test run.

use super::fields::{extract_signed, extract_status, extract_unsigned, Field, FieldMatches};
use crate::error::{HarnessError, HarnessResult};
use serde::Serialize;

/// Status token the device prints for a clean run.
pub const PASSED_STATUS: &str = "PASSED";

/// Final result of a test run.
///
/// Only [`TestReport::from_matches`] builds one, and only when every field
/// slot is filled, so a report in hand always carries all four values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    total_tests: u32,
    failed_tests: u32,
    consumed_time_ms: u64,
    leaked_bytes: i64,
    status: String,
    transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_transcript: Option<String>,
}

fn field_line(matches: &FieldMatches, field: Field) -> HarnessResult<&str> {
    matches.get(field).ok_or_else(|| HarnessError::Parse {
        missing: matches.missing(),
    })
}

fn extracted<T>(field: Field, line: &str, value: Option<T>) -> HarnessResult<T> {
    value.ok_or_else(|| HarnessError::Extract {
        field,
        line: line.to_string(),
    })
}

impl TestReport {
    pub fn from_matches(
        matches: &FieldMatches,
        total_tests: u32,
        transcript: String,
    ) -> HarnessResult<Self> {
        if !matches.is_complete() {
            return Err(HarnessError::Parse {
                missing: matches.missing(),
            });
        }

        let line = field_line(matches, Field::FailedTests)?;
        let failed_tests = extracted(Field::FailedTests, line, extract_unsigned(line))?;

        let line = field_line(matches, Field::ConsumedTimeMs)?;
        let consumed_time_ms = extracted(Field::ConsumedTimeMs, line, extract_unsigned(line))?;

        let line = field_line(matches, Field::LeakedBytes)?;
        let leaked_bytes = extracted(Field::LeakedBytes, line, extract_signed(line))?;

        let line = field_line(matches, Field::Status)?;
        let status = extracted(Field::Status, line, extract_status(line))?;

        Ok(Self {
            total_tests,
            failed_tests,
            consumed_time_ms,
            leaked_bytes,
            status,
            transcript,
            secondary_transcript: None,
        })
    }

    /// Attach the secondary channel's transcript.
    pub fn with_secondary_transcript(mut self, transcript: String) -> Self {
        self.secondary_transcript = Some(transcript);
        self
    }

    /// Number of lines that reported a finished test case.
    pub fn total_tests(&self) -> u32 {
        self.total_tests
    }

    pub fn failed_tests(&self) -> u32 {
        self.failed_tests
    }

    pub fn consumed_time_ms(&self) -> u64 {
        self.consumed_time_ms
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.consumed_time_ms as f64 / 1000.0
    }

    /// Bytes the device failed to free. Negative values are possible.
    pub fn leaked_bytes(&self) -> i64 {
        self.leaked_bytes
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn secondary_transcript(&self) -> Option<&str> {
        self.secondary_transcript.as_deref()
    }

    /// Pass iff nothing failed and the device says so. Leaks never fail a run.
    pub fn passed(&self) -> bool {
        self.failed_tests == 0 && self.status == PASSED_STATUS
    }

    /// Single summary line in GitHub Actions annotation format.
    ///
    /// Elapsed time is seconds with exactly three decimals (`15.000 s`,
    /// `0.842 s`); the other values are plain integers.
    pub fn ci_notice(&self) -> String {
        format!(
            "::notice:: Total tests: {} Failed tests: {} Status: {} Elapsed time: {:.3} s Memory leak: {} bytes",
            self.total_tests,
            self.failed_tests,
            self.status,
            self.elapsed_secs(),
            self.leaked_bytes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matches_of(lines: &[&str]) -> FieldMatches {
        let mut matches = FieldMatches::new();
        for line in lines {
            matches.offer(line);
        }
        matches
    }

    #[test]
    fn test_report_requires_every_field() {
        let matches = matches_of(&["Failed tests: 0", "Consumed: 5", "Leaked: 0"]);
        match TestReport::from_matches(&matches, 0, String::new()) {
            Err(HarnessError::Parse { missing }) => assert_eq!(missing, vec![Field::Status]),
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_report_extracts_values() {
        let matches = matches_of(&[
            "Failed tests: 2",
            "Consumed: 1532",
            "Leaked: -24",
            "Status: FAILED",
        ]);
        let report = TestReport::from_matches(&matches, 9, "log".to_string()).unwrap();

        assert_eq!(report.total_tests(), 9);
        assert_eq!(report.failed_tests(), 2);
        assert_eq!(report.consumed_time_ms(), 1532);
        assert_eq!(report.leaked_bytes(), -24);
        assert_eq!(report.status(), "FAILED");
        assert_eq!(report.transcript(), "log");
        assert_eq!(report.secondary_transcript(), None);
        assert!(!report.passed());
    }

    #[test]
    fn test_overflowing_value_is_extract_error() {
        let matches = matches_of(&[
            "Failed tests: 99999999999",
            "Consumed: 1",
            "Leaked: 0",
            "Status: PASSED",
        ]);
        assert!(matches!(
            TestReport::from_matches(&matches, 0, String::new()),
            Err(HarnessError::Extract {
                field: Field::FailedTests,
                ..
            })
        ));
    }

    #[test]
    fn test_pass_policy_ignores_leaks() {
        let matches = matches_of(&[
            "Failed tests: 0",
            "Consumed: 842",
            "Leaked: 128",
            "Status: PASSED",
        ]);
        let report = TestReport::from_matches(&matches, 2, String::new()).unwrap();
        assert!(report.passed());
    }

    #[test]
    fn test_ci_notice_format() {
        let matches = matches_of(&[
            "Failed tests: 0",
            "Consumed: 842",
            "Leaked: 0",
            "Status: PASSED",
        ]);
        let report = TestReport::from_matches(&matches, 2, String::new()).unwrap();
        assert_eq!(
            report.ci_notice(),
            "::notice:: Total tests: 2 Failed tests: 0 Status: PASSED Elapsed time: 0.842 s Memory leak: 0 bytes"
        );
    }

    #[test]
    fn test_ci_notice_keeps_three_decimals_for_whole_seconds() {
        let matches = matches_of(&[
            "Failed tests: 0",
            "Consumed: 15000",
            "Leaked: 0",
            "Status: PASSED",
        ]);
        let report = TestReport::from_matches(&matches, 1, String::new()).unwrap();
        assert!(report.ci_notice().contains("Elapsed time: 15.000 s "));
    }

    #[test]
    fn test_secondary_transcript_is_serialized_only_when_present() {
        let matches = matches_of(&[
            "Failed tests: 0",
            "Consumed: 1",
            "Leaked: 0",
            "Status: PASSED",
        ]);
        let report = TestReport::from_matches(&matches, 0, "a".to_string()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("secondary_transcript").is_none());

        let json = serde_json::to_value(report.with_secondary_transcript("b".into())).unwrap();
        assert_eq!(json["secondary_transcript"], "b");
    }
}
