//! Streaming parser for the device's unit test output.
//!
//! [`ReportParser`] is the pure state machine: it is fed decoded lines and
//! knows when all required fields have been seen. [`run`] drives it from a
//! [`Session`]: trigger, read line by line, stop once complete.

use super::fields::{Field, FieldMatches};
use super::model::TestReport;
use crate::error::{HarnessError, HarnessResult};
use crate::port::{PortError, Session};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Command that starts the on-device test run.
pub const TRIGGER_COMMAND: &[u8] = b"unit_tests\r";

/// The device terminates every output line with CR LF.
pub const LINE_DELIMITER: &[u8] = b"\r\n";

/// The device shell prompt, printed once the test command returns.
pub const PROMPT_MARKER: &[u8] = b">: ";

/// Printed once per finished test case (`test_name()`).
pub const TEST_COMPLETION_MARKER: &str = "()";

/// Accumulates lines until every required field has been matched.
#[derive(Debug, Default)]
pub struct ReportParser {
    matches: FieldMatches,
    total_tests: u32,
    lines: Vec<String>,
}

impl ReportParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one line. Returns true once every field has been matched.
    pub fn feed_line(&mut self, line: &str) -> bool {
        debug!(target: "device", "{line}");

        if line.contains(TEST_COMPLETION_MARKER) {
            self.total_tests += 1;
            info!("Test completed: {line}");
        }

        for field in self.matches.offer(line) {
            debug!(%field, "matched");
        }

        self.lines.push(line.to_string());
        self.matches.is_complete()
    }

    /// Append output captured after the summary, unless it is blank.
    pub fn append_trailing(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.lines.push(text.to_string());
        }
    }

    pub fn total_tests(&self) -> u32 {
        self.total_tests
    }

    pub fn is_complete(&self) -> bool {
        self.matches.is_complete()
    }

    pub fn missing(&self) -> Vec<Field> {
        self.matches.missing()
    }

    /// Lines joined with `\n`.
    pub fn transcript(&self) -> String {
        self.lines.join("\n")
    }

    pub fn finish(self) -> HarnessResult<TestReport> {
        if !self.matches.is_complete() {
            return Err(HarnessError::Parse {
                missing: self.matches.missing(),
            });
        }
        let transcript = self.transcript();
        TestReport::from_matches(&self.matches, self.total_tests, transcript)
    }
}

/// Knobs for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write [`TRIGGER_COMMAND`] before reading.
    pub send_trigger: bool,
    /// Longest wait for a single line; `None` relies on the device.
    pub line_timeout: Option<Duration>,
    /// Budget for the best-effort read up to the prompt.
    pub trailing_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            send_trigger: true,
            line_timeout: None,
            trailing_timeout: Duration::from_secs(2),
        }
    }
}

/// Trigger a test run on `session` and parse its output into a report.
pub fn run(session: &mut Session, options: &RunOptions) -> HarnessResult<TestReport> {
    if options.send_trigger {
        info!("Running unit tests");
        session
            .send(TRIGGER_COMMAND)
            .map_err(HarnessError::Trigger)?;
    }
    info!("Waiting for unit tests to complete");

    let mut parser = ReportParser::new();
    loop {
        match session.read_until(LINE_DELIMITER, true, options.line_timeout) {
            Ok(raw) => {
                if parser.feed_line(&String::from_utf8_lossy(&raw)) {
                    capture_trailing(session, &mut parser, options.trailing_timeout);
                    break;
                }
            }
            Err(PortError::EndOfStream) => {
                let rest = session.take_buffered();
                if !rest.is_empty() {
                    parser.feed_line(&String::from_utf8_lossy(&rest));
                }
                warn!(missing = ?parser.missing(), "device closed the stream");
                break;
            }
            Err(e) => {
                error!("Error reading output: {e}");
                return Err(HarnessError::Stream(e));
            }
        }
    }

    parser.finish()
}

fn capture_trailing(session: &mut Session, parser: &mut ReportParser, timeout: Duration) {
    match session.read_until(PROMPT_MARKER, true, Some(timeout)) {
        Ok(raw) => parser.append_trailing(&String::from_utf8_lossy(&raw)),
        Err(e) => debug!("no prompt after summary: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockSerialPort;
    use pretty_assertions::assert_eq;

    const PASSING_RUN: &[&str] = &[
        "test_a()",
        "test_b()",
        "Failed tests: 0",
        "Consumed: 842",
        "Leaked: 0",
        "Status: PASSED",
    ];

    fn device_output(lines: &[&str], prompt: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(LINE_DELIMITER);
        }
        if prompt {
            out.extend_from_slice(PROMPT_MARKER);
        }
        out
    }

    fn session_replying(lines: &[&str], prompt: bool) -> (MockSerialPort, Session) {
        let port = MockSerialPort::new("MOCK0");
        port.respond_to(TRIGGER_COMMAND, &device_output(lines, prompt));
        port.close_remote();
        let session = Session::new(Box::new(port.clone()));
        (port, session)
    }

    #[test]
    fn test_parser_completes_on_fourth_field() {
        let mut parser = ReportParser::new();
        assert!(!parser.feed_line("Failed tests: 0"));
        assert!(!parser.feed_line("Consumed: 1"));
        assert!(!parser.feed_line("Leaked: 0"));
        assert!(parser.feed_line("Status: PASSED"));
    }

    #[test]
    fn test_parser_counts_completion_markers() {
        let mut parser = ReportParser::new();
        parser.feed_line("test_furi_pipe()");
        parser.feed_line("some noise");
        parser.feed_line("test_storage()");
        assert_eq!(parser.total_tests(), 2);
    }

    #[test]
    fn test_trailing_blank_text_is_dropped() {
        let mut parser = ReportParser::new();
        parser.feed_line("x");
        parser.append_trailing("  \r\n");
        parser.append_trailing("\r\nbye");
        assert_eq!(parser.transcript(), "x\n\r\nbye");
    }

    #[test]
    fn test_run_end_to_end_pass() {
        let (port, mut session) = session_replying(PASSING_RUN, true);

        let report = run(&mut session, &RunOptions::default()).unwrap();

        assert_eq!(port.get_write_log(), vec![TRIGGER_COMMAND.to_vec()]);
        assert_eq!(report.total_tests(), 2);
        assert_eq!(report.failed_tests(), 0);
        assert_eq!(report.consumed_time_ms(), 842);
        assert_eq!(report.leaked_bytes(), 0);
        assert_eq!(report.status(), "PASSED");
        assert_eq!(report.transcript(), PASSING_RUN.join("\n"));
        assert!(report.passed());
    }

    #[test]
    fn test_run_end_to_end_failure_still_yields_report() {
        let lines = [
            "test_a()",
            "test_b()",
            "Failed tests: 3",
            "Consumed: 842",
            "Leaked: 0",
            "Status: FAILED",
        ];
        let (_port, mut session) = session_replying(&lines, true);

        let report = run(&mut session, &RunOptions::default()).unwrap();

        assert_eq!(report.failed_tests(), 3);
        assert_eq!(report.status(), "FAILED");
        assert!(!report.passed());
    }

    #[test]
    fn test_run_without_prompt_still_succeeds() {
        let (_port, mut session) = session_replying(PASSING_RUN, false);
        let report = run(&mut session, &RunOptions::default()).unwrap();
        assert!(report.passed());
    }

    #[test]
    fn test_run_appends_text_before_prompt() {
        let mut output = device_output(PASSING_RUN, false);
        output.extend_from_slice(b"Leak report done\r\n>: ");
        let port = MockSerialPort::new("MOCK0");
        port.respond_to(TRIGGER_COMMAND, &output);
        let mut session = Session::new(Box::new(port.clone()));

        let report = run(&mut session, &RunOptions::default()).unwrap();
        assert!(report
            .transcript()
            .ends_with("Status: PASSED\nLeak report done\r\n"));
    }

    #[test]
    fn test_missing_field_at_end_of_stream_is_parse_failure() {
        for skipped in Field::ALL {
            let lines: Vec<&str> = PASSING_RUN
                .iter()
                .copied()
                .filter(|line| !skipped.matches(line))
                .collect();
            let (_port, mut session) = session_replying(&lines, false);

            match run(&mut session, &RunOptions::default()) {
                Err(HarnessError::Parse { missing }) => assert_eq!(missing, vec![skipped]),
                other => panic!("expected parse failure for {skipped}, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_first_match_wins_across_stream() {
        let lines = [
            "Failed tests: 0",
            "Failed tests: 5",
            "Consumed: 10",
            "Leaked: 0",
            "Status: PASSED",
        ];
        let (_port, mut session) = session_replying(&lines, true);
        let report = run(&mut session, &RunOptions::default()).unwrap();
        assert_eq!(report.failed_tests(), 0);
    }

    #[test]
    fn test_unterminated_final_line_is_parsed() {
        let mut output = device_output(&PASSING_RUN[..5], false);
        output.extend_from_slice(b"Status: PASSED");
        let port = MockSerialPort::new("MOCK0");
        port.respond_to(TRIGGER_COMMAND, &output);
        port.close_remote();
        let mut session = Session::new(Box::new(port));

        let report = run(&mut session, &RunOptions::default()).unwrap();
        assert_eq!(report.status(), "PASSED");
    }

    #[test]
    fn test_read_error_is_stream_failure() {
        let port = MockSerialPort::new("MOCK0");
        port.respond_to(TRIGGER_COMMAND, b"test_a()\r\n");
        let mut session = Session::new(Box::new(port.clone()));
        port.fail_next_read(std::io::ErrorKind::BrokenPipe);

        assert!(matches!(
            run(&mut session, &RunOptions::default()),
            Err(HarnessError::Stream(PortError::Io(_)))
        ));
    }

    #[test]
    fn test_line_timeout_is_stream_failure() {
        let port = MockSerialPort::new("MOCK0");
        port.respond_to(TRIGGER_COMMAND, b"Failed tests: 0\r\n");
        let mut session = Session::new(Box::new(port));
        let options = RunOptions {
            line_timeout: Some(Duration::from_millis(20)),
            ..RunOptions::default()
        };

        assert!(matches!(
            run(&mut session, &options),
            Err(HarnessError::Stream(PortError::Timeout(_)))
        ));
    }

    #[test]
    fn test_without_trigger_nothing_is_written() {
        let port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&device_output(PASSING_RUN, true));
        let mut session = Session::new(Box::new(port.clone()));
        let options = RunOptions {
            send_trigger: false,
            ..RunOptions::default()
        };

        run(&mut session, &options).unwrap();
        assert!(port.get_write_log().is_empty());
    }
}
