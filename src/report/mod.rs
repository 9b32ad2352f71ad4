//! Turning the device's test output into a [`TestReport`].

pub mod fields;
pub mod model;
pub mod parser;

pub use fields::{Field, FieldMatches};
pub use model::{TestReport, PASSED_STATUS};
pub use parser::{
    run, ReportParser, RunOptions, LINE_DELIMITER, PROMPT_MARKER, TEST_COMPLETION_MARKER,
    TRIGGER_COMMAND,
};
