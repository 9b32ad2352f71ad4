use crate::config::ConfigError;
use crate::port::PortError;
use crate::report::Field;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Every way a test run can fail.
///
/// A failed *test* is not an error: a run whose report says `FAILED` still
/// produces a complete [`crate::report::TestReport`]. These variants are
/// failures to obtain one.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The resolver never produced an openable device.
    #[error("device not found after {attempts} attempt(s)")]
    DeviceNotFound { attempts: u32 },

    /// The requested secondary monitoring port could not be opened.
    #[error("failed to open secondary serial port {port}: {source}")]
    SecondaryChannelStart {
        port: String,
        #[source]
        source: PortError,
    },

    /// Writing the trigger command failed.
    #[error("failed to send trigger command: {0}")]
    Trigger(#[source] PortError),

    /// The primary stream broke before every required field was seen.
    #[error("error reading device output: {0}")]
    Stream(#[source] PortError),

    /// The stream ended without every required field.
    #[error("failed to parse output, missing: {}", join_fields(.missing))]
    Parse { missing: Vec<Field> },

    /// A field line matched but its value could not be extracted.
    #[error("failed to extract {field} from line {line:?}")]
    Extract { field: Field, line: String },

    /// Writing an output artifact failed.
    #[error("failed to write artifact '{}': {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join(", ")
}
