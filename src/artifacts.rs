//! Persisting a finished run for the CI job.

use crate::config::OutputConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::report::TestReport;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// JSON document written next to the transcripts.
#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    passed: bool,
    #[serde(flatten)]
    report: &'a TestReport,
}

fn write_file(path: &Path, contents: &[u8]) -> HarnessResult<()> {
    std::fs::write(path, contents).map_err(|source| HarnessError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the transcripts (and the JSON report if enabled). Returns the paths
/// written, primary transcript first.
pub fn write_artifacts(report: &TestReport, output: &OutputConfig) -> HarnessResult<Vec<PathBuf>> {
    std::fs::create_dir_all(&output.dir).map_err(|source| HarnessError::Artifact {
        path: output.dir.clone(),
        source,
    })?;

    let mut written = Vec::new();

    let path = output.transcript_path();
    write_file(&path, report.transcript().as_bytes())?;
    written.push(path);

    if let Some(secondary) = report.secondary_transcript() {
        let path = output.secondary_path();
        write_file(&path, secondary.as_bytes())?;
        written.push(path);
    }

    if output.write_json {
        let path = output.report_path();
        let document = ReportDocument {
            passed: report.passed(),
            report,
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|e| HarnessError::Artifact {
            path: path.clone(),
            source: e.into(),
        })?;
        write_file(&path, &json)?;
        written.push(path);
    }

    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}
