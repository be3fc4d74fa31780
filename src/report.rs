//! Error-report files.
//!
//! Fatal errors are surfaced to operators as a plain-text report created in
//! the configuration file's directory, in addition to the process exit
//! code. Reports accumulate: a batch that fails several ways appends every
//! message before the driver exits.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::ERROR_REPORT_FILENAME;

/// Append one error entry to the report in `config_dir`, creating the file
/// on first use. `stage` names the component that failed (for example
/// `layer generation`).
pub fn append_error_report(config_dir: &Path, stage: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config_dir.join(ERROR_REPORT_FILENAME))?;
    writeln!(file, "Error in {stage}: {message}")
}

/// Remove any report left over from a prior run, so a fresh run's report
/// only contains fresh errors. Absence is not an error.
pub fn clear_error_report(config_dir: &Path) {
    let _ = std::fs::remove_file(config_dir.join(ERROR_REPORT_FILENAME));
}
