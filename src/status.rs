//! On-disk batch checkpoints.
//!
//! Each pipeline stage keeps a four-line status record so that a run can be
//! split across many short-lived invocations: layers done so far are never
//! redone, and the driver knows when the stage has finished. A missing
//! record simply means the stage has not started.

use crate::Result;
use std::fs;
use std::path::Path;

/// Progress record of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    /// Whether any batch of this stage has completed. Layer generation uses
    /// this to skip re-slicing parts on resumed runs.
    pub started: bool,
    /// Highest layer number already processed; 0 before the first batch.
    pub last_layer: i32,
    /// Whether the final layer has been processed.
    pub finished: bool,
    /// The stage's output folder, recorded for the driver.
    pub output_folder: String,
}

impl Default for StageStatus {
    fn default() -> Self {
        StageStatus {
            started: false,
            last_layer: 0,
            finished: false,
            output_folder: String::new(),
        }
    }
}

impl StageStatus {
    /// Read a status record, tolerating absence (a fresh run) and short or
    /// malformed files (treated as a fresh run as well).
    pub fn read(path: impl AsRef<Path>) -> StageStatus {
        let Ok(text) = fs::read_to_string(path) else {
            return StageStatus::default();
        };
        let mut lines = text.lines();
        let started = lines.next().and_then(|l| l.trim().parse::<i32>().ok());
        let last_layer = lines.next().and_then(|l| l.trim().parse::<i32>().ok());
        let finished = lines.next().and_then(|l| l.trim().parse::<i32>().ok());
        let output_folder = lines.next().unwrap_or("").to_string();
        match (started, last_layer, finished) {
            (Some(s), Some(l), Some(f)) => StageStatus {
                started: s != 0,
                last_layer: l,
                finished: f != 0,
                output_folder,
            },
            _ => StageStatus::default(),
        }
    }

    /// Write the record atomically: the new contents land under a temporary
    /// name and are renamed over the target, so a reader never observes a
    /// half-written checkpoint.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = format!(
            "{}\n{}\n{}\n{}\n",
            self.started as i32, self.last_layer, self.finished as i32, self.output_folder
        );
        let tmp = path.with_extension("status.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
