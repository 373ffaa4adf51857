use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::validation::{file_name, sorted_entries};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Deletes intermediate registration artifacts from `dir`. With `keep_final`,
/// files ending in the final suffix survive.
///
/// The directory must be flat: a sub-directory aborts the cleanup before any
/// file is removed.
pub fn cleanup_intermediate(
    dir: &Path,
    keep_final: bool,
    naming: &NamingContract,
) -> Result<CleanupReport, PipelineError> {
    info!(dir = %dir.display(), keep_final, "Cleaning intermediate files");

    let entries = sorted_entries(dir)?;
    for entry in &entries {
        let metadata = fs::symlink_metadata(entry)
            .map_err(|err| PipelineError::io_at("inspect", entry, err))?;
        if metadata.is_dir() {
            return Err(PipelineError::UnexpectedDirectory {
                path: entry.clone(),
            });
        }
    }

    let mut report = CleanupReport::default();
    for entry in entries {
        if keep_final && naming.is_final(&file_name(&entry)) {
            info!(file = %entry.display(), "Keeping final registered image");
            report.kept.push(entry);
            continue;
        }
        info!(file = %entry.display(), "Removing intermediate file");
        fs::remove_file(&entry).map_err(|err| PipelineError::io_at("remove", &entry, err))?;
        report.removed.push(entry);
    }

    Ok(report)
}
