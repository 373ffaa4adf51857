use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::validation::{file_name, sorted_entries};

/// Renames every registered (`*Warped`, not `*InverseWarped`) image in `dir` to
/// the name the inference tool expects, returning the new paths in order.
///
/// Fails with [`PipelineError::NoRegisteredImages`] when no candidate exists,
/// and with [`PipelineError::RenameCollision`] before moving anything if a
/// target name is already taken.
pub fn rename_registered(
    dir: &Path,
    naming: &NamingContract,
) -> Result<Vec<PathBuf>, PipelineError> {
    info!(dir = %dir.display(), "Renaming registered images for inference");

    let entries = sorted_entries(dir)?;
    let plan: Vec<(PathBuf, PathBuf)> = entries
        .iter()
        .filter_map(|path| {
            naming
                .renamed(&file_name(path))
                .map(|new_name| (path.clone(), dir.join(new_name)))
        })
        .collect();

    if plan.is_empty() {
        let present: Vec<String> = entries
            .iter()
            .map(|path| file_name(path))
            .filter(|name| naming.matches_input(name))
            .collect();
        error!(
            dir = %dir.display(),
            marker = %naming.warped_marker,
            "No registered images were found"
        );
        for name in &present {
            error!("  - {name}");
        }
        return Err(PipelineError::NoRegisteredImages {
            dir: dir.to_path_buf(),
            present,
        });
    }

    let mut claimed = HashSet::new();
    for (from, to) in &plan {
        let leftover = to.exists();
        if leftover || !claimed.insert(to.clone()) {
            if leftover {
                warn!(
                    dir = %dir.display(),
                    target = %file_name(to),
                    "Target left over from an earlier run; clear this directory before rerunning"
                );
            }
            return Err(PipelineError::RenameCollision {
                from: from.clone(),
                to: to.clone(),
                leftover,
            });
        }
    }

    let mut renamed = Vec::with_capacity(plan.len());
    for (from, to) in plan {
        info!(from = %file_name(&from), to = %file_name(&to), "Renaming");
        fs::rename(&from, &to).map_err(|err| PipelineError::io_at("rename", &from, err))?;
        renamed.push(to);
    }

    info!(count = renamed.len(), "Images renamed for inference");
    Ok(renamed)
}
