use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{
    FailurePolicy, StageKind, StageReport, StageRunner, absolute, ensure_dir, matching_inputs,
    run_item,
};
use crate::command::{CommandExecutor, Invocation};
use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::validation::file_name;

/// Runs the skull-strip script once per input image:
/// `<script> <abs input> <abs output>`.
pub struct SkullStripStage {
    pub script: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub naming: NamingContract,
}

impl StageRunner for SkullStripStage {
    fn kind(&self) -> StageKind {
        StageKind::SkullStrip
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FatalOnAnyFailure
    }

    fn run(&self, executor: &dyn CommandExecutor) -> Result<StageReport, PipelineError> {
        info!(
            source = %self.source_dir.display(),
            target = %self.target_dir.display(),
            "Running skull-strip, this may take a long time"
        );
        let target_dir = ensure_dir(&self.target_dir)?;

        match ensure_executable(&self.script) {
            Ok(true) => info!(script = %self.script.display(), "Added execute permission"),
            Ok(false) => {}
            Err(err) => warn!(
                script = %self.script.display(),
                error = %err,
                "Could not set execute permission"
            ),
        }

        let mut report = StageReport::new(self.kind());
        for input in matching_inputs(&self.source_dir, &self.naming)? {
            let output = target_dir.join(file_name(&input));
            let invocation = Invocation::new(&self.script)
                .arg(absolute(&input)?)
                .arg(&output);
            run_item(
                self.failure_policy(),
                executor,
                &invocation,
                &input,
                &mut report,
            )?;
        }

        if report.completed.is_empty() {
            warn!(
                source = %self.source_dir.display(),
                "Skull-strip found no matching images"
            );
        }
        Ok(report)
    }
}

/// Adds the execute bits to `path` when any are missing. Returns whether the
/// permissions changed.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0o111 {
        return Ok(false);
    }
    permissions.set_mode(mode | 0o111);
    fs::set_permissions(path, permissions)?;
    Ok(true)
}

#[cfg(not(unix))]
fn ensure_executable(path: &Path) -> io::Result<bool> {
    fs::metadata(path).map(|_| false)
}
