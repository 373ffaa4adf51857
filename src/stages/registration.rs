use std::path::PathBuf;

use tracing::{info, warn};

use super::{
    FailurePolicy, StageKind, StageReport, StageRunner, absolute, ensure_dir, matching_inputs,
    run_item,
};
use crate::command::{CommandExecutor, Invocation};
use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::validation::file_name;

/// Registers each skull-stripped image against the atlas:
/// `<tool> -d 3 -f <atlas> -m <abs input> -o <target>/<subject>`.
///
/// A failed registration only drops that subject; the renamer downstream
/// fails the run if nothing was registered at all.
pub struct RegistrationStage {
    pub executable: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub atlas_path: PathBuf,
    pub naming: NamingContract,
}

impl StageRunner for RegistrationStage {
    fn kind(&self) -> StageKind {
        StageKind::Registration
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::ContinueOnItemFailure
    }

    fn run(&self, executor: &dyn CommandExecutor) -> Result<StageReport, PipelineError> {
        info!(
            source = %self.source_dir.display(),
            target = %self.target_dir.display(),
            atlas = %self.atlas_path.display(),
            "Running registration, this may take a long time"
        );
        let target_dir = ensure_dir(&self.target_dir)?;

        let mut report = StageReport::new(self.kind());
        for input in matching_inputs(&self.source_dir, &self.naming)? {
            let name = file_name(&input);
            let prefix = target_dir.join(self.naming.subject_id(&name));
            let invocation = Invocation::new(&self.executable)
                .arg("-d")
                .arg("3")
                .arg("-f")
                .arg(&self.atlas_path)
                .arg("-m")
                .arg(absolute(&input)?)
                .arg("-o")
                .arg(&prefix);
            run_item(
                self.failure_policy(),
                executor,
                &invocation,
                &input,
                &mut report,
            )?;
        }

        if !report.skipped.is_empty() {
            warn!(
                skipped = report.skipped.len(),
                attempted = report.attempted,
                "Registration skipped some images"
            );
        }
        info!(
            registered = report.completed.len(),
            "Registration completed"
        );
        Ok(report)
    }
}
