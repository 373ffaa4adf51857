use std::path::PathBuf;

use tracing::info;

use super::{FailurePolicy, StageKind, StageReport, StageRunner, ensure_dir, run_item};
use crate::command::{CommandExecutor, Invocation};
use crate::error::PipelineError;

/// Fold selector passed to the inference tool; every trained fold is used.
pub const ALL_FOLDS: &str = "all";

/// One batch invocation over the whole staged directory.
pub struct InferenceStage {
    pub executable: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dataset_id: String,
    pub configuration: String,
}

impl InferenceStage {
    pub fn invocation(&self) -> Invocation {
        Invocation::new(&self.executable)
            .arg("-i")
            .arg(&self.input_dir)
            .arg("-o")
            .arg(&self.output_dir)
            .arg("-d")
            .arg(&self.dataset_id)
            .arg("-c")
            .arg(&self.configuration)
            .arg("-f")
            .arg(ALL_FOLDS)
    }
}

impl StageRunner for InferenceStage {
    fn kind(&self) -> StageKind {
        StageKind::Inference
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FatalOnAnyFailure
    }

    fn run(&self, executor: &dyn CommandExecutor) -> Result<StageReport, PipelineError> {
        info!(
            input = %self.input_dir.display(),
            output = %self.output_dir.display(),
            dataset = %self.dataset_id,
            configuration = %self.configuration,
            "Running inference, this may take a long time"
        );
        ensure_dir(&self.output_dir)?;

        let mut report = StageReport::new(self.kind());
        run_item(
            self.failure_policy(),
            executor,
            &self.invocation(),
            &self.input_dir,
            &mut report,
        )?;
        Ok(report)
    }
}
