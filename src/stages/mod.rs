pub mod inference;
pub mod registration;
pub mod skull_strip;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::command::{CommandExecutor, Invocation};
use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::validation::{file_name, sorted_entries};

pub use inference::InferenceStage;
pub use registration::RegistrationStage;
pub use skull_strip::SkullStripStage;

/// How a stage reacts when one of its external invocations fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failed invocation aborts the stage and the pipeline.
    FatalOnAnyFailure,
    /// A failed item is logged and skipped; the stage carries on.
    ContinueOnItemFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    SkullStrip,
    Registration,
    Inference,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::SkullStrip => "skull-strip",
            StageKind::Registration => "registration",
            StageKind::Inference => "inference",
        }
    }
}

pub trait StageRunner {
    fn kind(&self) -> StageKind;
    fn failure_policy(&self) -> FailurePolicy;
    fn run(&self, executor: &dyn CommandExecutor) -> Result<StageReport, PipelineError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub attempted: usize,
    pub completed: Vec<PathBuf>,
    pub skipped: Vec<SkippedItem>,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            attempted: 0,
            completed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub input: PathBuf,
    pub reason: String,
}

/// Executes the invocation for one item and applies `policy` to the outcome.
pub(crate) fn run_item(
    policy: FailurePolicy,
    executor: &dyn CommandExecutor,
    invocation: &Invocation,
    input: &Path,
    report: &mut StageReport,
) -> Result<(), PipelineError> {
    report.attempted += 1;
    match executor.execute(invocation) {
        Ok(_) => {
            report.completed.push(input.to_path_buf());
            Ok(())
        }
        Err(err) if policy == FailurePolicy::ContinueOnItemFailure && err.is_item_failure() => {
            warn!(
                stage = report.stage.name(),
                file = %file_name(input),
                error = %err,
                stderr = err.stderr().unwrap_or_default().trim_end(),
                "Item failed, continuing"
            );
            report.skipped.push(SkippedItem {
                input: input.to_path_buf(),
                reason: err.to_string(),
            });
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Entries of `dir` that carry an allowed input suffix, sorted by name.
pub(crate) fn matching_inputs(
    dir: &Path,
    naming: &NamingContract,
) -> Result<Vec<PathBuf>, PipelineError> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| naming.matches_input(&file_name(path)))
        .collect())
}

/// Creates `dir` if absent and returns its absolute form.
pub(crate) fn ensure_dir(dir: &Path) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(dir).map_err(|err| PipelineError::io_at("create directory", dir, err))?;
    fs::canonicalize(dir).map_err(|err| PipelineError::io_at("resolve directory", dir, err))
}

pub(crate) fn absolute(path: &Path) -> Result<PathBuf, PipelineError> {
    fs::canonicalize(path).map_err(|err| PipelineError::io_at("resolve path", path, err))
}
