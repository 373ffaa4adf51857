use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::cleanup::{CleanupReport, cleanup_intermediate};
use crate::command::CommandExecutor;
use crate::error::PipelineError;
use crate::observability::{MetricsCollector, StageTimer};
use crate::recipe::Recipe;
use crate::rename::rename_registered;
use crate::stages::{
    InferenceStage, RegistrationStage, SkullStripStage, StageReport, StageRunner,
};
use crate::validation::verify_inputs;

/// Position of the controller in the fixed stage sequence. `Failed` is
/// reachable from every non-terminal state; nothing moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Validating,
    SkullStripping,
    Registering,
    Renaming,
    CleaningUp,
    Inferring,
    Done,
    Failed,
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Validating => "validating",
            PipelineState::SkullStripping => "skull-stripping",
            PipelineState::Registering => "registering",
            PipelineState::Renaming => "renaming",
            PipelineState::CleaningUp => "cleaning-up",
            PipelineState::Inferring => "inferring",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fatal error together with the state the controller was in.
#[derive(Debug, Error)]
#[error("Pipeline failed while {stage}")]
pub struct StageFailure {
    pub stage: PipelineState,
    #[source]
    pub error: PipelineError,
}

fn failed_in(stage: PipelineState) -> impl FnOnce(PipelineError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

/// Stage directories created under the caller-supplied output root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineLayout {
    pub skull_strip_dir: PathBuf,
    pub registration_dir: PathBuf,
    pub prediction_dir: PathBuf,
}

impl PipelineLayout {
    pub fn new(out_root: &Path) -> Self {
        Self {
            skull_strip_dir: out_root.join("ROBEX"),
            registration_dir: out_root.join("ants"),
            prediction_dir: out_root.join("predictions"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub inputs: Vec<PathBuf>,
    pub layout: PipelineLayout,
    pub skull_strip: StageReport,
    pub registration: StageReport,
    pub renamed: Vec<PathBuf>,
    pub cleanup: CleanupReport,
    pub inference: StageReport,
}

/// Drives validate → skull-strip → register → rename → cleanup → infer.
///
/// Each stage finishes before the next begins. The first fatal error stops
/// the run; directories already written are left in place for inspection,
/// and a rerun starts again from validation.
pub struct PipelineController<'a> {
    recipe: Recipe,
    executor: &'a dyn CommandExecutor,
    metrics: MetricsCollector,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl<'a> PipelineController<'a> {
    pub fn new(recipe: Recipe, executor: &'a dyn CommandExecutor) -> Self {
        Self {
            recipe,
            executor,
            metrics: MetricsCollector::new(),
            state: PipelineState::Validating,
            history: Vec::new(),
        }
    }

    pub fn layout(&self) -> PipelineLayout {
        PipelineLayout::new(&self.recipe.out_root)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    #[instrument(skip(self), fields(input = %self.recipe.input_dir.display()))]
    pub fn run(&mut self) -> Result<PipelineSummary, StageFailure> {
        info!(out_root = %self.recipe.out_root.display(), "Pipeline started");
        self.history.clear();
        let started = Instant::now();

        let result = self.run_stages();
        self.metrics.record_total_duration(started.elapsed());

        match &result {
            Ok(summary) => {
                self.transition(PipelineState::Done);
                self.metrics.record_outcome(true);
                info!(
                    segmented = summary.renamed.len(),
                    skipped = summary.registration.skipped.len(),
                    predictions = %summary.layout.prediction_dir.display(),
                    "Pipeline successfully completed"
                );
            }
            Err(failure) => {
                self.transition(PipelineState::Failed);
                self.metrics.record_outcome(false);
                error!(
                    stage = %failure.stage,
                    error = %failure.error,
                    "Pipeline aborted"
                );
            }
        }
        result
    }

    fn run_stages(&mut self) -> Result<PipelineSummary, StageFailure> {
        let layout = self.layout();
        let recipe = self.recipe.clone();
        let naming = &recipe.naming;

        let inputs = {
            let _timer = self.enter(PipelineState::Validating);
            verify_inputs(&recipe.input_dir, naming).map_err(failed_in(PipelineState::Validating))?
        };

        let skull_strip = self.run_stage(
            PipelineState::SkullStripping,
            &SkullStripStage {
                script: recipe.tools.skull_strip.clone(),
                source_dir: recipe.input_dir.clone(),
                target_dir: layout.skull_strip_dir.clone(),
                naming: naming.clone(),
            },
        )?;

        let registration = self.run_stage(
            PipelineState::Registering,
            &RegistrationStage {
                executable: recipe.tools.registration.clone(),
                source_dir: layout.skull_strip_dir.clone(),
                target_dir: layout.registration_dir.clone(),
                atlas_path: recipe.atlas_path.clone(),
                naming: naming.clone(),
            },
        )?;

        let renamed = {
            let _timer = self.enter(PipelineState::Renaming);
            rename_registered(&layout.registration_dir, naming)
                .map_err(failed_in(PipelineState::Renaming))?
        };

        let cleanup = {
            let _timer = self.enter(PipelineState::CleaningUp);
            cleanup_intermediate(&layout.registration_dir, true, naming)
                .map_err(failed_in(PipelineState::CleaningUp))?
        };

        let inference = self.run_stage(
            PipelineState::Inferring,
            &InferenceStage {
                executable: recipe.tools.inference.clone(),
                input_dir: layout.registration_dir.clone(),
                output_dir: layout.prediction_dir.clone(),
                dataset_id: recipe.dataset_id.clone(),
                configuration: recipe.configuration.clone(),
            },
        )?;

        Ok(PipelineSummary {
            inputs,
            layout,
            skull_strip,
            registration,
            renamed,
            cleanup,
            inference,
        })
    }

    fn run_stage(
        &mut self,
        state: PipelineState,
        stage: &dyn StageRunner,
    ) -> Result<StageReport, StageFailure> {
        let _timer = self.enter(state);
        let report = stage.run(self.executor).map_err(failed_in(state))?;
        self.metrics.record_items(state.label(), &report);
        info!(
            stage = stage.kind().name(),
            policy = ?stage.failure_policy(),
            attempted = report.attempted,
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "Stage finished"
        );
        Ok(report)
    }

    fn enter(&mut self, state: PipelineState) -> StageTimer {
        self.transition(state);
        info!(state = %state, "=== {} ===", state.label());
        self.metrics.start_stage(state.label())
    }

    fn transition(&mut self, state: PipelineState) {
        self.state = state;
        self.history.push(state);
    }
}
