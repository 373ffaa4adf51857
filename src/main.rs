use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use neuroseg::SystemExecutor;
use neuroseg::manifest::RunManifest;
use neuroseg::observability::{MetricsSnapshot, log_snapshot};
use neuroseg::pipeline::{PipelineController, PipelineLayout};
use neuroseg::recipe::Recipe;
use neuroseg::validation::{ValidationReport, validate_recipe, verify_inputs};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Run {
            recipe,
            dry_run,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            manifest,
        } => run_pipeline(
            recipe,
            dry_run,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            manifest,
        ),
        Commands::CheckInputs { recipe } => check_inputs(recipe),
        Commands::Validate { recipe } => validate_cmd(recipe),
        Commands::Layout { recipe } => {
            print_layout(&recipe.resolve()?);
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn run_pipeline(
    recipe_args: RecipeArgs,
    dry_run: bool,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
    metrics_prometheus: Option<PathBuf>,
    manifest_path: Option<PathBuf>,
) -> Result<()> {
    let recipe = recipe_args.resolve()?;
    let report = validate_recipe(&recipe);
    log_report(&report);
    if !report.is_ok() {
        bail!(
            "Recipe validation failed with {} error(s)",
            report.errors.len()
        );
    }

    if dry_run {
        let inputs = verify_inputs(&recipe.input_dir, &recipe.naming)?;
        info!(
            inputs = inputs.len(),
            atlas = %recipe.atlas_path.display(),
            dataset = %recipe.dataset_id,
            configuration = %recipe.configuration,
            "Dry run: inputs verified, no stage executed"
        );
        print_layout(&recipe);
        return Ok(());
    }

    let executor = SystemExecutor::with_timeout(recipe.command_timeout());
    let mut controller = PipelineController::new(recipe.clone(), &executor);
    let outcome = controller.run();

    let snapshot = controller.metrics().snapshot();
    if print_metrics {
        log_snapshot(&snapshot);
    }
    write_metrics(&snapshot, metrics_json, metrics_prometheus)?;

    let summary = outcome?;
    for path in &summary.renamed {
        info!(image = %path.display(), "Segmented");
    }

    if let Some(path) = manifest_path {
        RunManifest::from_summary(&recipe, &summary)?.write(&path)?;
        info!(manifest = %path.display(), "Run manifest written");
    }

    Ok(())
}

fn check_inputs(recipe_args: RecipeArgs) -> Result<()> {
    let recipe = recipe_args.resolve()?;
    let inputs = verify_inputs(&recipe.input_dir, &recipe.naming)?;
    for input in &inputs {
        println!("{}", input.display());
    }
    info!(
        input = %recipe.input_dir.display(),
        count = inputs.len(),
        "Input check passed"
    );
    Ok(())
}

fn validate_cmd(recipe_args: RecipeArgs) -> Result<()> {
    let recipe = recipe_args.resolve()?;
    let report = validate_recipe(&recipe);
    log_report(&report);
    if report.is_ok() {
        info!("Recipe validation passed");
        Ok(())
    } else {
        Err(anyhow!(
            "Recipe validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn log_report(report: &ValidationReport) {
    for warning in &report.warnings {
        warn!("{warning}");
    }
    for error_msg in &report.errors {
        error!("{error_msg}");
    }
}

fn print_layout(recipe: &Recipe) {
    let layout = PipelineLayout::new(&recipe.out_root);
    println!("skull-strip:  {}", layout.skull_strip_dir.display());
    println!("registration: {}", layout.registration_dir.display());
    println!("predictions:  {}", layout.prediction_dir.display());
}

fn write_metrics(
    snapshot: &MetricsSnapshot,
    metrics_json: Option<PathBuf>,
    metrics_prometheus: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = metrics_json {
        ensure_parent(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = metrics_prometheus {
        ensure_parent(&path)?;
        std::fs::write(&path, snapshot.to_prometheus())
            .with_context(|| format!("Failed to write Prometheus metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "neuroseg",
    version,
    about = "Skull-strip, register and segment brain MRI volumes with external tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline.
    Run {
        #[command(flatten)]
        recipe: RecipeArgs,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
        #[arg(long = "metrics-prometheus")]
        metrics_prometheus: Option<PathBuf>,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Check the input directory without running any tool.
    CheckInputs {
        #[command(flatten)]
        recipe: RecipeArgs,
    },
    /// Check the recipe for missing paths and inconsistent settings.
    Validate {
        #[command(flatten)]
        recipe: RecipeArgs,
    },
    /// Print the stage directories a run would use.
    Layout {
        #[command(flatten)]
        recipe: RecipeArgs,
    },
}

/// Recipe file plus per-field overrides; flags win over the file.
#[derive(Args, Debug)]
struct RecipeArgs {
    #[arg(long)]
    recipe: Option<PathBuf>,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    atlas: Option<PathBuf>,
    #[arg(long = "out-root")]
    out_root: Option<PathBuf>,
    #[arg(long = "dataset-id")]
    dataset_id: Option<String>,
    #[arg(long)]
    configuration: Option<String>,
    #[arg(long = "skull-strip")]
    skull_strip: Option<PathBuf>,
    #[arg(long)]
    registration: Option<PathBuf>,
    #[arg(long)]
    inference: Option<PathBuf>,
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,
}

impl RecipeArgs {
    fn resolve(self) -> Result<Recipe> {
        let mut recipe = match &self.recipe {
            Some(path) => Recipe::load(path)?,
            None => Recipe::default(),
        };
        if let Some(input) = self.input {
            recipe.input_dir = input;
        }
        if let Some(atlas) = self.atlas {
            recipe.atlas_path = atlas;
        }
        if let Some(out_root) = self.out_root {
            recipe.out_root = out_root;
        }
        if let Some(dataset_id) = self.dataset_id {
            recipe.dataset_id = dataset_id;
        }
        if let Some(configuration) = self.configuration {
            recipe.configuration = configuration;
        }
        if let Some(path) = self.skull_strip {
            recipe.tools.skull_strip = path;
        }
        if let Some(path) = self.registration {
            recipe.tools.registration = path;
        }
        if let Some(path) = self.inference {
            recipe.tools.inference = path;
        }
        if self.timeout_secs.is_some() {
            recipe.timeout_secs = self.timeout_secs;
        }
        Ok(recipe)
    }
}
