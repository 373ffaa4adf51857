use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::naming::NamingContract;
use crate::recipe::Recipe;

/// Checks that `input_dir` is non-empty and that every direct child carries an
/// allowed suffix. Returns the entries sorted by name.
pub fn verify_inputs(
    input_dir: &Path,
    naming: &NamingContract,
) -> Result<Vec<PathBuf>, PipelineError> {
    info!(input = %input_dir.display(), "Checking input images");

    let entries = sorted_entries(input_dir)?;
    if entries.is_empty() {
        return Err(PipelineError::EmptyInput {
            dir: input_dir.to_path_buf(),
        });
    }

    for entry in &entries {
        let name = file_name(entry);
        if !naming.allowed_file(&name) {
            return Err(PipelineError::UnsupportedFile {
                name,
                expected: naming.describe_allowed(),
            });
        }
    }

    info!(count = entries.len(), "Input images verified");
    Ok(entries)
}

/// Direct children of `dir` (files and directories alike), sorted by name.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let reader = fs::read_dir(dir).map_err(|err| PipelineError::io_at("read directory", dir, err))?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|err| PipelineError::io_at("read directory", dir, err))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Static checks on a recipe before any stage runs. Nothing is executed.
pub fn validate_recipe(recipe: &Recipe) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !recipe.input_dir.is_dir() {
        report.errors.push(format!(
            "Input directory does not exist: {}",
            recipe.input_dir.display()
        ));
    }

    if !recipe.atlas_path.is_file() {
        report.errors.push(format!(
            "Atlas file does not exist: {}",
            recipe.atlas_path.display()
        ));
    }

    if recipe.dataset_id.trim().is_empty() {
        report.errors.push("Dataset id cannot be empty".into());
    }

    if recipe.configuration.trim().is_empty() {
        report.errors.push("Model configuration cannot be empty".into());
    }

    if recipe.out_root.as_os_str().is_empty() {
        report.errors.push("Output root cannot be empty".into());
    } else if recipe.out_root.starts_with(&recipe.input_dir) {
        report.errors.push(format!(
            "Output root {} must not live inside the input directory",
            recipe.out_root.display()
        ));
    }

    if recipe.timeout_secs == Some(0) {
        report.errors.push("Command timeout must be greater than zero".into());
    }

    report.merge(validate_tools(recipe));
    report.merge(validate_naming(&recipe.naming));
    report
}

fn validate_tools(recipe: &Recipe) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (label, path) in [
        ("skull-strip", &recipe.tools.skull_strip),
        ("registration", &recipe.tools.registration),
    ] {
        if !path.is_file() {
            report.warnings.push(format!(
                "{label} executable not found at {}",
                path.display()
            ));
        }
    }
    if recipe.tools.inference.as_os_str().is_empty() {
        report.errors.push("Inference executable cannot be empty".into());
    }
    report
}

fn validate_naming(naming: &NamingContract) -> ValidationReport {
    let mut report = ValidationReport::default();

    if naming.allowed_suffixes.is_empty() {
        report
            .errors
            .push("At least one allowed input suffix is required".into());
    }
    if naming.allowed_suffixes.iter().any(|s| s.trim().is_empty()) {
        report
            .errors
            .push("Allowed input suffixes cannot be empty".into());
    }
    for (label, value) in [
        ("warped_marker", &naming.warped_marker),
        ("inverse_marker", &naming.inverse_marker),
        ("final_suffix", &naming.final_suffix),
    ] {
        if value.is_empty() {
            report.errors.push(format!("Naming field '{label}' cannot be empty"));
        }
    }

    if !naming.warped_marker.is_empty() && !naming.inverse_marker.ends_with(&naming.warped_marker)
    {
        report.errors.push(format!(
            "inverse_marker '{}' must end with warped_marker '{}'",
            naming.inverse_marker, naming.warped_marker
        ));
    }

    let final_has_allowed_suffix = naming
        .allowed_suffixes
        .iter()
        .any(|suffix| naming.final_suffix.ends_with(&format!(".{suffix}")));
    if !final_has_allowed_suffix {
        report.warnings.push(format!(
            "final_suffix '{}' does not end with an allowed input suffix",
            naming.final_suffix
        ));
    }

    report
}
