use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineSummary;
use crate::recipe::Recipe;
use crate::validation::{file_name, sorted_entries};

/// Provenance record of a completed run.
#[derive(Debug, Serialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    pub recipe: Recipe,
    pub inputs: Vec<InputDigest>,
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    pub predictions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InputDigest {
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

impl RunManifest {
    pub fn from_summary(recipe: &Recipe, summary: &PipelineSummary) -> Result<Self> {
        let mut inputs = Vec::with_capacity(summary.inputs.len());
        for input in &summary.inputs {
            inputs.push(InputDigest {
                name: file_name(input),
                sha256: compute_sha256(input)?,
            });
        }

        let predictions = if summary.layout.prediction_dir.is_dir() {
            sorted_entries(&summary.layout.prediction_dir)?
                .iter()
                .map(|path| file_name(path))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            generated_at: Utc::now(),
            recipe: recipe.clone(),
            inputs,
            registered: summary.renamed.iter().map(|path| file_name(path)).collect(),
            skipped: summary
                .registration
                .skipped
                .iter()
                .map(|item| SkippedEntry {
                    name: file_name(&item.input),
                    reason: item.reason.clone(),
                })
                .collect(),
            predictions,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create manifest directory: {}", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create manifest: {}", path.display()))?;
        serde_yaml::to_writer(file, self)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }
}

pub fn compute_sha256(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
