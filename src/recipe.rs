use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::naming::NamingContract;

/// Every caller-supplied parameter of a run. All fields are optional in YAML;
/// missing ones fall back to the stock deployment layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub input_dir: PathBuf,
    pub atlas_path: PathBuf,
    pub out_root: PathBuf,
    pub dataset_id: String,
    pub configuration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub tools: ToolPaths,
    pub naming: NamingContract,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/workspace/input"),
            atlas_path: PathBuf::from("/workspace/data/atlas/SRI24_atlas.nii"),
            out_root: PathBuf::from("/workspace/output"),
            dataset_id: "15".to_string(),
            configuration: "3d_fullres".to_string(),
            timeout_secs: None,
            tools: ToolPaths::default(),
            naming: NamingContract::default(),
        }
    }
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
        let recipe: Recipe = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse recipe YAML: {}", path.display()))?;
        Ok(recipe)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub skull_strip: PathBuf,
    pub registration: PathBuf,
    pub inference: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            skull_strip: PathBuf::from("./ROBEX/runROBEX.sh"),
            registration: PathBuf::from("/usr/local/bin/antsRegistrationSyN.sh"),
            inference: PathBuf::from("nnUNetv2_predict"),
        }
    }
}
