#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use neuroseg::{CommandExecutor, CommandOutput, Invocation, PipelineError, Recipe};
use tempfile::{TempDir, tempdir};

pub const SKULL_STRIP: &str = "runROBEX.sh";
pub const REGISTRATION: &str = "antsRegistrationSyN.sh";
pub const INFERENCE: &str = "nnUNetv2_predict";

type Behavior = Box<dyn Fn(&Invocation) -> Result<CommandOutput, PipelineError>>;

/// Records every invocation and answers with a scripted outcome.
pub struct ScriptedExecutor {
    calls: RefCell<Vec<Invocation>>,
    behavior: Behavior,
}

impl ScriptedExecutor {
    pub fn new(
        behavior: impl Fn(&Invocation) -> Result<CommandOutput, PipelineError> + 'static,
    ) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            behavior: Box::new(behavior),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::success()))
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .map(Invocation::argv_lossy)
            .collect()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| program_name(&argv[0]) == program)
            .collect()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, PipelineError> {
        self.calls.borrow_mut().push(invocation.clone());
        (self.behavior)(invocation)
    }
}

pub fn command_failed(invocation: &Invocation, stderr: &str) -> PipelineError {
    PipelineError::CommandFailed {
        argv: invocation.argv_lossy(),
        status: Some(1),
        stderr: stderr.to_string(),
    }
}

pub fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn value_after(argv: &[String], flag: &str) -> String {
    let idx = argv
        .iter()
        .position(|arg| arg == flag)
        .unwrap_or_else(|| panic!("flag {flag} missing from {argv:?}"));
    argv[idx + 1].clone()
}

/// Simulates the three tools on disk. Registration fails for every subject
/// whose file name starts with one of `failing_subjects`.
pub fn simulated_tools(failing_subjects: &'static [&'static str]) -> ScriptedExecutor {
    ScriptedExecutor::new(move |invocation| {
        let argv = invocation.argv_lossy();
        match program_name(&argv[0]).as_str() {
            SKULL_STRIP => {
                fs::copy(&argv[1], &argv[2]).unwrap();
                Ok(CommandOutput::success())
            }
            REGISTRATION => {
                let moving = value_after(&argv, "-m");
                let prefix = value_after(&argv, "-o");
                let moving_name = program_name(&moving);
                if failing_subjects
                    .iter()
                    .any(|subject| moving_name.starts_with(subject))
                {
                    return Err(command_failed(invocation, "registration diverged"));
                }
                for suffix in [
                    "Warped.nii.gz",
                    "InverseWarped.nii.gz",
                    "0GenericAffine.mat",
                    "1Warp.nii.gz",
                    "1InverseWarp.nii.gz",
                ] {
                    fs::write(format!("{prefix}{suffix}"), b"volume").unwrap();
                }
                Ok(CommandOutput::success())
            }
            INFERENCE => {
                let input_dir = PathBuf::from(value_after(&argv, "-i"));
                let output_dir = PathBuf::from(value_after(&argv, "-o"));
                for entry in fs::read_dir(&input_dir).unwrap() {
                    let name = entry.unwrap().file_name().to_string_lossy().into_owned();
                    if let Some(case) = name.strip_suffix("_0000.nii.gz") {
                        fs::write(output_dir.join(format!("{case}.nii.gz")), b"mask").unwrap();
                    }
                }
                Ok(CommandOutput::success())
            }
            _ => Err(command_failed(invocation, "unknown tool")),
        }
    })
}

pub struct Workspace {
    pub temp: TempDir,
    pub input_dir: PathBuf,
    pub out_root: PathBuf,
    pub atlas_path: PathBuf,
}

impl Workspace {
    pub fn with_inputs(names: &[&str]) -> Self {
        let temp = tempdir().unwrap();
        let input_dir = temp.path().join("input");
        fs::create_dir_all(&input_dir).unwrap();
        for name in names {
            fs::write(input_dir.join(name), b"scan").unwrap();
        }
        let atlas_path = temp.path().join("atlas.nii");
        fs::write(&atlas_path, b"atlas").unwrap();
        let out_root = temp.path().join("output");
        Self {
            temp,
            input_dir,
            out_root,
            atlas_path,
        }
    }

    pub fn recipe(&self) -> Recipe {
        let mut recipe = Recipe {
            input_dir: self.input_dir.clone(),
            atlas_path: self.atlas_path.clone(),
            out_root: self.out_root.clone(),
            ..Recipe::default()
        };
        recipe.tools.skull_strip = self.temp.path().join(SKULL_STRIP);
        recipe.tools.registration = self.temp.path().join(REGISTRATION);
        recipe.tools.inference = PathBuf::from(INFERENCE);
        recipe
    }
}

pub fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn touch(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"data").unwrap();
    }
}
