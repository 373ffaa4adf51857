use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the staging engine and its stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No files were found in the input directory {}", .dir.display())]
    EmptyInput { dir: PathBuf },

    #[error("The file '{name}' is not valid. Must have the extension .{expected}")]
    UnsupportedFile { name: String, expected: String },

    #[error("Error running: {}", .argv.join(" "))]
    CommandFailed {
        argv: Vec<String>,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out after {}s: {}", .timeout.as_secs_f64(), .argv.join(" "))]
    CommandTimedOut { argv: Vec<String>, timeout: Duration },

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Registration did not generate any Warped images in {}", .dir.display())]
    NoRegisteredImages { dir: PathBuf, present: Vec<String> },

    #[error(
        "Refusing to rename {} over existing {}{}",
        .from.display(),
        .to.display(),
        .leftover
            .then_some(" (left over from an earlier run; clear the directory before rerunning)")
            .unwrap_or_default()
    )]
    RenameCollision {
        from: PathBuf,
        to: PathBuf,
        /// The target was already on disk rather than claimed twice by this run.
        leftover: bool,
    },

    #[error("Unexpected sub-directory in working directory: {}", .path.display())]
    UnexpectedDirectory { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("Failed to {action}: {}", path.display()), source)
    }

    /// True for failures scoped to a single item, which
    /// `FailurePolicy::ContinueOnItemFailure` may recover from.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::CommandTimedOut { .. }
        )
    }

    /// Captured stderr of a failed command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }
}
