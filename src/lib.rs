pub mod cleanup;
pub mod command;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod observability;
pub mod pipeline;
pub mod recipe;
pub mod rename;
pub mod stages;
pub mod validation;

pub use command::{CommandExecutor, CommandOutput, Invocation, SystemExecutor};
pub use error::PipelineError;
pub use naming::NamingContract;
pub use pipeline::{PipelineController, PipelineState, PipelineSummary, StageFailure};
pub use recipe::Recipe;
