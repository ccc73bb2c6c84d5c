pub mod runner;

pub use runner::{prepare_workspace, run_pipeline, PipelineError, RunSummary};
