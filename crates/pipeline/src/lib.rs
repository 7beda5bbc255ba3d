//! Drives the transfer core over a full run.
//!
//! The orchestrator processes one form at a time: fetch submissions, decide
//! the form's naming scheme, walk every field of every submission, and hand
//! each attachment candidate to the engine unless the destination catalog
//! already has it. The run module adds run-folder bookkeeping and the
//! whole-run loop.

pub mod orchestrator;
pub mod run;
mod types;

pub use orchestrator::FormTransferOrchestrator;
pub use run::{latest_run_folder, new_run_folder_name, run_transfer, select_run_folder};
pub use types::{FormOutcome, FormReport, PipelineOptions, RunSummary};
