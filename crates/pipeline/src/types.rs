use std::time::Duration;

use mediaferry_submission::NamingOptions;
use mediaferry_transfer::{FormInfo, StatsSnapshot};

/// Per-form counters returned by [`process_form`].
///
/// [`process_form`]: crate::FormTransferOrchestrator::process_form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormOutcome {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// One form's contribution to the run.
#[derive(Debug, Clone)]
pub struct FormReport {
    pub form: FormInfo,
    pub outcome: FormOutcome,
}

/// Final result of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Destination run folder all forms were written under.
    pub root_folder: String,
    pub forms: Vec<FormReport>,
    pub stats: StatsSnapshot,
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub naming: NamingOptions,
    /// Pause after every transfer attempt, to respect downstream rate
    /// limits.
    pub transfer_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            naming: NamingOptions::default(),
            transfer_delay: Duration::from_millis(500),
        }
    }
}
