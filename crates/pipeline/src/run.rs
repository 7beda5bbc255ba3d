//! Whole-run driving: run-folder bookkeeping, catalog build, per-form loop.
//!
//! Run folders at the destination root are named
//! `KoboMedia_Direct_{YYYYMMDD}_{HHMMSS}`. A new run reuses the most recent
//! existing one (so incremental re-runs land next to their predecessors)
//! and only creates a fresh folder when none exists.

use chrono::{NaiveDate, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::info;

use mediaferry_transfer::{
    ChildEntry, DestinationCatalog, DestinationStore, FormInfo, SourceProvider, TransferError,
    TransferStats,
};

use crate::orchestrator::FormTransferOrchestrator;
use crate::types::{FormReport, PipelineOptions, RunSummary};

/// Prefix of destination run folders.
pub const RUN_FOLDER_PREFIX: &str = "KoboMedia_Direct_";

/// Name for a fresh run folder started at `now`.
pub fn new_run_folder_name(now: NaiveDateTime) -> String {
    format!("{RUN_FOLDER_PREFIX}{}", now.format("%Y%m%d_%H%M%S"))
}

/// Picks the most recent existing run folder from a root listing, by the
/// date token embedded in the folder name. Unparseable names are ignored.
pub fn latest_run_folder(entries: &[ChildEntry]) -> Option<String> {
    let mut latest: Option<(NaiveDate, &str)> = None;

    for entry in entries.iter().filter(|e| e.is_folder) {
        let Some(rest) = entry.name.strip_prefix(RUN_FOLDER_PREFIX) else {
            continue;
        };
        // `{YYYYMMDD}_{HHMMSS}` — only the date token is compared.
        let Some(date_token) = rest.split('_').next() else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(date_token, "%Y%m%d") else {
            continue;
        };
        match latest {
            Some((best, _)) if date <= best => {}
            _ => latest = Some((date, &entry.name)),
        }
    }

    latest.map(|(_, name)| name.to_string())
}

/// Resolves the run folder for this run: the latest existing one, or a new
/// folder named from `now`. A root listing failure reads as "no existing
/// folders".
pub async fn select_run_folder(store: &dyn DestinationStore, now: NaiveDateTime) -> String {
    let entries = store.list_children("").await.unwrap_or_default();
    if let Some(existing) = latest_run_folder(&entries) {
        info!(folder = %existing, "reusing existing run folder");
        return existing;
    }
    let fresh = new_run_folder_name(now);
    info!(folder = %fresh, "starting new run folder");
    fresh
}

/// Runs the full transfer for the given forms.
///
/// Builds the destination catalog once up front, then processes each form
/// sequentially. Only cancellation aborts the run.
pub async fn run_transfer(
    source: &dyn SourceProvider,
    store: &dyn DestinationStore,
    forms: &[FormInfo],
    root_folder: &str,
    stats: &TransferStats,
    cancel: CancellationToken,
    options: PipelineOptions,
) -> Result<RunSummary, TransferError> {
    let orchestrator =
        FormTransferOrchestrator::new(source, store, stats, cancel, options);
    orchestrator.ensure_folder(root_folder).await;

    // One snapshot for the whole run; files written below are intentionally
    // not added back (see the catalog docs on the staleness window).
    let catalog = DestinationCatalog::build(store, root_folder).await;
    info!(
        forms = catalog.form_count(),
        files = catalog.file_count(),
        "existing destination files indexed"
    );

    let mut reports = Vec::with_capacity(forms.len());
    for form in forms {
        let outcome = orchestrator.process_form(form, root_folder, &catalog).await?;
        info!(
            form = %form.name,
            processed = outcome.processed,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "form done"
        );
        reports.push(FormReport {
            form: form.clone(),
            outcome,
        });
    }

    Ok(RunSummary {
        root_folder: root_folder.to_string(),
        forms: reports,
        stats: stats.snapshot(),
    })
}
