//! Per-form transfer orchestration.
//!
//! Everything here is deliberately forgiving: a field that cannot be
//! parsed, a folder that cannot be created or an attachment that fails to
//! move is logged and counted, and the walk continues. Only cancellation
//! aborts a form.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mediaferry_submission::naming::{safe_category_folder, safe_form_folder};
use mediaferry_submission::{NamingScheme, derive_filename, extract_candidates, sanitize_filename};
use mediaferry_transfer::{
    DestinationCatalog, DestinationStore, FormInfo, SourceProvider, TransferEngine, TransferError,
    TransferStats,
};

use crate::types::{FormOutcome, PipelineOptions};

/// Processes one form's full submission set against the destination.
pub struct FormTransferOrchestrator<'a> {
    source: &'a dyn SourceProvider,
    store: &'a dyn DestinationStore,
    stats: &'a TransferStats,
    cancel: CancellationToken,
    options: PipelineOptions,
}

impl<'a> FormTransferOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceProvider,
        store: &'a dyn DestinationStore,
        stats: &'a TransferStats,
        cancel: CancellationToken,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            store,
            stats,
            cancel,
            options,
        }
    }

    /// Transfers every attachment of `form` into `root_folder`.
    ///
    /// `Err` is returned only on cancellation; everything else is absorbed
    /// into the outcome counters.
    pub async fn process_form(
        &self,
        form: &FormInfo,
        root_folder: &str,
        catalog: &DestinationCatalog,
    ) -> Result<FormOutcome, TransferError> {
        let submissions = match self.source.fetch_submissions(&form.id).await {
            Ok(submissions) => submissions,
            Err(e) => {
                warn!(form = %form.name, error = %e, "could not fetch submissions");
                return Ok(FormOutcome::default());
            }
        };

        if submissions.is_empty() {
            info!(form = %form.name, "no submissions found");
            return Ok(FormOutcome::default());
        }

        // The form-level scheme comes from a probe of the first submission
        // and only steers duplicate matching; each submission still names
        // its own files from its own fields.
        let form_scheme = derive_filename(&submissions[0], 1, "probe.jpg", &self.options.naming).scheme;
        info!(
            form = %form.name,
            submissions = submissions.len(),
            scheme = ?form_scheme,
            "processing form"
        );

        let form_folder_name = safe_form_folder(&form.name);
        let form_folder = format!("{root_folder}/{form_folder_name}");
        self.ensure_folder(&form_folder).await;

        let engine = TransferEngine::new(self.source, self.store, self.stats, self.cancel.clone());
        let mut outcome = FormOutcome::default();

        for (index, submission) in submissions.iter().enumerate() {
            let row = index + 1;
            for (field_name, value) in submission {
                if self.cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }

                let candidates = extract_candidates(value);
                if candidates.is_empty() {
                    continue;
                }
                debug!(row, field = %field_name, count = candidates.len(), "found media");

                let category_folder =
                    format!("{form_folder}/{}", safe_category_folder(field_name));
                self.ensure_folder(&category_folder).await;

                for candidate in candidates {
                    if candidate.source_url.is_empty() {
                        continue;
                    }
                    self.stats.record_discovered();

                    let base = sanitize_filename(&candidate.suggested_filename);
                    let derived = derive_filename(submission, row, &base, &self.options.naming);

                    if catalog.is_duplicate(&derived.filename, &form_folder_name, form_scheme) {
                        info!(file = %derived.filename, "already at destination, skipping");
                        self.stats.record_skipped();
                        outcome.skipped += 1;
                        continue;
                    }

                    let result = engine
                        .transfer(&candidate.source_url, &category_folder, &derived.filename)
                        .await?;
                    if result.success {
                        outcome.processed += 1;
                    } else {
                        outcome.failed += 1;
                    }

                    tokio::time::sleep(self.options.transfer_delay).await;
                }
            }
        }

        Ok(outcome)
    }

    /// Idempotent folder creation: check first, create only if absent.
    /// Failures are logged and swallowed — the write itself will surface
    /// a real problem.
    pub(crate) async fn ensure_folder(&self, path: &str) {
        match self.store.folder_exists(path).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(path, error = %e, "existence check failed");
            }
        }
        if let Err(e) = self.store.create_folder(path).await {
            warn!(path, error = %e, "could not create folder");
        }
    }
}
