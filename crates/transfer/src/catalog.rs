//! In-memory catalog of files already present at the destination.
//!
//! Built once per run before any transfers. The scan is deliberately
//! shallow and approximate: one level of form folders under the run root,
//! one further level of category sub-folders, all leaf filenames flattened
//! into a single set per form. The catalog is not refreshed as new files
//! are written during the same run.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use mediaferry_submission::NamingScheme;

use crate::store::DestinationStore;

/// Form-folder name → set of existing filenames (sub-folder contents merged).
#[derive(Debug, Default)]
pub struct DestinationCatalog {
    forms: HashMap<String, HashSet<String>>,
}

impl DestinationCatalog {
    /// An empty catalog (nothing at the destination yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an existing file under a form folder.
    pub fn insert(&mut self, form_folder: &str, filename: &str) {
        self.forms
            .entry(form_folder.to_string())
            .or_default()
            .insert(filename.to_string());
    }

    /// Scans the destination under `root` and builds the catalog.
    ///
    /// Listing failures for any sub-path are non-fatal: that sub-path is
    /// treated as containing zero files and the scan continues.
    pub async fn build(store: &dyn DestinationStore, root: &str) -> Self {
        let mut catalog = Self::new();

        let form_folders = match store.list_children(root).await {
            Ok(children) => children,
            Err(e) => {
                warn!(root, error = %e, "could not list run folder, assuming empty");
                return catalog;
            }
        };

        for form in form_folders.iter().filter(|c| c.is_folder) {
            let files = catalog.forms.entry(form.name.clone()).or_default();
            let form_path = format!("{root}/{}", form.name);

            let items = match store.list_children(&form_path).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(path = %form_path, error = %e, "could not list form folder");
                    continue;
                }
            };

            for item in items {
                if item.is_folder {
                    let sub_path = format!("{form_path}/{}", item.name);
                    match store.list_children(&sub_path).await {
                        Ok(sub_items) => {
                            files.extend(
                                sub_items
                                    .into_iter()
                                    .filter(|i| !i.is_folder)
                                    .map(|i| i.name),
                            );
                        }
                        Err(e) => {
                            warn!(path = %sub_path, error = %e, "could not list sub-folder");
                        }
                    }
                } else {
                    files.insert(item.name);
                }
            }
        }

        debug!(
            forms = catalog.forms.len(),
            files = catalog.file_count(),
            "destination catalog built"
        );
        catalog
    }

    /// Answers whether `filename` should be treated as already transferred.
    ///
    /// Exact matches always count. Beyond that, matching is keyed on the
    /// row number embedded in the name so re-runs recognize files even when
    /// the cosmetic prefix (date/category) changed: rich names match on the
    /// `_{row}{ext}` suffix, fallback names on the `row{N}_` prefix. Any
    /// parse failure reads as "not a duplicate" — re-transfer is preferred
    /// over silent loss.
    pub fn is_duplicate(&self, filename: &str, form_folder: &str, scheme: NamingScheme) -> bool {
        let Some(files) = self.forms.get(form_folder) else {
            return false;
        };

        if files.contains(filename) {
            debug!(filename, form = form_folder, "exact duplicate");
            return true;
        }

        match scheme {
            NamingScheme::Rich => {
                let parts: Vec<&str> = filename.split('_').collect();
                if parts.len() < 3 {
                    return false;
                }
                // Last segment is `{row}{ext}`.
                let suffix = format!("_{}", parts[parts.len() - 1]);
                if let Some(existing) = files.iter().find(|f| f.ends_with(&suffix)) {
                    debug!(filename, matches = %existing, "duplicate by row suffix");
                    return true;
                }
                false
            }
            NamingScheme::Fallback => {
                let Some(rest) = filename.strip_prefix("row") else {
                    return false;
                };
                let Some(digits) = rest.split('_').next() else {
                    return false;
                };
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return false;
                }
                let prefix = format!("row{digits}_");
                if let Some(existing) = files.iter().find(|f| f.starts_with(&prefix)) {
                    debug!(filename, matches = %existing, "duplicate by row prefix");
                    return true;
                }
                false
            }
        }
    }

    /// Number of form folders seen.
    pub fn form_count(&self) -> usize {
        self.forms.len()
    }

    /// Total number of cataloged files.
    pub fn file_count(&self) -> usize {
        self.forms.values().map(HashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(form: &str, files: &[&str]) -> DestinationCatalog {
        let mut catalog = DestinationCatalog::new();
        for f in files {
            catalog.insert(form, f);
        }
        catalog
    }

    #[test]
    fn exact_match_is_duplicate_under_both_schemes() {
        let catalog = catalog_with("Survey", &["2025-06-26_Fuel_1.jpg"]);
        assert!(catalog.is_duplicate("2025-06-26_Fuel_1.jpg", "Survey", NamingScheme::Rich));
        assert!(catalog.is_duplicate("2025-06-26_Fuel_1.jpg", "Survey", NamingScheme::Fallback));
    }

    #[test]
    fn rich_matches_row_suffix_despite_prefix_change() {
        let catalog = catalog_with("Survey", &["2025-06-26_Fuel_1.jpg"]);
        // Different date and category, same row and extension.
        assert!(catalog.is_duplicate("2025-07-01_Taxi_1.jpg", "Survey", NamingScheme::Rich));
    }

    #[test]
    fn rich_distinguishes_rows_and_extensions() {
        let catalog = catalog_with("Survey", &["2025-06-26_Fuel_1.jpg"]);
        assert!(!catalog.is_duplicate("2025-06-26_Fuel_2.jpg", "Survey", NamingScheme::Rich));
        assert!(!catalog.is_duplicate("2025-06-26_Fuel_1.png", "Survey", NamingScheme::Rich));
    }

    #[test]
    fn rich_with_too_few_segments_is_not_duplicate() {
        let catalog = catalog_with("Survey", &["whatever_1.jpg"]);
        assert!(!catalog.is_duplicate("photo.jpg", "Survey", NamingScheme::Rich));
    }

    #[test]
    fn fallback_matches_row_prefix() {
        let catalog = catalog_with("Survey", &["row3_old_name.jpg"]);
        assert!(catalog.is_duplicate("row3_new_name.jpg", "Survey", NamingScheme::Fallback));
        assert!(!catalog.is_duplicate("row4_new_name.jpg", "Survey", NamingScheme::Fallback));
    }

    #[test]
    fn fallback_requires_numeric_row_token() {
        let catalog = catalog_with("Survey", &["rowdy_file.jpg"]);
        assert!(!catalog.is_duplicate("rowdy_file2.jpg", "Survey", NamingScheme::Fallback));
    }

    #[test]
    fn unknown_form_folder_is_never_duplicate() {
        let catalog = catalog_with("Survey", &["row1_a.jpg"]);
        assert!(!catalog.is_duplicate("row1_a.jpg", "Other", NamingScheme::Fallback));
    }

    #[test]
    fn counts() {
        let mut catalog = catalog_with("A", &["x.jpg", "y.jpg"]);
        catalog.insert("B", "z.jpg");
        assert_eq!(catalog.form_count(), 2);
        assert_eq!(catalog.file_count(), 3);
    }

    mod build {
        use super::*;
        use crate::store::{ChildEntry, UploadHandle};
        use async_trait::async_trait;
        use bytes::Bytes;
        use std::collections::HashMap;

        /// Store whose folder tree is a fixed path → children map; paths
        /// absent from the map fail to list.
        struct ListingStore {
            tree: HashMap<String, Vec<ChildEntry>>,
        }

        fn folder(name: &str) -> ChildEntry {
            ChildEntry {
                name: name.into(),
                is_folder: true,
            }
        }

        fn file(name: &str) -> ChildEntry {
            ChildEntry {
                name: name.into(),
                is_folder: false,
            }
        }

        #[async_trait]
        impl DestinationStore for ListingStore {
            async fn folder_exists(&self, path: &str) -> Result<bool, crate::TransferError> {
                Ok(self.tree.contains_key(path))
            }

            async fn create_folder(&self, _: &str) -> Result<(), crate::TransferError> {
                Ok(())
            }

            async fn list_children(
                &self,
                path: &str,
            ) -> Result<Vec<ChildEntry>, crate::TransferError> {
                self.tree
                    .get(path)
                    .cloned()
                    .ok_or_else(|| crate::TransferError::Store(format!("404: {path}")))
            }

            async fn write_small(&self, _: &str, _: Bytes) -> Result<(), crate::TransferError> {
                Ok(())
            }

            async fn create_upload_session(
                &self,
                _: &str,
            ) -> Result<UploadHandle, crate::TransferError> {
                Err(crate::TransferError::Store("unsupported".into()))
            }

            async fn write_chunk(
                &self,
                _: &UploadHandle,
                _: u64,
                _: Bytes,
                _: u64,
            ) -> Result<(), crate::TransferError> {
                Ok(())
            }
        }

        #[tokio::test]
        async fn flattens_one_level_of_subfolders() {
            let tree = HashMap::from([
                ("Run".to_string(), vec![folder("FormA"), file("stray.txt")]),
                (
                    "Run/FormA".to_string(),
                    vec![file("row1_a.jpg"), folder("photo_field")],
                ),
                (
                    "Run/FormA/photo_field".to_string(),
                    vec![file("row2_b.jpg"), folder("deeper")],
                ),
            ]);
            let store = ListingStore { tree };

            let catalog = DestinationCatalog::build(&store, "Run").await;
            assert_eq!(catalog.form_count(), 1);
            assert_eq!(catalog.file_count(), 2);
            assert!(catalog.is_duplicate("row1_a.jpg", "FormA", NamingScheme::Fallback));
            assert!(catalog.is_duplicate("row2_b.jpg", "FormA", NamingScheme::Fallback));
        }

        #[tokio::test]
        async fn listing_failures_read_as_empty() {
            // FormB's listing fails; FormA's sub-folder listing fails.
            let tree = HashMap::from([
                ("Run".to_string(), vec![folder("FormA"), folder("FormB")]),
                (
                    "Run/FormA".to_string(),
                    vec![file("row1_a.jpg"), folder("broken_sub")],
                ),
            ]);
            let store = ListingStore { tree };

            let catalog = DestinationCatalog::build(&store, "Run").await;
            assert_eq!(catalog.form_count(), 2);
            assert_eq!(catalog.file_count(), 1);
            assert!(!catalog.is_duplicate("anything.jpg", "FormB", NamingScheme::Fallback));
        }

        #[tokio::test]
        async fn missing_root_yields_empty_catalog() {
            let store = ListingStore {
                tree: HashMap::new(),
            };
            let catalog = DestinationCatalog::build(&store, "Run").await;
            assert_eq!(catalog.form_count(), 0);
        }
    }
}
