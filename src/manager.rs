//! Feature manager
//!
//! Orchestrates creation, loading, status moves, updates, deletion, and
//! listing. The manager exclusively owns on-disk placement: a status move
//! writes the record at its new location before removing the old file, so
//! the record is resolvable at one well-defined path at every instant.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::{ParseFailure, Result, TrackerError};
use crate::fsio;
use crate::record::{today_string, Body, Feature, FeatureHeader};
use crate::template::{embedded_schema, embedded_template, TemplateProcessor};
use crate::workflow::{validate_status, validate_transition, Status, STATUSES};

/// Result of a listing pass: every parseable record, plus every file that
/// failed and why. One bad file never aborts the walk.
#[derive(Debug, Default, Serialize)]
pub struct Listing {
    pub features: Vec<Feature>,
    pub failures: Vec<ParseFailure>,
}

impl Listing {
    /// Treat parse failures as fatal: the aggregate error names every
    /// offending file.
    pub fn into_result(self) -> Result<Vec<Feature>> {
        if self.failures.is_empty() {
            Ok(self.features)
        } else {
            Err(TrackerError::MalformedBatch {
                failures: self.failures,
            })
        }
    }
}

/// Outcome of a status move. Warnings carry non-fatal cleanup failures,
/// distinct from the operation's success.
#[derive(Debug, Clone, Serialize)]
pub struct MoveReceipt {
    pub id: String,
    pub from: String,
    pub to: String,
    pub from_path: PathBuf,
    pub to_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Orchestrates all record mutations and lookups
#[derive(Debug)]
pub struct FeatureManager {
    config: TrackerConfig,
    id_pattern: Regex,
}

impl FeatureManager {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let pattern = format!(r"(?i)^{}-(\d+)", regex::escape(&config.ids.prefix));
        let id_pattern = Regex::new(&pattern)
            .map_err(|e| TrackerError::InvalidArgument(format!("unusable id prefix: {e}")))?;
        Ok(Self { config, id_pattern })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Scaffold the store layout: status directories, templates/, schemas/,
    /// locks/, and the starter template and schema. Existing files are never
    /// overwritten. Returns the paths that were (or in dry-run, would be)
    /// created.
    pub fn init(&self) -> Result<Vec<PathBuf>> {
        let dry_run = self.config.store.dry_run;
        let mut created = Vec::new();

        let mut dirs: Vec<PathBuf> = STATUSES.iter().map(|s| self.config.status_dir(*s)).collect();
        dirs.push(self.config.templates_dir());
        dirs.push(self.config.schemas_dir());
        dirs.push(self.config.locks_dir());

        for dir in dirs {
            if !dir.exists() {
                if !dry_run {
                    fs::create_dir_all(&dir)?;
                }
                created.push(dir);
            }
        }

        let template_path = self.config.template_path();
        if !template_path.exists() {
            if !dry_run {
                fsio::atomic_write(&template_path, embedded_template()?)?;
            }
            created.push(template_path);
        }

        let schema_path = self.config.schema_path();
        if !schema_path.exists() {
            if !dry_run {
                fsio::atomic_write(&schema_path, embedded_schema()?)?;
            }
            created.push(schema_path);
        }

        if dry_run {
            tracing::info!(
                "Dry-run: would initialize {} ({} entries)",
                self.config.root().display(),
                created.len()
            );
        } else {
            tracing::info!("Initialized tracker layout at {}", self.config.root().display());
        }
        Ok(created)
    }

    /// Next free id: one greater than the highest numeric suffix found in
    /// any record filename. A missing features root counts as empty.
    pub fn next_id(&self) -> Result<String> {
        let files = fsio::collect_record_files(&self.config.features_root())?;
        let mut max = 0u64;
        for path in &files {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(m) = self.id_pattern.captures(name).and_then(|c| c.get(1)) {
                    if let Ok(n) = m.as_str().parse::<u64>() {
                        max = max.max(n);
                    }
                }
            }
        }
        Ok(self.config.format_id(max + 1))
    }

    /// Create a record in backlog, seeded from the canonical template.
    pub fn create(&self, title: &str, labels: Vec<String>) -> Result<Feature> {
        let id = self.next_id()?;
        let template = TemplateProcessor::load(&self.config)?;

        let today = today_string();
        let header = FeatureHeader {
            id: id.clone(),
            title: title.to_string(),
            status: Status::Backlog.as_str().to_string(),
            created: today.clone(),
            updated: today,
            labels,
            ..FeatureHeader::default()
        };

        let mut record = Feature {
            path: PathBuf::new(),
            header,
            body: Body::default(),
            raw_header: serde_json::Value::Null,
        };
        template.apply(&mut record);
        record.path = self
            .config
            .status_dir(Status::Backlog)
            .join(record.canonical_filename());
        record.raw_header = serde_json::to_value(&record.header)?;

        if self.config.store.dry_run {
            tracing::info!("Dry-run: would create {} at {}", id, record.path.display());
            return Ok(record);
        }

        fsio::atomic_write(&record.path, &record.encode()?)?;
        tracing::info!("Created {} ({}) in backlog", id, title);
        Ok(record)
    }

    /// Load a record by id, matching the filename prefix `{id}-`
    /// case-insensitively.
    pub fn load_by_id(&self, id: &str) -> Result<Feature> {
        let path = self.find_path(id)?.ok_or_else(|| TrackerError::NotFound {
            id: id.to_string(),
        })?;
        self.load_path(&path)
    }

    /// Parse the record at a known path
    pub fn load_path(&self, path: &Path) -> Result<Feature> {
        let text = fs::read_to_string(path)?;
        Feature::parse(path, &text)
    }

    fn find_path(&self, id: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}-", id.to_lowercase());
        let files = fsio::collect_record_files(&self.config.features_root())?;
        Ok(files.into_iter().find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase().starts_with(&prefix))
                .unwrap_or(false)
        }))
    }

    /// Move a record to a new status.
    ///
    /// Validates the status and the transition, enforces the dependency
    /// precondition for moves into in-progress, then writes the destination
    /// before removing the source. A removal failure after a successful
    /// write lands on the receipt's warning channel, not in the result.
    pub fn move_to(
        &self,
        id: &str,
        new_status: &str,
        owner: Option<&str>,
    ) -> Result<(Feature, MoveReceipt)> {
        let mut record = self.load_by_id(id)?;
        let to = validate_status(new_status)?;
        validate_transition(&record.header.status, to)?;

        if to == Status::InProgress {
            self.check_dependencies_done(&record)?;
        }

        let old_path = record.path.clone();
        let from_slug = record.header.status.clone();

        record.set_status(to);
        match owner.map(str::trim) {
            Some("") | None if record.header.owner.trim().is_empty() => {
                record.header.owner = self.config.defaults.owner.clone();
            }
            Some("") => record.header.owner = self.config.defaults.owner.clone(),
            Some(owner) => record.header.owner = owner.to_string(),
            None => {}
        }

        let new_path = self.config.status_dir(to).join(record.canonical_filename());
        record.path = new_path.clone();

        let mut receipt = MoveReceipt {
            id: record.id().to_string(),
            from: from_slug.clone(),
            to: to.as_str().to_string(),
            from_path: old_path.clone(),
            to_path: new_path.clone(),
            warnings: Vec::new(),
        };

        if self.config.store.dry_run {
            tracing::info!("Dry-run: would move {} from {} to {}", id, from_slug, to);
            return Ok((record, receipt));
        }

        // Destination first; the source is only cleanup after this point
        fsio::atomic_write(&new_path, &record.encode()?)?;

        if new_path != old_path {
            if let Err(e) = fs::remove_file(&old_path) {
                tracing::warn!(
                    "Moved {} but could not remove old file {}: {}",
                    id,
                    old_path.display(),
                    e
                );
                receipt
                    .warnings
                    .push(format!("could not remove old file {}: {}", old_path.display(), e));
            }
        }

        tracing::info!("Moved {} from {} to {}", id, from_slug, to);
        Ok((record, receipt))
    }

    fn check_dependencies_done(&self, record: &Feature) -> Result<()> {
        for dep in &record.header.dependencies {
            let done = match self.load_by_id(dep) {
                Ok(dep_record) => dep_record.status() == Some(Status::Done),
                // A dependency that cannot be resolved or read cannot be
                // proven done
                Err(TrackerError::NotFound { .. }) | Err(TrackerError::MalformedRecord { .. }) => {
                    false
                }
                Err(e) => return Err(e),
            };
            if !done {
                return Err(TrackerError::DependencyBlocked {
                    id: record.id().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    /// Re-stamp and persist a record in place
    pub fn update(&self, record: &mut Feature) -> Result<()> {
        record.touch();
        if self.config.store.dry_run {
            tracing::info!("Dry-run: would update {}", record.id());
            return Ok(());
        }
        fsio::atomic_write(&record.path, &record.encode()?)?;
        tracing::info!("Updated {}", record.id());
        Ok(())
    }

    /// Delete a record's file. Returns the resolved path, also in dry-run
    /// where nothing is removed.
    pub fn delete(&self, id: &str) -> Result<PathBuf> {
        let path = self.find_path(id)?.ok_or_else(|| TrackerError::NotFound {
            id: id.to_string(),
        })?;
        if self.config.store.dry_run {
            tracing::info!("Dry-run: would delete {}", path.display());
            return Ok(path);
        }
        fs::remove_file(&path)?;
        tracing::info!("Deleted {} ({})", id, path.display());
        Ok(path)
    }

    /// Parse every record under the features root. Files that fail to read
    /// or parse are collected, not fatal.
    pub fn list(&self) -> Result<Listing> {
        let files = fsio::collect_record_files(&self.config.features_root())?;
        let mut listing = Listing::default();

        for path in files {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    listing.failures.push(ParseFailure {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match Feature::parse(&path, &text) {
                Ok(record) => listing.features.push(record),
                Err(e) => {
                    let reason = match e {
                        TrackerError::MalformedRecord { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    listing.failures.push(ParseFailure { path, reason });
                }
            }
        }

        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(root: &Path) -> FeatureManager {
        FeatureManager::new(TrackerConfig::with_root(root)).unwrap()
    }

    fn dry_manager(root: &Path) -> FeatureManager {
        let mut config = TrackerConfig::with_root(root);
        config.store.dry_run = true;
        FeatureManager::new(config).unwrap()
    }

    #[test]
    fn test_next_id_on_empty_store() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        assert_eq!(mgr.next_id().unwrap(), "FEAT-0001");
    }

    #[test]
    fn test_next_id_scans_all_statuses() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.init().unwrap();

        fs::write(
            dir.path().join("features/done/FEAT-0007-old.md"),
            "---\nid: FEAT-0007\n---\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("features/backlog/feat-0003-low.md"),
            "---\nid: FEAT-0003\n---\n",
        )
        .unwrap();

        assert_eq!(mgr.next_id().unwrap(), "FEAT-0008");
    }

    #[test]
    fn test_create_seeds_record() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let record = mgr.create("Add search", vec!["core".to_string()]).unwrap();

        assert_eq!(record.id(), "FEAT-0001");
        assert_eq!(record.header.status, "backlog");
        assert_eq!(record.header.owner, "unassigned");
        assert_eq!(record.header.priority, "medium");
        assert_eq!(record.header.labels, vec!["core"]);
        assert!(record.body.section("Summary").is_some());
        assert!(record.path.ends_with("features/backlog/FEAT-0001-add-search.md"));
        assert!(record.path.exists());
    }

    #[test]
    fn test_create_allocates_monotonically() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        mgr.create("Alpha", Vec::new()).unwrap();
        let second = mgr.create("Beta", Vec::new()).unwrap();
        assert_eq!(second.id(), "FEAT-0002");
    }

    #[test]
    fn test_load_by_id_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();

        let record = mgr.load_by_id("feat-0001").unwrap();
        assert_eq!(record.header.title, "Alpha");
    }

    #[test]
    fn test_load_by_id_not_found() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr.load_by_id("FEAT-0404").unwrap_err();
        assert!(matches!(err, TrackerError::NotFound { id } if id == "FEAT-0404"));
    }

    #[test]
    fn test_move_relocates_file() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();

        let (record, receipt) = mgr.move_to("FEAT-0001", "in-progress", Some("dana")).unwrap();

        assert_eq!(record.header.status, "in-progress");
        assert_eq!(record.header.owner, "dana");
        assert!(record.path.ends_with("features/in-progress/FEAT-0001-alpha.md"));
        assert!(record.path.exists());
        assert!(!receipt.from_path.exists());
        assert!(receipt.warnings.is_empty());
    }

    #[test]
    fn test_move_rejects_illegal_transition() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();

        let err = mgr.move_to("FEAT-0001", "done", None).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_move_rejects_unknown_status() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();

        let err = mgr.move_to("FEAT-0001", "shipped", None).unwrap_err();
        assert!(matches!(err, TrackerError::UnknownStatus(_)));
    }

    #[test]
    fn test_move_blocked_by_dependency() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();
        let mut beta = mgr.create("Beta", Vec::new()).unwrap();
        beta.header.dependencies = vec!["FEAT-0001".to_string()];
        mgr.update(&mut beta).unwrap();

        let err = mgr.move_to("FEAT-0002", "in-progress", None).unwrap_err();
        match err {
            TrackerError::DependencyBlocked { id, dependency } => {
                assert_eq!(id, "FEAT-0002");
                assert_eq!(dependency, "FEAT-0001");
            }
            other => panic!("expected DependencyBlocked, got {other:?}"),
        }
    }

    #[test]
    fn test_move_blocked_by_missing_dependency() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let mut alpha = mgr.create("Alpha", Vec::new()).unwrap();
        alpha.header.dependencies = vec!["FEAT-0404".to_string()];
        mgr.update(&mut alpha).unwrap();

        let err = mgr.move_to("FEAT-0001", "in-progress", None).unwrap_err();
        assert!(
            matches!(err, TrackerError::DependencyBlocked { dependency, .. } if dependency == "FEAT-0404")
        );
    }

    #[test]
    fn test_move_fixes_stale_filename() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let mut record = mgr.create("Alpha", Vec::new()).unwrap();
        record.set_title("Alpha two");
        mgr.update(&mut record).unwrap();

        let (moved, _) = mgr.move_to("FEAT-0001", "in-progress", None).unwrap();
        assert!(moved
            .path
            .ends_with("features/in-progress/FEAT-0001-alpha-two.md"));
    }

    #[test]
    fn test_update_restamps() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let mut record = mgr.create("Alpha", Vec::new()).unwrap();
        record.header.updated = "2000-01-01".to_string();

        mgr.update(&mut record).unwrap();

        let reloaded = mgr.load_by_id("FEAT-0001").unwrap();
        assert_ne!(reloaded.header.updated, "2000-01-01");
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let record = mgr.create("Alpha", Vec::new()).unwrap();

        let path = mgr.delete("FEAT-0001").unwrap();
        assert_eq!(path, record.path);
        assert!(!path.exists());
    }

    #[test]
    fn test_dry_run_mutations_touch_nothing() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();

        let dry = dry_manager(dir.path());

        let created = dry.create("Beta", Vec::new()).unwrap();
        assert_eq!(created.id(), "FEAT-0002");
        assert!(!created.path.exists());

        let (moved, _) = dry.move_to("FEAT-0001", "in-progress", None).unwrap();
        assert!(!moved.path.exists());
        assert!(mgr.load_by_id("FEAT-0001").unwrap().path.ends_with(
            "features/backlog/FEAT-0001-alpha.md"
        ));

        let path = dry.delete("FEAT-0001").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_list_aggregates_failures() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create("Alpha", Vec::new()).unwrap();
        mgr.create("Beta", Vec::new()).unwrap();

        let bad = dir.path().join("features/backlog/FEAT-0009-broken.md");
        fs::write(&bad, "no front matter here\n").unwrap();

        let listing = mgr.list().unwrap();
        assert_eq!(listing.features.len(), 2);
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].path, bad);

        let err = mgr.list().unwrap().into_result().unwrap_err();
        assert!(matches!(err, TrackerError::MalformedBatch { failures } if failures.len() == 1));
    }

    #[test]
    fn test_init_scaffolds_once() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let created = mgr.init().unwrap();
        assert!(!created.is_empty());
        assert!(dir.path().join("features/backlog").is_dir());
        assert!(dir.path().join("templates/feature.md").is_file());
        assert!(dir.path().join("schemas/feature.schema.json").is_file());
        assert!(dir.path().join("locks").is_dir());

        let again = mgr.init().unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_init_dry_run_reports_without_writing() {
        let dir = tempdir().unwrap();
        let dry = dry_manager(dir.path());

        let would_create = dry.init().unwrap();
        assert!(!would_create.is_empty());
        assert!(!dir.path().join("features").exists());
    }
}
