//! Validation engine
//!
//! Stateless checks over the on-disk snapshot: schema conformance of every
//! header, workflow placement, filename convention, date sanity, then
//! collection-wide dependency analysis. Findings are data carried on the
//! summary; the engine only hard-fails on infrastructure, like a missing
//! schema file or an unreadable store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use jsonschema::{Draft, JSONSchema};
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::graph::{format_cycle, DependencyGraph};
use crate::manager::FeatureManager;
use crate::record::Feature;
use crate::template::TemplateProcessor;
use crate::workflow::Status;

/// What kind of defect a finding reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// File could not be parsed as a record
    Malformed,
    /// Header violates the record schema
    SchemaViolation,
    /// Status slug is not registered
    UnknownStatus,
    /// File is not in the directory its status maps to
    StatusDirectory,
    /// Filename does not encode id and slugified title
    Filename,
    /// created/updated is not a valid calendar date
    InvalidDate,
    /// Declared dependency does not exist
    MissingDependency,
    /// In-progress record with a dependency that is not done
    UnmetDependency,
    /// Record participates in a dependency cycle
    CircularDependency,
    /// Id is shared by more than one record
    DuplicateId,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::Malformed => "malformed",
            IssueCode::SchemaViolation => "schema_violation",
            IssueCode::UnknownStatus => "unknown_status",
            IssueCode::StatusDirectory => "status_directory",
            IssueCode::Filename => "filename",
            IssueCode::InvalidDate => "invalid_date",
            IssueCode::MissingDependency => "missing_dependency",
            IssueCode::UnmetDependency => "unmet_dependency",
            IssueCode::CircularDependency => "circular_dependency",
            IssueCode::DuplicateId => "duplicate_id",
        }
    }
}

/// One validation finding
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    /// Record id the finding is attached to; empty for files whose id is
    /// unknowable (unparsable records)
    pub id: String,
    pub path: PathBuf,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        code: IssueCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            code,
            message: message.into(),
        }
    }
}

/// Aggregate result of a collection-wide validation pass
#[derive(Debug, Default, Serialize)]
pub struct Summary {
    /// Records that parsed and were checked
    pub checked: usize,
    pub issues: Vec<Issue>,
}

impl Summary {
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Ids with at least one finding, sorted
    pub fn ids_with_issues(&self) -> BTreeSet<&str> {
        self.issues
            .iter()
            .filter(|i| !i.id.is_empty())
            .map(|i| i.id.as_str())
            .collect()
    }

    /// Findings attached to one id
    pub fn for_id(&self, id: &str) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.id == id).collect()
    }

    /// Plain-text report, one finding per line
    pub fn format_all(&self) -> String {
        let mut out = format!(
            "checked {} record(s), {} issue(s)\n",
            self.checked,
            self.issues.len()
        );
        for issue in &self.issues {
            let id = if issue.id.is_empty() { "-" } else { &issue.id };
            out.push_str(&format!(
                "  [{}] {} ({}): {}\n",
                issue.code.as_str(),
                id,
                issue.path.display(),
                issue.message
            ));
        }
        out
    }
}

/// Findings for a single record
#[derive(Debug, Serialize)]
pub struct RecordReport {
    pub id: String,
    pub path: PathBuf,
    pub issues: Vec<Issue>,
}

impl RecordReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Runs validation passes over the store
#[derive(Debug)]
pub struct Validator {
    manager: FeatureManager,
    schema: JSONSchema,
}

impl Validator {
    /// Compile the record schema and bind the store. The schema file is
    /// required; `init` scaffolds it.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let schema = compile_schema(&config)?;
        let manager = FeatureManager::new(config)?;
        Ok(Self { manager, schema })
    }

    /// Validate every record and the dependency graph across the whole
    /// collection.
    pub fn validate_all(&self) -> Result<Summary> {
        let listing = self.manager.list()?;
        let mut summary = Summary {
            checked: listing.features.len(),
            issues: Vec::new(),
        };

        for failure in &listing.failures {
            summary.push(Issue::new(
                "",
                failure.path.clone(),
                IssueCode::Malformed,
                failure.reason.clone(),
            ));
        }

        for record in &listing.features {
            self.check_record(record, &mut summary.issues);
        }

        self.check_graph(&listing.features, &mut summary.issues);

        Ok(summary)
    }

    /// Validate one record: all single-record checks, dependency checks one
    /// hop out, and any collection-wide cycle passing through the record.
    pub fn validate_one(&self, id: &str) -> Result<RecordReport> {
        let record = self.manager.load_by_id(id)?;
        let mut issues = Vec::new();

        self.check_record(&record, &mut issues);

        for dep in &record.header.dependencies {
            match self.manager.load_by_id(dep) {
                Ok(dep_record) => {
                    if record.status() == Some(Status::InProgress)
                        && dep_record.status() != Some(Status::Done)
                    {
                        issues.push(Issue::new(
                            record.id(),
                            record.path.clone(),
                            IssueCode::UnmetDependency,
                            format!("in-progress but dependency {dep} is not done"),
                        ));
                    }
                }
                Err(TrackerError::NotFound { .. }) => {
                    issues.push(Issue::new(
                        record.id(),
                        record.path.clone(),
                        IssueCode::MissingDependency,
                        format!("dependency {dep} does not exist"),
                    ));
                }
                Err(TrackerError::MalformedRecord { .. }) => {
                    issues.push(Issue::new(
                        record.id(),
                        record.path.clone(),
                        IssueCode::MissingDependency,
                        format!("dependency {dep} is unreadable"),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        // Cycles and duplicates are collection-scope facts
        let listing = self.manager.list()?;
        let sharers = listing
            .features
            .iter()
            .filter(|r| r.id() == record.id())
            .count();
        if sharers > 1 {
            issues.push(Issue::new(
                record.id(),
                record.path.clone(),
                IssueCode::DuplicateId,
                format!("id {} is used by {} records", record.id(), sharers),
            ));
        }

        let graph = DependencyGraph::new(
            listing
                .features
                .iter()
                .filter(|r| !r.id().is_empty())
                .map(|r| (r.id().to_string(), r.header.dependencies.clone())),
        );
        for members in graph.cycles() {
            if members.iter().any(|m| m == record.id()) {
                issues.push(Issue::new(
                    record.id(),
                    record.path.clone(),
                    IssueCode::CircularDependency,
                    format!("circular dependency: {}", format_cycle(&members)),
                ));
            }
        }

        Ok(RecordReport {
            id: record.id().to_string(),
            path: record.path.clone(),
            issues,
        })
    }

    /// Re-apply the canonical template to the selected records, persisting
    /// each that changed. Returns the ids that were rewritten. Validation is
    /// not re-run; callers re-validate when they want fresh findings.
    pub fn apply_fixes(&self, ids: &[String], template: &TemplateProcessor) -> Result<Vec<String>> {
        let mut fixed = Vec::new();
        for id in ids {
            let mut record = self.manager.load_by_id(id)?;
            if template.apply(&mut record) {
                self.manager.update(&mut record)?;
                fixed.push(record.id().to_string());
            }
        }
        Ok(fixed)
    }

    fn check_record(&self, record: &Feature, issues: &mut Vec<Issue>) {
        // Schema conformance of the header as it sits on disk
        if let Err(errors) = self.schema.validate(&record.raw_header) {
            for error in errors {
                let pointer = error.instance_path.to_string();
                let message = if pointer.is_empty() {
                    error.to_string()
                } else {
                    format!("{pointer}: {error}")
                };
                issues.push(Issue::new(
                    record.id(),
                    record.path.clone(),
                    IssueCode::SchemaViolation,
                    message,
                ));
            }
        }

        // Workflow placement
        match record.status() {
            None => {
                issues.push(Issue::new(
                    record.id(),
                    record.path.clone(),
                    IssueCode::UnknownStatus,
                    format!("status '{}' is not registered", record.header.status),
                ));
            }
            Some(status) => {
                let in_status_dir = record
                    .path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy() == status.dir_name())
                    .unwrap_or(false);
                if !in_status_dir {
                    issues.push(Issue::new(
                        record.id(),
                        record.path.clone(),
                        IssueCode::StatusDirectory,
                        format!("status is {} but the file is not under {}/", status, status.dir_name()),
                    ));
                }
            }
        }

        // Filename convention
        if !record.filename_matches() {
            issues.push(Issue::new(
                record.id(),
                record.path.clone(),
                IssueCode::Filename,
                format!("expected filename {}", record.canonical_filename()),
            ));
        }

        // Calendar validity
        for (field, value) in [
            ("created", &record.header.created),
            ("updated", &record.header.updated),
        ] {
            if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                issues.push(Issue::new(
                    record.id(),
                    record.path.clone(),
                    IssueCode::InvalidDate,
                    format!("{field} date '{value}' is not a valid calendar date"),
                ));
            }
        }
    }

    fn check_graph(&self, records: &[Feature], issues: &mut Vec<Issue>) {
        let mut by_id: BTreeMap<&str, Vec<&Feature>> = BTreeMap::new();
        for record in records {
            if !record.id().is_empty() {
                by_id.entry(record.id()).or_default().push(record);
            }
        }

        // Duplicate ids: every sharer is flagged, none wins
        for (id, sharers) in &by_id {
            if sharers.len() > 1 {
                for record in sharers {
                    issues.push(Issue::new(
                        *id,
                        record.path.clone(),
                        IssueCode::DuplicateId,
                        format!("id {} is used by {} records", id, sharers.len()),
                    ));
                }
            }
        }

        // Dependency existence and the in-progress precondition
        let status_of: BTreeMap<&str, Option<Status>> = by_id
            .iter()
            .map(|(id, sharers)| (*id, sharers[0].status()))
            .collect();

        for record in records {
            for dep in &record.header.dependencies {
                match status_of.get(dep.as_str()) {
                    None => issues.push(Issue::new(
                        record.id(),
                        record.path.clone(),
                        IssueCode::MissingDependency,
                        format!("dependency {dep} does not exist"),
                    )),
                    Some(dep_status) => {
                        if record.status() == Some(Status::InProgress)
                            && *dep_status != Some(Status::Done)
                        {
                            issues.push(Issue::new(
                                record.id(),
                                record.path.clone(),
                                IssueCode::UnmetDependency,
                                format!("in-progress but dependency {dep} is not done"),
                            ));
                        }
                    }
                }
            }
        }

        // Cycles: the same message lands on every member
        let graph = DependencyGraph::new(
            records
                .iter()
                .filter(|r| !r.id().is_empty())
                .map(|r| (r.id().to_string(), r.header.dependencies.clone())),
        );
        for members in graph.cycles() {
            let message = format!("circular dependency: {}", format_cycle(&members));
            for member in &members {
                if let Some(sharers) = by_id.get(member.as_str()) {
                    for record in sharers {
                        issues.push(Issue::new(
                            member.clone(),
                            record.path.clone(),
                            IssueCode::CircularDependency,
                            message.clone(),
                        ));
                    }
                }
            }
        }
    }
}

fn compile_schema(config: &TrackerConfig) -> Result<JSONSchema> {
    let path = config.schema_path();
    let text = fs::read_to_string(&path).map_err(|e| TrackerError::SchemaFile {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| TrackerError::SchemaFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&value)
        .map_err(|e| TrackerError::SchemaFile {
            path,
            reason: e.to_string(),
        })
}
