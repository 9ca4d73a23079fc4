//! Canonical record template
//!
//! The template is itself a record file: its section order and placeholder
//! text seed new records and refill records with missing sections. The
//! workspace copy under `templates/feature.md` wins; the embedded copy is
//! the fallback and the source for `init` scaffolding.

use std::fs;
use std::io::ErrorKind;

use include_dir::{include_dir, Dir};

use crate::config::{DefaultsConfig, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::record::{today_string, Feature, Section};

/// Starter assets compiled into the binary
static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets");

fn embedded_asset(name: &str) -> Result<&'static str> {
    ASSETS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| TrackerError::Template(format!("embedded asset {name} missing")))
}

/// The embedded canonical template
pub fn embedded_template() -> Result<&'static str> {
    embedded_asset("feature.md")
}

/// The embedded record schema
pub fn embedded_schema() -> Result<&'static str> {
    embedded_asset("feature.schema.json")
}

/// Applies the canonical template to records
pub struct TemplateProcessor {
    sections: Vec<Section>,
    defaults: DefaultsConfig,
}

impl TemplateProcessor {
    /// Load the workspace template, falling back to the embedded copy
    pub fn load(config: &TrackerConfig) -> Result<Self> {
        let text = match fs::read_to_string(config.template_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => embedded_template()?.to_string(),
            Err(e) => return Err(e.into()),
        };
        Self::from_text(&text, config.defaults.clone())
    }

    /// Build a processor from template text
    pub fn from_text(text: &str, defaults: DefaultsConfig) -> Result<Self> {
        let template = Feature::parse("feature.md", text)
            .map_err(|e| TrackerError::Template(format!("unusable template: {e}")))?;
        Ok(Self {
            sections: template.body.sections,
            defaults,
        })
    }

    /// Canonical sections in template order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Fill missing sections and blank defaults on a record.
    ///
    /// Returns whether anything changed. Does not persist and does not
    /// re-stamp dates on its own.
    pub fn apply(&self, record: &mut Feature) -> bool {
        let mut changed = false;

        let header = &mut record.header;
        if header.owner.trim().is_empty() {
            header.owner = self.defaults.owner.clone();
            changed = true;
        }
        if header.priority.trim().is_empty() {
            header.priority = self.defaults.priority.clone();
            changed = true;
        }
        if header.complexity.trim().is_empty() {
            header.complexity = self.defaults.complexity.clone();
            changed = true;
        }
        if header.created.trim().is_empty() {
            header.created = today_string();
            changed = true;
        }
        if header.updated.trim().is_empty() {
            header.updated = today_string();
            changed = true;
        }

        for section in &self.sections {
            if record.body.section(&section.name).is_none() {
                record
                    .body
                    .set_section(section.name.clone(), section.text.clone());
                changed = true;
            }
        }

        changed
    }
}
