//! Feature records
//!
//! A record is one Markdown file: a YAML front matter header between `---`
//! delimiters, an optional intro blob, then `## `-headed sections. The codec
//! is deliberately permissive about values: a wrong status literal or an
//! invalid date still parses and surfaces later as a validation finding.
//! `MalformedRecord` is reserved for structural failures (missing delimiter,
//! header not a mapping, a field of the wrong shape).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::workflow::Status;

/// Header of a feature record, as stored in YAML front matter.
///
/// Scalar fields are raw strings. Optional and list attributes are omitted
/// from the encoded header when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureHeader {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "opt_is_blank")]
    pub epic: Option<String>,
    #[serde(default, skip_serializing_if = "opt_is_blank")]
    pub risk_notes: Option<String>,
}

fn opt_is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// One named body section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub text: String,
}

/// Record body: intro blob plus ordered sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Free text before the first section heading
    pub intro: String,
    /// Sections in file order
    pub sections: Vec<Section>,
}

impl Body {
    /// Parse body text by scanning top-level `## ` headings. Deeper headings
    /// stay inside the enclosing section. A repeated heading keeps its first
    /// position but takes the last content.
    pub fn parse(text: &str) -> Body {
        fn join(lines: Vec<&str>) -> String {
            lines.join("\n").trim().to_string()
        }

        let mut body = Body::default();
        let mut intro_lines: Vec<&str> = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some((name, lines)) = current.take() {
                    body.set_section(name, join(lines));
                }
                current = Some((heading.trim().to_string(), Vec::new()));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            } else {
                intro_lines.push(line);
            }
        }
        if let Some((name, lines)) = current.take() {
            body.set_section(name, join(lines));
        }

        body.intro = join(intro_lines);
        body
    }

    /// Content of a section by name
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.text.as_str())
    }

    /// Replace a section's content in place, or append a new section
    pub fn set_section(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.text = text,
            None => self.sections.push(Section { name, text }),
        }
    }

    /// Section names in file order
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A feature record bound to its on-disk location
#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    /// Where the record was read from (or will be written)
    pub path: PathBuf,
    /// Typed header
    pub header: FeatureHeader,
    /// Sectioned body
    pub body: Body,
    /// Header exactly as decoded from disk, for schema validation. Reflects
    /// the last parse, not later in-memory mutation.
    #[serde(skip)]
    pub raw_header: serde_json::Value,
}

impl Feature {
    /// Parse a record from its on-disk text.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Feature> {
        let path = path.into();
        let malformed = |reason: String| TrackerError::MalformedRecord {
            path: path.clone(),
            reason,
        };

        let text = text.trim_start();
        let rest = text
            .strip_prefix("---")
            .ok_or_else(|| malformed("missing opening --- delimiter".to_string()))?;
        let close = rest
            .find("\n---")
            .ok_or_else(|| malformed("missing closing --- delimiter".to_string()))?;
        let yaml_str = &rest[..close];
        let after = &rest[close + "\n---".len()..];
        let body_text = after.strip_prefix('\n').unwrap_or(after);

        let yaml: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml_str)
            .map_err(|e| malformed(format!("invalid YAML header: {e}")))?;
        if !yaml.is_mapping() {
            return Err(malformed("header is not a mapping".to_string()));
        }
        let raw_header = serde_json::to_value(&yaml)
            .map_err(|e| malformed(format!("unrepresentable header: {e}")))?;
        let header: FeatureHeader = serde_json::from_value(raw_header.clone())
            .map_err(|e| malformed(format!("invalid header field: {e}")))?;

        Ok(Feature {
            path,
            header,
            body: Body::parse(body_text),
            raw_header,
        })
    }

    /// Encode the record back to its on-disk text. Re-parsing the result
    /// yields an equal logical record.
    pub fn encode(&self) -> Result<String> {
        let yaml = serde_yaml_ng::to_string(&self.header)?;

        let mut out = String::with_capacity(yaml.len() + 256);
        out.push_str("---\n");
        out.push_str(&yaml);
        out.push_str("---\n");

        if !self.body.intro.is_empty() {
            out.push('\n');
            out.push_str(&self.body.intro);
            out.push('\n');
        }
        for section in &self.body.sections {
            out.push('\n');
            out.push_str("## ");
            out.push_str(&section.name);
            out.push('\n');
            if !section.text.is_empty() {
                out.push('\n');
                out.push_str(&section.text);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Record id
    pub fn id(&self) -> &str {
        &self.header.id
    }

    /// Parsed workflow status, if the header carries a registered slug
    pub fn status(&self) -> Option<Status> {
        Status::parse(&self.header.status)
    }

    /// The filename this record should live under
    pub fn canonical_filename(&self) -> String {
        format!("{}-{}.md", self.header.id, slugify(&self.header.title))
    }

    /// Whether the record sits under the filename its id and title demand
    pub fn filename_matches(&self) -> bool {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy() == self.canonical_filename())
            .unwrap_or(false)
    }

    /// Re-stamp the `updated` date to today
    pub fn touch(&mut self) {
        self.header.updated = today_string();
    }

    pub fn set_status(&mut self, status: Status) {
        self.header.status = status.as_str().to_string();
        self.touch();
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.header.owner = owner.into();
        self.touch();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.header.title = title.into();
        self.touch();
    }

    pub fn set_section(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.body.set_section(name, text);
        self.touch();
    }
}

/// Today's date in the `YYYY-MM-DD` form used by record headers
pub(crate) fn today_string() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Lowercase a title into a filename slug: alphanumerics kept, everything
/// else collapsed into single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}
