//! Dependency manifest parsing
//!
//! The manifest is a newline-separated list of package specifiers in the
//! `requirements.txt` dialect:
//!
//! ```text
//! streamlit>=1.32      # UI runtime
//! boto3==1.34.*
//! pytz
//! --index-url https://pypi.org/simple
//! ```
//!
//! Only package content feeds the cache key: comments, blank lines,
//! whitespace and name spelling (`Foo_Bar` vs `foo-bar`) do not.

use crate::error::{BerthError, BerthResult};
use crate::layer::digest::LayerDigest;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Operators that may open a version constraint
const CONSTRAINT_OPERATORS: &[&str] = &["===", "==", "~=", "!=", ">=", "<=", ">", "<", "@"];

/// A single package requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name as written
    pub name: String,

    /// Optional extras, lowercased (`pkg[s3,cli]`)
    pub extras: Vec<String>,

    /// Version constraint with whitespace removed (`>=1.0,<2`), or a
    /// direct reference (`@ https://...`)
    pub constraint: Option<String>,

    /// Environment marker after `;`
    pub marker: Option<String>,
}

impl Requirement {
    /// Name normalized for comparison: lowercase, runs of `-_.` folded to `-`
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized_name())?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        match &self.constraint {
            Some(c) if c.starts_with('@') => write!(f, " @ {}", &c[1..])?,
            Some(c) => write!(f, "{}", c)?,
            None => {}
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

/// One manifest line that carries content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// A package requirement
    Requirement(Requirement),

    /// An installer option such as `--index-url URL`
    Directive(String),
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requirement(req) => write!(f, "{}", req),
            Self::Directive(d) => write!(f, "{}", d),
        }
    }
}

/// Parsed, immutable dependency manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub async fn from_file(path: &Path) -> BerthResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BerthError::PathNotFound(path.to_path_buf()),
            _ => BerthError::io(format!("reading manifest {}", path.display()), e),
        })?;
        Self::parse_with_path(&content, path)
    }

    /// Parse manifest text
    pub fn parse(content: &str) -> BerthResult<Self> {
        Self::parse_with_path(content, Path::new("requirements.txt"))
    }

    fn parse_with_path(content: &str, path: &Path) -> BerthResult<Self> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (line_no, line) in logical_lines(content) {
            let invalid = |reason: String| BerthError::ManifestInvalid {
                path: PathBuf::from(path),
                line: line_no,
                reason,
            };

            let line = strip_comment(&line).trim().to_string();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('-') {
                let directive = line.split_whitespace().collect::<Vec<_>>().join(" ");
                entries.push(ManifestEntry::Directive(directive));
                continue;
            }

            let req = parse_requirement(&line).map_err(&invalid)?;
            if !seen.insert(req.normalized_name()) {
                return Err(invalid(format!("duplicate requirement '{}'", req.name)));
            }
            entries.push(ManifestEntry::Requirement(req));
        }

        Ok(Self { entries })
    }

    /// All content-bearing entries in declaration order
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Package requirements in declaration order
    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.iter().filter_map(|e| match e {
            ManifestEntry::Requirement(req) => Some(req),
            ManifestEntry::Directive(_) => None,
        })
    }

    /// Number of package requirements; directives are not counted
    pub fn requirement_count(&self) -> usize {
        self.requirements().count()
    }

    /// Whether the manifest has neither requirements nor directives.
    ///
    /// Only a blank manifest skips the installer.
    pub fn is_blank(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized manifest text, one entry per line
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Content hash of the canonical form
    pub fn cache_key(&self) -> LayerDigest {
        LayerDigest::of(self.canonical().as_bytes())
    }
}

/// Normalize a package name: lowercase, runs of `-`, `_`, `.` become `-`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Join backslash-continued lines, yielding (first line number, text)
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let (start, mut text) = pending.take().unwrap_or((idx + 1, String::new()));
        match raw.strip_suffix('\\') {
            Some(head) => {
                text.push_str(head);
                pending = Some((start, text));
            }
            None => {
                text.push_str(raw);
                lines.push((start, text));
            }
        }
    }

    if let Some(rest) = pending {
        lines.push(rest);
    }
    lines
}

/// Drop a `#` comment that starts the line or follows whitespace
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}

fn parse_requirement(line: &str) -> Result<Requirement, String> {
    let (spec, marker) = match line.split_once(';') {
        Some((spec, marker)) => {
            let marker = marker.split_whitespace().collect::<Vec<_>>().join(" ");
            if marker.is_empty() {
                return Err("empty environment marker after ';'".to_string());
            }
            (spec.trim(), Some(marker))
        }
        None => (line.trim(), None),
    };

    let name_end = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(spec.len());
    let name = &spec[..name_end];
    validate_name(name)?;

    let mut rest = spec[name_end..].trim_start();

    let mut extras = Vec::new();
    if let Some(after) = rest.strip_prefix('[') {
        let close = after
            .find(']')
            .ok_or_else(|| format!("unterminated extras for '{}'", name))?;
        for extra in after[..close].split(',') {
            let extra = extra.trim();
            if extra.is_empty() {
                continue;
            }
            validate_name(extra)?;
            extras.push(normalize_name(extra));
        }
        rest = after[close + 1..].trim_start();
    }

    let constraint: String = rest.split_whitespace().collect();
    let constraint = if constraint.is_empty() {
        None
    } else if let Some(url) = rest.strip_prefix('@') {
        let url = url.trim();
        if url.is_empty() {
            return Err(format!("missing URL after '@' for '{}'", name));
        }
        Some(format!("@{}", url))
    } else if CONSTRAINT_OPERATORS
        .iter()
        .any(|op| constraint.starts_with(op))
    {
        Some(constraint)
    } else {
        return Err(format!(
            "unexpected '{}' after package name '{}'",
            rest.trim(),
            name
        ));
    };

    Ok(Requirement {
        name: name.to_string(),
        extras,
        constraint,
        marker,
    })
}

fn validate_name(name: &str) -> Result<(), String> {
    let first = name.chars().next();
    let last = name.chars().last();
    match (first, last) {
        (Some(f), Some(l)) if f.is_ascii_alphanumeric() && l.is_ascii_alphanumeric() => Ok(()),
        (None, _) | (_, None) => Err("expected a package name".to_string()),
        _ => Err(format!(
            "invalid package name '{}': must start and end with a letter or digit",
            name
        )),
    }
}
