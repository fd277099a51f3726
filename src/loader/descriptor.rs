//! Reads the YAML descriptors (`deployment.yaml`, `schedule.yaml`) into typed records.
//!
//! A document that does not parse is reported as unreadable. Inside a document that does,
//! every entry of a section is converted on its own, so one malformed entry never hides the
//! rest of the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::{Error, Result};

/// Parses descriptor text. A blank or comment-only document is `Value::Null`.
pub fn parse_descriptor(path: &Path, text: &str) -> Result<Value> {
    let has_content = text.lines().map(str::trim).any(|line| !line.is_empty() && !line.starts_with('#'));
    if !has_content {
        return Ok(Value::Null);
    }

    serde_yaml::from_str(text).map_err(|e| Error::UnparseableDescriptor { path: path.to_path_buf(), reason: e.to_string() })
}

/// Reads and parses a descriptor file.
pub fn load_descriptor(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(Error::IoError)?;
    parse_descriptor(path, &text)
}

/// Text of a scalar. Numbers and booleans are rendered the way they were written.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Scalars of a sequence. A lone scalar counts as a one-element list.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).filter(|s| !s.is_empty()).into_iter().collect(),
    }
}

/// Tagged result of reading typed records out of a descriptor.
///
/// Readers never raise: callers get either the records (plus what had to be skipped) or
/// the reason nothing could be read, and decide themselves whether that matters.
#[derive(Debug, Clone)]
pub enum DescriptorRead<T> {
    Loaded { items: Vec<T>, skipped: Vec<String> },
    Unreadable { path: PathBuf, reason: String },
    SectionMissing { path: PathBuf, section: &'static str },
}

impl<T> DescriptorRead<T> {
    pub fn items(&self) -> &[T] {
        match self {
            DescriptorRead::Loaded { items, .. } => items,
            _ => &[],
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            DescriptorRead::Loaded { items, .. } => items,
            _ => Vec::new(),
        }
    }

    /// Anything short of a clean, complete read.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, DescriptorRead::Loaded { skipped, .. } if skipped.is_empty())
    }

    /// Human-readable reason for a degraded read, `None` for a clean one.
    pub fn problem(&self) -> Option<String> {
        match self {
            DescriptorRead::Loaded { skipped, .. } if skipped.is_empty() => None,
            DescriptorRead::Loaded { skipped, .. } => Some(format!("skipped {} malformed entr{}: {}", skipped.len(), if skipped.len() == 1 { "y" } else { "ies" }, skipped.join("; "))),
            DescriptorRead::Unreadable { path, reason } => Some(format!("could not read '{}': {}", path.display(), reason)),
            DescriptorRead::SectionMissing { path, section } => Some(format!("'{}' has no top-level '{}:' section", path.display(), section)),
        }
    }
}

/// Loads `path` and hands every entry of the top-level list `section` to `convert`.
/// Entries for which `convert` returns `Err` are skipped, never merged into a neighbour.
pub fn read_section<T>(path: &Path, section: &'static str, convert: impl Fn(&Value) -> std::result::Result<T, String>) -> DescriptorRead<T> {
    let document = match load_descriptor(path) {
        Ok(document) => document,
        Err(e) => {
            log::warn!("Descriptor '{}' unreadable: {}", path.display(), e);
            let reason = match e {
                Error::UnparseableDescriptor { reason, .. } => reason,
                other => other.to_string(),
            };
            return DescriptorRead::Unreadable { path: path.to_path_buf(), reason };
        }
    };

    let Some(node) = document.get(section) else {
        log::warn!("Descriptor '{}' has no '{}' section", path.display(), section);
        return DescriptorRead::SectionMissing { path: path.to_path_buf(), section };
    };

    let entries: &[Value] = match node {
        Value::Sequence(entries) => entries,
        Value::Null => &[],
        _ => {
            log::warn!("Section '{}' in '{}' is not a list", section, path.display());
            return DescriptorRead::Loaded { items: Vec::new(), skipped: vec![format!("'{}' is not a list", section)] };
        }
    };

    let mut items = Vec::new();
    let mut skipped = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        match convert(entry) {
            Ok(item) => items.push(item),
            Err(reason) => {
                log::warn!("Skipping {} entry #{} in '{}': {}", section, idx + 1, path.display(), reason);
                skipped.push(format!("#{} {}", idx + 1, reason));
            }
        }
    }

    DescriptorRead::Loaded { items, skipped }
}
