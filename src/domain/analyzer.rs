use std::path::Path;

use crate::config::MarkerSet;
use crate::error::Error;

/// Distinct marker patterns found on at least one uncommented line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeAnalysis {
    pub inefficient_active: usize,
    pub efficient_active: usize,
}

impl CodeAnalysis {
    /// Either no individual-call idiom is left, or a bulk idiom is present.
    ///
    /// A file containing neither marker (e.g. an emptied function) also passes.
    pub fn is_optimized(&self) -> bool {
        self.inefficient_active == 0 || self.efficient_active > 0
    }
}

/// Classifies the optimizable artifact by literal marker substrings.
#[derive(Debug, Clone)]
pub struct CodeStateAnalyzer {
    markers: MarkerSet,
}

impl CodeStateAnalyzer {
    pub fn new(markers: MarkerSet) -> Self {
        CodeStateAnalyzer { markers }
    }

    fn is_comment(&self, line: &str) -> bool {
        let stripped = line.trim_start();
        self.markers.comment_prefixes.iter().any(|prefix| stripped.starts_with(prefix.as_str()))
    }

    pub fn analyze(&self, source_text: &str) -> CodeAnalysis {
        let active_lines: Vec<&str> = source_text.lines().filter(|line| !self.is_comment(line)).collect();

        let count_active = |patterns: &[String]| patterns.iter().filter(|p| !p.is_empty() && active_lines.iter().any(|line| line.contains(p.as_str()))).count();

        CodeAnalysis { inefficient_active: count_active(self.markers.inefficient.as_slice()), efficient_active: count_active(self.markers.efficient.as_slice()) }
    }

    pub fn is_optimized(&self, source_text: &str) -> bool {
        self.analyze(source_text).is_optimized()
    }

    /// Reads and analyzes the artifact at `path`.
    pub fn analyze_file(&self, path: &Path) -> Result<CodeAnalysis, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::UnreadableArtifact { path: path.to_path_buf(), reason: e.to_string() })?;
        Ok(self.analyze(&text))
    }

    /// `false` when the artifact cannot be read.
    pub fn is_artifact_optimized(&self, path: &Path) -> bool {
        match self.analyze_file(path) {
            Ok(analysis) => analysis.is_optimized(),
            Err(e) => {
                log::warn!("{}; treating it as not optimized", e);
                false
            }
        }
    }
}

impl Default for CodeStateAnalyzer {
    fn default() -> Self {
        CodeStateAnalyzer::new(MarkerSet::default())
    }
}
