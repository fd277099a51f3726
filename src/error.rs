use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse workshop configuration JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to process YAML descriptor: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid workshop configuration: {0}")]
    Config(String),

    /// A snapshot required by a restore is absent. Nothing was written.
    #[error("{operation} aborted, missing snapshot file(s): {}", display_paths(.missing))]
    MissingBackup { operation: String, missing: Vec<PathBuf> },

    #[error("Descriptor '{}' could not be parsed: {reason}", .path.display())]
    UnparseableDescriptor { path: PathBuf, reason: String },

    #[error("Artifact '{}' could not be read: {reason}", .path.display())]
    UnreadableArtifact { path: PathBuf, reason: String },

    #[error("Confirmation rejected: type the exact reset token to overwrite the original snapshots")]
    ConfirmationRejected,

    #[error("Invalid snapshot name '{0}': must be non-empty, contain no path separators and not be a reserved tag")]
    InvalidSnapshotName(String),

    #[error("Unknown stage boundary '{0}', expected 'stage2-start' or 'stage3-start'")]
    UnknownBoundary(String),

    #[error("Unknown timeframe '{0}', expected 30_days, 90_days or 180_days")]
    UnknownTimeframe(String),

    #[error("Invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_backup_lists_every_file() {
        let err = Error::MissingBackup {
            operation: "restore stage2-start".to_string(),
            missing: vec![PathBuf::from("ref/deployment_2.yaml"), PathBuf::from("ref/schedule_original.yaml")],
        };

        assert_eq!(
            err.to_string(),
            "restore stage2-start aborted, missing snapshot file(s): ref/deployment_2.yaml, ref/schedule_original.yaml"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
