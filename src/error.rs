use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single file failed to convert.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("input file does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error(
        "insufficient disk space: need {required_mb} MB free, {}",
        available_text(.available_mb)
    )]
    DiskSpace {
        required_mb: u64,
        available_mb: Option<u64>,
    },

    #[error("corrupted or invalid image file: {0}")]
    CorruptImage(String),

    #[error("failed to encode WebP: {0}")]
    Encode(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn available_text(available_mb: &Option<u64>) -> String {
    match available_mb {
        Some(mb) => format!("{mb} MB available"),
        None => "free space could not be determined".to_string(),
    }
}

impl ConversionError {
    /// Short, stable name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::InputNotFound(_) => "input_not_found",
            ConversionError::DiskSpace { .. } => "disk_space",
            ConversionError::CorruptImage(_) => "corrupt_image",
            ConversionError::Encode(_) => "encode",
            ConversionError::Write { .. } => "write",
        }
    }
}

/// Non-fatal problems attached to an otherwise successful conversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionWarning {
    #[error("failed to preserve timestamps on {}: {message}", .path.display())]
    TimestampCopy { path: PathBuf, message: String },

    #[error("failed to delete original {}: {message}", .path.display())]
    Deletion { path: PathBuf, message: String },
}

/// Errors that abort an invocation before any conversion starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("cannot keep and delete originals at the same time")]
    ConflictingOriginals,

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("quality must be between 0 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("profile '{0}' is a preset and cannot be modified")]
    ReadOnlyProfile(String),

    #[error("input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("an output file ({}) can only be used with a single input file", .0.display())]
    OutputFileForMultipleInputs(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_space_message_mentions_unknown_free_space() {
        let err = ConversionError::DiskSpace {
            required_mb: 512,
            available_mb: None,
        };
        let text = err.to_string();
        assert!(text.contains("512 MB"));
        assert!(text.contains("could not be determined"));
        assert_eq!(err.kind(), "disk_space");
    }

    #[test]
    fn test_write_error_names_path() {
        let err = ConversionError::Write {
            path: PathBuf::from("out/a.webp"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("out/a.webp"));
        assert_eq!(err.kind(), "write");
    }
}
