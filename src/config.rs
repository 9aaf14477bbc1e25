use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Input extensions picked up during discovery (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff"];

/// Extension of every file we write
pub const OUTPUT_EXTENSION: &str = "webp";

/// Free space that must remain on the output volume after a conversion
pub const DEFAULT_MIN_FREE_SPACE_MB: u64 = 500;

/// Per-file conversion settings, captured once per batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub quality: u8,
    pub lossless: bool,
    pub preserve_timestamps: bool,
    pub preserve_originals: bool,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            quality: 80,
            lossless: false,
            preserve_timestamps: true,
            preserve_originals: true,
            prefix: String::new(),
            suffix: String::new(),
        }
    }
}

impl ConversionSettings {
    /// Builder pattern for setting quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Builder pattern for enabling lossless encoding
    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    /// Builder pattern for copying input timestamps onto outputs
    pub fn with_preserve_timestamps(mut self, preserve_timestamps: bool) -> Self {
        self.preserve_timestamps = preserve_timestamps;
        self
    }

    /// Builder pattern for keeping or deleting originals after success
    pub fn with_preserve_originals(mut self, preserve_originals: bool) -> Self {
        self.preserve_originals = preserve_originals;
        self
    }

    /// Builder pattern for the output filename prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Builder pattern for the output filename suffix
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Check the settings once, at the boundary where they are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality > 100 {
            return Err(ConfigError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

/// Options that shape a batch run but not the per-file encoding
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub recursive: bool,
    /// Output directory, or an output file when converting a single file
    pub output: Option<PathBuf>,
    pub threads: Option<usize>,
    pub min_free_space_mb: u64,
    pub check_space: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            output: None,
            threads: None,
            min_free_space_mb: DEFAULT_MIN_FREE_SPACE_MB,
            check_space: true,
        }
    }
}

impl BatchOptions {
    /// Builder pattern for recursive directory walking
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Builder pattern for setting the output location
    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }

    /// Builder pattern for setting thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Builder pattern for the free-space floor in MB
    pub fn with_min_free_space_mb(mut self, min_free_space_mb: u64) -> Self {
        self.min_free_space_mb = min_free_space_mb;
        self
    }

    /// Builder pattern for turning the disk space check on or off
    pub fn with_space_check(mut self, check_space: bool) -> Self {
        self.check_space = check_space;
        self
    }

    /// Get the effective worker count: never zero, CPU count when unset
    pub fn get_thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// The output path as an explicit `.webp` file, if it names one
    pub fn output_file(&self) -> Option<&Path> {
        self.output
            .as_deref()
            .filter(|path| has_extension(path, OUTPUT_EXTENSION) && !path.is_dir())
    }
}

/// Whether the path carries one of the supported input extensions
pub fn is_supported_extension(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| has_extension(path, ext))
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_ignore_case() {
        assert!(is_supported_extension(Path::new("a.PNG")));
        assert!(is_supported_extension(Path::new("dir/b.Jpeg")));
        assert!(is_supported_extension(Path::new("c.tiff")));
        assert!(!is_supported_extension(Path::new("d.webp")));
        assert!(!is_supported_extension(Path::new("e.txt")));
        assert!(!is_supported_extension(Path::new("png")));
    }

    #[test]
    fn test_validate_rejects_quality_above_100() {
        assert!(ConversionSettings::default().validate().is_ok());
        let settings = ConversionSettings::default().with_quality(101);
        assert_eq!(settings.validate(), Err(ConfigError::InvalidQuality(101)));
    }

    #[test]
    fn test_thread_count_is_never_zero() {
        assert_eq!(BatchOptions::default().with_threads(0).get_thread_count(), 1);
        assert_eq!(BatchOptions::default().with_threads(3).get_thread_count(), 3);
        assert!(BatchOptions::default().get_thread_count() >= 1);
    }

    #[test]
    fn test_output_file_requires_webp_extension() {
        let options = BatchOptions::default().with_output(PathBuf::from("out/photo.webp"));
        assert_eq!(options.output_file(), Some(Path::new("out/photo.webp")));

        let options = BatchOptions::default().with_output(PathBuf::from("out/converted"));
        assert_eq!(options.output_file(), None);
    }
}
