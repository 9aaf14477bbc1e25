use std::path::{Path, PathBuf};
use std::sync::Arc;

use sysinfo::Disks;

use crate::error::ConversionError;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// WebP output is assumed to be about a quarter smaller than the input
const OUTPUT_SIZE_RATIO: f64 = 0.75;

/// Source of free-space figures for the volume holding a path
pub trait FreeSpaceProbe: Send + Sync {
    /// Free bytes on the volume of `path`, or `None` when it cannot be determined
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Asks the operating system through `sysinfo`'s disk list
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDisks;

impl FreeSpaceProbe for SystemDisks {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let path = nearest_existing_ancestor(path)?.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();

        // The most specific mount point wins, e.g. /home over /
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Reports the same number of free bytes for every path
#[derive(Debug, Clone, Copy)]
pub struct FixedFreeSpace(pub u64);

impl FreeSpaceProbe for FixedFreeSpace {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        Some(self.0)
    }
}

/// Decides whether a conversion may write to a volume
#[derive(Clone)]
pub struct SpaceChecker {
    min_free_bytes: u64,
    probe: Option<Arc<dyn FreeSpaceProbe>>,
}

impl std::fmt::Debug for SpaceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceChecker")
            .field("min_free_bytes", &self.min_free_bytes)
            .field("enabled", &self.probe.is_some())
            .finish()
    }
}

impl SpaceChecker {
    /// Checker backed by the operating system's disk list
    pub fn new(min_free_mb: u64) -> Self {
        Self::with_probe(min_free_mb, Arc::new(SystemDisks))
    }

    pub fn with_probe(min_free_mb: u64, probe: Arc<dyn FreeSpaceProbe>) -> Self {
        Self {
            min_free_bytes: min_free_mb.saturating_mul(BYTES_PER_MB),
            probe: Some(probe),
        }
    }

    /// Checker that approves every conversion
    pub fn disabled() -> Self {
        Self {
            min_free_bytes: 0,
            probe: None,
        }
    }

    /// Bytes that must be free before converting an input of `input_size` bytes
    pub fn required_bytes(&self, input_size: u64) -> u64 {
        let estimate = (input_size as f64 * OUTPUT_SIZE_RATIO).ceil() as u64;
        estimate.saturating_add(self.min_free_bytes)
    }

    /// Whether the volume holding `path` has at least `required_bytes` free.
    ///
    /// Fails closed: an unknown amount of free space counts as insufficient.
    pub fn has_space(&self, path: &Path, required_bytes: u64) -> bool {
        self.available_for(path, required_bytes).is_ok()
    }

    /// Check room for converting an input of `input_size` bytes into `output_dir`
    pub fn check(&self, output_dir: &Path, input_size: u64) -> Result<(), ConversionError> {
        let required = self.required_bytes(input_size);
        self.available_for(output_dir, required)
            .map(|_| ())
            .map_err(|available| ConversionError::DiskSpace {
                required_mb: required.div_ceil(BYTES_PER_MB),
                available_mb: available.map(|bytes| bytes / BYTES_PER_MB),
            })
    }

    fn available_for(&self, path: &Path, required: u64) -> Result<Option<u64>, Option<u64>> {
        let Some(probe) = &self.probe else {
            return Ok(None);
        };

        match probe.available_bytes(path) {
            Some(available) if available >= required => Ok(Some(available)),
            Some(available) => Err(Some(available)),
            None => {
                log::warn!("Could not determine free disk space for {}", path.display());
                Err(None)
            }
        }
    }
}

impl Default for SpaceChecker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MIN_FREE_SPACE_MB)
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|ancestor| !ancestor.as_os_str().is_empty() && ancestor.exists())
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unknown;

    impl FreeSpaceProbe for Unknown {
        fn available_bytes(&self, _path: &Path) -> Option<u64> {
            None
        }
    }

    #[test]
    fn test_required_bytes_adds_floor_to_estimate() {
        let checker = SpaceChecker::with_probe(500, Arc::new(FixedFreeSpace(0)));
        assert_eq!(checker.required_bytes(0), 500 * BYTES_PER_MB);
        assert_eq!(checker.required_bytes(4 * BYTES_PER_MB), 503 * BYTES_PER_MB);
    }

    #[test]
    fn test_has_space_compares_against_probe() {
        let checker = SpaceChecker::with_probe(1, Arc::new(FixedFreeSpace(2 * BYTES_PER_MB)));
        assert!(checker.has_space(Path::new("."), 2 * BYTES_PER_MB));
        assert!(!checker.has_space(Path::new("."), 2 * BYTES_PER_MB + 1));
    }

    #[test]
    fn test_unknown_free_space_fails_closed() {
        let checker = SpaceChecker::with_probe(0, Arc::new(Unknown));
        assert!(!checker.has_space(Path::new("."), 1));
        match checker.check(Path::new("."), 10) {
            Err(ConversionError::DiskSpace { available_mb: None, .. }) => {}
            other => panic!("expected disk space error, got {other:?}"),
        }
    }

    #[test]
    fn test_check_reports_shortfall() {
        let checker = SpaceChecker::with_probe(500, Arc::new(FixedFreeSpace(100 * BYTES_PER_MB)));
        match checker.check(Path::new("."), BYTES_PER_MB) {
            Err(ConversionError::DiskSpace {
                required_mb,
                available_mb,
            }) => {
                assert_eq!(required_mb, 501);
                assert_eq!(available_mb, Some(100));
            }
            other => panic!("expected disk space error, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_checker_always_passes() {
        let checker = SpaceChecker::disabled();
        assert!(checker.has_space(Path::new("/nonexistent/volume"), u64::MAX));
        assert!(checker.check(Path::new("/nonexistent"), u64::MAX).is_ok());
    }

    #[test]
    fn test_nearest_existing_ancestor_walks_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("a/b/c");
        assert_eq!(nearest_existing_ancestor(&missing).unwrap(), temp_dir.path());
    }
}
