use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::config::{ConversionSettings, OUTPUT_EXTENSION};

/// Upper bound on `name(N)` probing before giving up and reusing the last candidate
const MAX_COLLISION_INDEX: u32 = 100_000;

/// Computes where each converted file goes
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    output_dir: Option<PathBuf>,
    prefix: String,
    suffix: String,
}

impl PathResolver {
    pub fn new(
        output_dir: Option<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            output_dir,
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_settings(output_dir: Option<PathBuf>, settings: &ConversionSettings) -> Self {
        Self::new(output_dir, settings.prefix.clone(), settings.suffix.clone())
    }

    /// Output path for `input` before collision avoidance.
    ///
    /// With no output directory the file lands next to its input. Otherwise the
    /// input's location relative to `root` is re-created under the output directory.
    pub fn planned_path(&self, input: &Path, root: &Path) -> PathBuf {
        let dir = match &self.output_dir {
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
            Some(output_dir) => {
                let relative_dir = input
                    .strip_prefix(root)
                    .ok()
                    .and_then(Path::parent)
                    .unwrap_or_else(|| Path::new(""));
                output_dir.join(relative_dir)
            }
        };

        let stem = input.file_stem().unwrap_or_else(|| OsStr::new("image"));
        dir.join(self.decorated_name(stem))
    }

    /// Apply prefix/suffix to an explicitly chosen output file
    pub fn decorate(&self, target: &Path) -> PathBuf {
        let stem = target.file_stem().unwrap_or_else(|| OsStr::new("image"));
        target.with_file_name(self.decorated_name(stem))
    }

    /// Collision-free output path for `input`
    pub fn resolve(&self, input: &Path, root: &Path) -> PathBuf {
        unique_path(&self.planned_path(input, root))
    }

    fn decorated_name(&self, stem: &OsStr) -> OsString {
        let mut name = OsString::from(&self.prefix);
        name.push(stem);
        name.push(&self.suffix);
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        name
    }
}

/// First of `path`, `stem(1).ext`, `stem(2).ext`, ... that does not exist yet.
///
/// Not atomic: the caller must still create the file without clobbering.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let mut candidate = numbered(path, 1);
    for counter in 2..=MAX_COLLISION_INDEX {
        if !candidate.exists() {
            break;
        }
        candidate = numbered(path, counter);
    }
    candidate
}

fn numbered(path: &Path, counter: u32) -> PathBuf {
    let mut name = path.file_stem().map(OsStr::to_os_string).unwrap_or_default();
    name.push(format!("({counter})"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_beside_input() {
        let resolver = PathResolver::default();
        let planned = resolver.planned_path(Path::new("/photos/trip/a.png"), Path::new("/photos"));
        assert_eq!(planned, PathBuf::from("/photos/trip/a.webp"));
    }

    #[test]
    fn test_output_dir_keeps_relative_structure() {
        let resolver = PathResolver::new(Some(PathBuf::from("/out")), "", "");
        let planned =
            resolver.planned_path(Path::new("/photos/trip/day1/a.jpg"), Path::new("/photos"));
        assert_eq!(planned, PathBuf::from("/out/trip/day1/a.webp"));
    }

    #[test]
    fn test_input_outside_root_lands_at_output_top() {
        let resolver = PathResolver::new(Some(PathBuf::from("/out")), "", "");
        let planned = resolver.planned_path(Path::new("/elsewhere/a.jpg"), Path::new("/photos"));
        assert_eq!(planned, PathBuf::from("/out/a.webp"));
    }

    #[test]
    fn test_prefix_and_suffix_wrap_basename_only() {
        let resolver = PathResolver::new(None, "web_", "_small");
        let planned =
            resolver.planned_path(Path::new("/pics.v2/shot.final.png"), Path::new("/pics.v2"));
        assert_eq!(planned, PathBuf::from("/pics.v2/web_shot.final_small.webp"));
    }

    #[test]
    fn test_decorate_explicit_output() {
        let resolver = PathResolver::new(None, "x-", "");
        assert_eq!(
            resolver.decorate(Path::new("out/cover.webp")),
            PathBuf::from("out/x-cover.webp")
        );
    }

    #[test]
    fn test_unique_path_counts_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("photo.webp");
        assert_eq!(unique_path(&target), target);

        std::fs::write(&target, b"first").unwrap();
        let second = unique_path(&target);
        assert_eq!(second, temp_dir.path().join("photo(1).webp"));

        std::fs::write(&second, b"second").unwrap();
        assert_eq!(unique_path(&target), temp_dir.path().join("photo(2).webp"));
    }

    #[test]
    fn test_resolve_skips_existing_outputs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("a.png");
        std::fs::write(temp_dir.path().join("a.webp"), b"taken").unwrap();

        let resolver = PathResolver::default();
        assert_eq!(resolver.resolve(&input, temp_dir.path()), temp_dir.path().join("a(1).webp"));
    }
}
