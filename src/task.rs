use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;

use crate::config::ConversionSettings;
use crate::converter::{Codec, CodecError};
use crate::error::{ConversionError, ConversionWarning};
use crate::paths::{PathResolver, unique_path};
use crate::space::SpaceChecker;

/// How many times a taken output name is re-resolved before giving up
const MAX_PERSIST_ATTEMPTS: usize = 16;

/// One file queued for conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    /// Directory the input was discovered under
    pub root: PathBuf,
    /// Explicit output file chosen by the caller
    pub output: Option<PathBuf>,
}

impl ConversionRequest {
    pub fn new(input: PathBuf, root: PathBuf) -> Self {
        Self {
            input,
            root,
            output: None,
        }
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }
}

#[derive(Debug)]
pub enum OutcomeStatus {
    Converted,
    Failed(ConversionError),
    /// Never dispatched because the batch was stopped
    Skipped,
}

/// Result of processing one [`ConversionRequest`]
#[derive(Debug)]
pub struct ConversionOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: OutcomeStatus,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionOutcome {
    pub fn skipped(input: PathBuf) -> Self {
        Self {
            input,
            output: None,
            status: OutcomeStatus::Skipped,
            bytes_before: 0,
            bytes_after: 0,
            warnings: Vec::new(),
        }
    }

    pub fn failed(input: PathBuf, error: ConversionError) -> Self {
        let bytes_before = fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
        Self {
            input,
            output: None,
            status: OutcomeStatus::Failed(error),
            bytes_before,
            bytes_after: 0,
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Converted)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped)
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match &self.status {
            OutcomeStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Everything a worker needs to convert files with one batch's settings
#[derive(Clone)]
pub struct ConversionTask {
    codec: Arc<dyn Codec>,
    resolver: PathResolver,
    space: SpaceChecker,
    settings: Arc<ConversionSettings>,
}

impl ConversionTask {
    pub fn new(
        codec: Arc<dyn Codec>,
        resolver: PathResolver,
        space: SpaceChecker,
        settings: Arc<ConversionSettings>,
    ) -> Self {
        Self {
            codec,
            resolver,
            space,
            settings,
        }
    }

    /// Convert one file and describe what happened.
    ///
    /// Never fails: every problem is recorded in the returned outcome.
    pub fn convert(&self, request: &ConversionRequest) -> ConversionOutcome {
        let mut warnings = Vec::new();

        match self.try_convert(request, &mut warnings) {
            Ok((output, bytes_before, bytes_after)) => {
                log::debug!("Converted {} -> {}", request.input.display(), output.display());
                ConversionOutcome {
                    input: request.input.clone(),
                    output: Some(output),
                    status: OutcomeStatus::Converted,
                    bytes_before,
                    bytes_after,
                    warnings,
                }
            }
            Err(err) => {
                log::debug!("Conversion of {} failed: {}", request.input.display(), err);
                ConversionOutcome::failed(request.input.clone(), err)
            }
        }
    }

    fn try_convert(
        &self,
        request: &ConversionRequest,
        warnings: &mut Vec<ConversionWarning>,
    ) -> Result<(PathBuf, u64, u64), ConversionError> {
        let input = &request.input;
        let metadata = match fs::metadata(input) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(ConversionError::InputNotFound(input.clone())),
        };

        let target = match &request.output {
            Some(explicit) => self.resolver.decorate(explicit),
            None => self.resolver.planned_path(input, &request.root),
        };
        let target_dir = target.parent().map(Path::to_path_buf).unwrap_or_default();

        self.space.check(&target_dir, metadata.len())?;

        let data = fs::read(input).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConversionError::InputNotFound(input.clone()),
            _ => ConversionError::CorruptImage(format!("failed to read input: {e}")),
        })?;

        self.codec
            .verify(&data)
            .map_err(|e| ConversionError::CorruptImage(e.to_string()))?;

        if !target_dir.as_os_str().is_empty() {
            fs::create_dir_all(&target_dir).map_err(|source| ConversionError::Write {
                path: target_dir.clone(),
                source,
            })?;
        }

        let webp = self
            .codec
            .encode(&data, self.settings.quality, self.settings.lossless)
            .map_err(|e| match e {
                CodecError::Decode(msg) => ConversionError::CorruptImage(msg),
                CodecError::Encode(msg) => ConversionError::Encode(msg),
            })?;

        let output = write_new_file(&target, &webp, &metadata)?;

        if self.settings.preserve_timestamps {
            warnings.extend(preserve_timestamps(&metadata, &output));
        }

        Ok((output, metadata.len(), webp.len() as u64))
    }
}

/// Write `data` under a collision-free variant of `target`, never replacing an
/// existing file and never leaving a partial file behind.
fn write_new_file(
    target: &Path,
    data: &[u8],
    input_metadata: &Metadata,
) -> Result<PathBuf, ConversionError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConversionError::Write { path, source }
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".towebp-")
        .suffix(".part")
        .permissions(input_metadata.permissions())
        .tempfile_in(dir)
        .map_err(write_error(dir))?;
    temp.write_all(data).map_err(write_error(temp.path()))?;

    let mut candidate = unique_path(target);
    for _ in 0..MAX_PERSIST_ATTEMPTS {
        match temp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                // Another worker claimed the name after we picked it
                temp = err.file;
                candidate = unique_path(target);
            }
            Err(err) => return Err(write_error(&candidate)(err.error)),
        }
    }

    Err(ConversionError::Write {
        path: candidate,
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free output file name"),
    })
}

/// Copy access and modification times onto `output`; failure is only a warning
fn preserve_timestamps(input_metadata: &Metadata, output: &Path) -> Option<ConversionWarning> {
    let atime = FileTime::from_last_access_time(input_metadata);
    let mtime = FileTime::from_last_modification_time(input_metadata);

    match filetime::set_file_times(output, atime, mtime) {
        Ok(()) => None,
        Err(e) => {
            log::warn!("Failed to preserve timestamps for {}: {}", output.display(), e);
            Some(ConversionWarning::TimestampCopy {
                path: output.to_path_buf(),
                message: e.to_string(),
            })
        }
    }
}
