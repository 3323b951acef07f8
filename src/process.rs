//! Batch job runner.
//!
//! A job has two phases. [`prepare`] does every check that can fail the
//! whole run, in a fixed order, before any file is touched:
//!
//! | Step | Failure | Exit |
//! |---|---|---|
//! | parse background | [`ConfigError::InvalidBackground`] | 2 |
//! | validate config | [`ConfigError::Validation`] | 5 |
//! | EXIF tag codec (JPEG + keep-orientation-only) | [`ProcessError::Capability`] | 3 |
//! | HEIF encoder (HEIF output) | [`ProcessError::Capability`] | 4 |
//! | output differs from input | [`ProcessError::Scan`] | 5 |
//! | discover inputs | [`ProcessError::Scan`] / [`ProcessError::NoInputs`] | 5 / 1 |
//!
//! [`run`] then creates the output directory, builds a worker pool of the
//! configured size, and pushes every input through
//! decode → downscale → encode → write on its own worker.
//!
//! ## Per-file isolation
//!
//! Each file ends in exactly one [`FileStatus`]. Codec errors come back as
//! values; a panic inside a codec is caught at the worker boundary and
//! recorded as a failure for that file only. Outcomes arrive in completion
//! order and are sorted by source path before aggregation.
//!
//! ## Progress
//!
//! When a sender is passed in, the runner emits [`ProcessEvent::Started`]
//! once and [`ProcessEvent::FileFinished`] per file. Rendering is the
//! caller's job.

use crate::config::{BackgroundColor, ConfigError, JobConfig, effective_workers};
use crate::imaging::heif;
use crate::imaging::transform;
use crate::imaging::{
    Capabilities, Decoder, EncodeSpec, Encoder, HeifCodec, ImagingError, RawDecoder,
    RawloaderDecoder,
};
use crate::naming::{self, NamingError};
use crate::scan::{self, InputAsset, ScanError};
use crate::types::{ExitStatus, OutputFormat};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capability(ImagingError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("No matching input files found in {}", .0.display())]
    NoInputs(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProcessError {
    /// Exit status for a job that stopped before or outside the workers.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Config(ConfigError::InvalidBackground(_)) => ExitStatus::InvalidBackground,
            Self::Capability(ImagingError::MetadataCapabilityUnavailable(_)) => {
                ExitStatus::MetadataCodecMissing
            }
            Self::Capability(_) => ExitStatus::HeifCodecMissing,
            Self::NoInputs(_) => ExitStatus::NoInputs,
            Self::Config(_) | Self::Scan(_) | Self::Io(_) | Self::Pool(_) | Self::Json(_) => {
                ExitStatus::InvalidConfig
            }
        }
    }
}

/// Terminal state of one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// Destination already existed and overwrite was off.
    Skipped,
    Succeeded { bytes_before: u64, bytes_after: u64 },
    Failed { error: String },
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }
}

/// Progress events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { total: usize },
    FileFinished(FileOutcome),
}

/// Everything [`run`] needs, fixed before the first worker starts.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub background: BackgroundColor,
    pub spec: EncodeSpec,
    pub workers: usize,
    pub overwrite: bool,
    pub flat: bool,
    pub assets: Vec<InputAsset>,
}

/// Aggregated result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub output_dir: PathBuf,
    pub out_format: OutputFormat,
    /// Sum of input sizes over succeeded files.
    pub total_before: u64,
    /// Sum of output sizes over succeeded files.
    pub total_after: u64,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileOutcome>,
}

impl JobSummary {
    pub fn from_outcomes(
        output_dir: PathBuf,
        out_format: OutputFormat,
        mut files: Vec<FileOutcome>,
    ) -> Self {
        files.sort_by(|a, b| a.source.cmp(&b.source));
        let mut summary = Self {
            output_dir,
            out_format,
            total_before: 0,
            total_after: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            files: Vec::new(),
        };
        for outcome in &files {
            match &outcome.status {
                FileStatus::Skipped => summary.skipped += 1,
                FileStatus::Succeeded {
                    bytes_before,
                    bytes_after,
                } => {
                    summary.succeeded += 1;
                    summary.total_before += bytes_before;
                    summary.total_after += bytes_after;
                }
                FileStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary.files = files;
        summary
    }

    /// Failed files with their cause, in source path order.
    pub fn errors(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files.iter().filter_map(|o| match &o.status {
            FileStatus::Failed { error } => Some((o.source.as_path(), error.as_str())),
            _ => None,
        })
    }

    /// Size reduction in percent, `None` when nothing was measured.
    pub fn reduction_percent(&self) -> Option<f64> {
        (self.total_before > 0).then(|| {
            (1.0 - self.total_after as f64 / self.total_before as f64) * 100.0
        })
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.failed > 0 {
            ExitStatus::FilesFailed
        } else {
            ExitStatus::Success
        }
    }
}

/// Check everything that can fail the whole job, then discover inputs.
///
/// Nothing is written to disk here; in particular the output directory is
/// left alone so a fatal error never leaves an empty one behind.
pub fn prepare(
    input_dir: &Path,
    output_dir: &Path,
    config: &JobConfig,
    capabilities: &Capabilities,
) -> Result<PreparedJob, ProcessError> {
    let background = config.background()?;
    config.validate()?;

    if config.needs_exif_tags() {
        capabilities
            .require_exif_tags()
            .map_err(ProcessError::Capability)?;
    }
    if config.out_format == OutputFormat::Heif {
        capabilities
            .require_heif_encode()
            .map_err(ProcessError::Capability)?;
    }

    scan::ensure_distinct_output(input_dir, output_dir)?;
    let assets = scan::discover(input_dir, Some(output_dir))?;
    if assets.is_empty() {
        return Err(ProcessError::NoInputs(input_dir.to_path_buf()));
    }

    let workers = effective_workers(config);
    tracing::info!(
        inputs = assets.len(),
        workers,
        format = %config.out_format,
        "job prepared"
    );
    Ok(PreparedJob {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        background,
        spec: config.encode_spec(),
        workers,
        overwrite: config.overwrite,
        flat: config.flat,
        assets,
    })
}

/// Run a prepared job with this build's codecs.
pub fn run(
    job: &PreparedJob,
    capabilities: &Capabilities,
    events: Option<Sender<ProcessEvent>>,
) -> Result<JobSummary, ProcessError> {
    let heif = heif::default_codec();
    run_with_codecs(job, capabilities, &RawloaderDecoder, heif.as_ref(), events)
}

/// Prepare and run a job against the process-wide capabilities.
pub fn process(
    input_dir: &Path,
    output_dir: &Path,
    config: &JobConfig,
    events: Option<Sender<ProcessEvent>>,
) -> Result<JobSummary, ProcessError> {
    let capabilities = Capabilities::detect();
    let job = prepare(input_dir, output_dir, config, capabilities)?;
    run(&job, capabilities, events)
}

/// Run a prepared job with explicit codecs.
pub fn run_with_codecs(
    job: &PreparedJob,
    capabilities: &Capabilities,
    raw: &dyn RawDecoder,
    heif: &dyn HeifCodec,
    events: Option<Sender<ProcessEvent>>,
) -> Result<JobSummary, ProcessError> {
    fs::create_dir_all(&job.output_dir)?;

    let destinations =
        naming::plan_destinations(&job.assets, &job.output_dir, job.spec.format, job.flat);
    let pipeline = Pipeline {
        decoder: Decoder::new(capabilities, raw, heif, job.background),
        encoder: Encoder::new(capabilities, heif),
        spec: job.spec,
        overwrite: job.overwrite,
    };

    if let Some(tx) = &events {
        tx.send(ProcessEvent::Started {
            total: job.assets.len(),
        })
        .ok();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(job.workers)
        .build()?;
    let outcomes: Vec<FileOutcome> = pool.install(|| {
        job.assets
            .par_iter()
            .zip(destinations.into_par_iter())
            .map_with(events, |events, (asset, destination)| {
                let outcome = pipeline.run(asset, destination);
                if let Some(tx) = events {
                    tx.send(ProcessEvent::FileFinished(outcome.clone())).ok();
                }
                outcome
            })
            .collect()
    });

    let summary = JobSummary::from_outcomes(job.output_dir.clone(), job.spec.format, outcomes);
    tracing::info!(
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        "job finished"
    );
    Ok(summary)
}

/// Write the per-file report as pretty JSON.
pub fn write_report(path: &Path, summary: &JobSummary) -> Result<(), ProcessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

// =============================================================================
// Per-file pipeline
// =============================================================================

struct Pipeline<'a> {
    decoder: Decoder<'a>,
    encoder: Encoder<'a>,
    spec: EncodeSpec,
    overwrite: bool,
}

impl Pipeline<'_> {
    fn run(&self, asset: &InputAsset, destination: Result<PathBuf, NamingError>) -> FileOutcome {
        let destination = match destination {
            Ok(d) => d,
            Err(err) => {
                let NamingError::Collision { destination, .. } = &err;
                return failed(asset, destination.clone(), err.to_string());
            }
        };

        if destination.exists() && !self.overwrite {
            tracing::debug!(path = %destination.display(), "exists, skipping");
            return FileOutcome {
                source: asset.path.clone(),
                destination,
                status: FileStatus::Skipped,
            };
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transcode(&asset.path, &destination)
        }));
        match result {
            Ok(Ok((bytes_before, bytes_after))) => FileOutcome {
                source: asset.path.clone(),
                destination,
                status: FileStatus::Succeeded {
                    bytes_before,
                    bytes_after,
                },
            },
            Ok(Err(err)) => {
                tracing::warn!(path = %asset.path.display(), error = %err, "failed");
                failed(asset, destination, err.to_string())
            }
            Err(payload) => {
                let message = format!("codec panicked: {}", panic_message(payload.as_ref()));
                tracing::warn!(path = %asset.path.display(), error = %message, "failed");
                failed(asset, destination, message)
            }
        }
    }

    fn transcode(&self, source: &Path, destination: &Path) -> Result<(u64, u64), ImagingError> {
        let bytes_before = fs::metadata(source)?.len();
        let raster = self.decoder.decode(source)?;
        let raster = transform::downscale(raster, self.spec.max_edge);
        let encoded = self.encoder.encode(&raster, &self.spec)?;
        write_atomically(destination, &encoded)?;
        tracing::debug!(
            path = %destination.display(),
            bytes_before,
            bytes_after = encoded.len(),
            "written"
        );
        Ok((bytes_before, encoded.len() as u64))
    }
}

fn failed(asset: &InputAsset, destination: PathBuf, error: String) -> FileOutcome {
    FileOutcome {
        source: asset.path.clone(),
        destination,
        status: FileStatus::Failed { error },
    }
}

/// Write through a hidden sibling and rename into place.
fn write_atomically(destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = naming::temp_path(destination);
    let written = fs::write(&temp, bytes).and_then(|()| fs::rename(&temp, destination));
    if written.is_err() {
        let _ = fs::remove_file(&temp);
    }
    written
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
