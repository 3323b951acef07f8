//! Timestamp correction for photos shot with the wrong camera time zone.
//!
//! Every matching file under the input directory is copied to the same
//! relative path under the output directory, keeping its modification
//! time, and `exiftool` then shifts the copy's datetime tags by
//! `to - from` hours:
//!
//! ```text
//! exiftool -m -overwrite_original -api QuickTimeUTC=1 \
//!     -AllDates+=16:0:0 -XMP:CreateDate+=16:0:0 -XMP:ModifyDate+=16:0:0 \
//!     -FileModifyDate+=16:0:0 -FileCreateDate+=16:0:0 <copy>
//! ```
//!
//! Originals are never modified. A failed file leaves its copy behind
//! unshifted; nothing is rolled back.
//!
//! The external tool is reached through [`CommandRunner`] so tests can
//! record invocations instead of spawning processes.

use crate::scan::{self, ScanError};
use crate::types::ExitStatus;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Extensions shifted by default, lower-case, without the dot.
pub const DEFAULT_EXTENSIONS: &[&str] = &["arw", "hif", "heif", "heic"];

pub const EXIFTOOL: &str = "exiftool";

#[derive(Error, Debug)]
pub enum TimeShiftError {
    #[error("Invalid UTC offset {0:?}: expected +8, -8, 8 or UTC+8")]
    InvalidOffset(String),
    #[error("exiftool is not runnable (`exiftool -ver` failed): {0}")]
    ToolMissing(String),
    #[error("Input is not a directory or does not exist: {}", .0.display())]
    InputNotADirectory(PathBuf),
    #[error("No matching files in {} (extensions: {})", input.display(), extensions.join(" "))]
    NoFiles {
        input: PathBuf,
        extensions: Vec<String>,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TimeShiftError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::ToolMissing(_) => ExitStatus::ToolMissing,
            Self::NoFiles { .. } => ExitStatus::NoInputs,
            Self::InvalidOffset(_) | Self::InputNotADirectory(_) | Self::Scan(_) | Self::Io(_) => {
                ExitStatus::InvalidConfig
            }
        }
    }
}

// =============================================================================
// External command seam
// =============================================================================

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Parse a UTC offset in whole hours: `+8`, `-8`, `8`, `UTC+8`, `UTC-8`.
pub fn parse_utc_offset(s: &str) -> Result<i32, TimeShiftError> {
    let invalid = || TimeShiftError::InvalidOffset(s.to_string());
    let trimmed = s.trim();
    let body = trimmed
        .strip_prefix("UTC")
        .map(str::trim)
        .unwrap_or(trimmed);
    let (negative, digits) = match body.as_bytes().first() {
        Some(b'+') => (false, &body[1..]),
        Some(b'-') => (true, &body[1..]),
        _ => (false, body),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits.parse().map_err(|_| invalid())?;
    Ok(if negative { -hours } else { hours })
}

/// Lower-case an extension and drop a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Default extensions plus `extra`, normalised and deduplicated.
pub fn extension_set(extra: &[String]) -> BTreeSet<String> {
    DEFAULT_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .chain(extra.iter().map(|e| normalize_extension(e)))
        .filter(|e| !e.is_empty())
        .collect()
}

/// `+=H:0:0` or `-=H:0:0`.
pub fn shift_operator(delta_hours: i32) -> String {
    let sign = if delta_hours >= 0 { '+' } else { '-' };
    format!("{sign}={}:0:0", delta_hours.unsigned_abs())
}

/// Arguments passed to `exiftool` for one file.
pub fn exiftool_args(delta_hours: i32, file: &Path) -> Vec<String> {
    let shift = shift_operator(delta_hours);
    let mut args: Vec<String> = ["-m", "-overwrite_original", "-api", "QuickTimeUTC=1"]
        .into_iter()
        .map(String::from)
        .collect();
    for tag in [
        "AllDates",
        "XMP:CreateDate",
        "XMP:ModifyDate",
        "FileModifyDate",
        "FileCreateDate",
    ] {
        args.push(format!("-{tag}{shift}"));
    }
    args.push(file.to_string_lossy().into_owned());
    args
}

/// The command line as it would be typed.
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Planning and execution
// =============================================================================

/// Options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub from_utc: i32,
    pub to_utc: i32,
    /// Extra extensions, dot optional.
    pub extra_extensions: Vec<String>,
    pub dry_run: bool,
}

impl ShiftOptions {
    pub fn delta_hours(&self) -> i32 {
        self.to_utc - self.from_utc
    }
}

/// A checked run, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftPlan {
    pub options: ShiftOptions,
    pub extensions: BTreeSet<String>,
    /// Matching files, sorted.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftStatus {
    Shifted,
    /// Dry run: the command that would have run.
    DryRun { command: String },
    /// Copy or tool failure with whatever the tool printed.
    Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftOutcome {
    pub source: PathBuf,
    pub copy: PathBuf,
    pub status: ShiftStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSummary {
    pub output_dir: PathBuf,
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<ShiftOutcome>,
}

impl ShiftSummary {
    pub fn exit_status(&self) -> ExitStatus {
        if self.failed > 0 {
            ExitStatus::FilesFailed
        } else {
            ExitStatus::Success
        }
    }
}

/// Fail with `ToolMissing` unless `exiftool -ver` runs cleanly.
pub fn require_exiftool(runner: &dyn CommandRunner) -> Result<String, TimeShiftError> {
    match runner.run(EXIFTOOL, &["-ver".to_string()]) {
        Ok(out) if out.success => Ok(out.stdout.trim().to_string()),
        Ok(out) => Err(TimeShiftError::ToolMissing(out.stderr.trim().to_string())),
        Err(e) => Err(TimeShiftError::ToolMissing(e.to_string())),
    }
}

/// Check the tool and input, then list matching files.
pub fn plan(
    options: ShiftOptions,
    runner: &dyn CommandRunner,
) -> Result<ShiftPlan, TimeShiftError> {
    let version = require_exiftool(runner)?;
    tracing::debug!(%version, "exiftool found");

    if !options.input_dir.is_dir() {
        return Err(TimeShiftError::InputNotADirectory(options.input_dir));
    }
    scan::ensure_distinct_output(&options.input_dir, &options.output_dir)?;

    let extensions = extension_set(&options.extra_extensions);
    let files = scan::find_files(&options.input_dir, Some(&options.output_dir), |p| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e.to_ascii_lowercase()))
    })?;
    if files.is_empty() {
        return Err(TimeShiftError::NoFiles {
            input: options.input_dir,
            extensions: extensions.iter().map(|e| format!(".{e}")).collect(),
        });
    }

    Ok(ShiftPlan {
        options,
        extensions,
        files,
    })
}

/// Copy and shift every planned file in order, reporting each as it ends.
pub fn execute(
    plan: &ShiftPlan,
    runner: &dyn CommandRunner,
    mut on_file: impl FnMut(&ShiftOutcome),
) -> ShiftSummary {
    let options = &plan.options;
    let delta = options.delta_hours();
    let mut summary = ShiftSummary {
        output_dir: options.output_dir.clone(),
        succeeded: 0,
        failed: 0,
        files: Vec::with_capacity(plan.files.len()),
    };

    for source in &plan.files {
        let relative = source.strip_prefix(&options.input_dir).unwrap_or(source);
        let copy = options.output_dir.join(relative);
        let status = shift_one(source, &copy, delta, options.dry_run, runner);
        match status {
            ShiftStatus::Failed { .. } => summary.failed += 1,
            _ => summary.succeeded += 1,
        }
        let outcome = ShiftOutcome {
            source: source.clone(),
            copy,
            status,
        };
        on_file(&outcome);
        summary.files.push(outcome);
    }
    summary
}

fn shift_one(
    source: &Path,
    copy: &Path,
    delta: i32,
    dry_run: bool,
    runner: &dyn CommandRunner,
) -> ShiftStatus {
    if let Err(e) = copy_preserving_mtime(source, copy) {
        return ShiftStatus::Failed {
            detail: format!("copy failed: {e}"),
        };
    }

    let args = exiftool_args(delta, copy);
    if dry_run {
        return ShiftStatus::DryRun {
            command: display_command(EXIFTOOL, &args),
        };
    }

    tracing::debug!(command = %display_command(EXIFTOOL, &args), "running");
    match runner.run(EXIFTOOL, &args) {
        Ok(out) if out.success => ShiftStatus::Shifted,
        Ok(out) => {
            let detail = [out.stdout.trim(), out.stderr.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            ShiftStatus::Failed { detail }
        }
        Err(e) => ShiftStatus::Failed {
            detail: e.to_string(),
        },
    }
}

/// Copy `source` to `destination`, creating parents and keeping the mtime.
pub fn copy_preserving_mtime(source: &Path, destination: &Path) -> io::Result<()> {
    if destination.exists() && source.canonicalize()? == destination.canonicalize()? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is the source file itself", destination.display()),
        ));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;
    let modified = fs::metadata(source)?.modified()?;
    File::options()
        .write(true)
        .open(destination)?
        .set_modified(modified)
}
