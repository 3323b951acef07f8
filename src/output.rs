//! CLI output formatting.
//!
//! Every formatter is a pure function returning display lines, so the exact
//! text is unit tested; thin `print_*` wrappers write them to stdout.
//! Diagnostics go through `tracing` on stderr instead.
//!
//! # Output Format
//!
//! ## Shrink
//!
//! ```text
//! Total before: 48.2 MB
//! Total after : 9.7 MB
//! Reduction   : 79.9%
//! Succeeded: 9, skipped: 0, failed: 1
//! Output: out/
//!
//! Errors (1):
//!     in/DSC0001.ARW: Failed to decode in/DSC0001.ARW: unsupported camera
//! ```
//!
//! At most [`MAX_ERRORS_SHOWN`] errors are listed; the total is always shown.
//!
//! ## Shift-time
//!
//! ```text
//! Input:      in/
//! Output:     output/
//! Correction: UTC-8 -> UTC+8
//! Shift:      +16 hours
//! Extensions: .arw .heic .heif .hif
//! Files:      2
//!
//! [failed] output/DSC0002.ARW
//!     Error: ...
//!
//! Done
//! Succeeded: 1
//! Failed:    1
//! Output:    output/
//! ```

use crate::imaging::{Availability, Capabilities};
use crate::process::{FileOutcome, FileStatus, JobSummary, ProcessEvent};
use crate::timeshift::{ShiftOutcome, ShiftPlan, ShiftStatus, ShiftSummary};

/// Errors listed in full before the rest are summarised as a count.
pub const MAX_ERRORS_SHOWN: usize = 50;

fn megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / 1_000_000.0)
}

// ============================================================================
// Shrink
// ============================================================================

/// One line per finished file, for the progress display.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { total } => vec![format!("Processing {total} files")],
        ProcessEvent::FileFinished(outcome) => vec![format_outcome(outcome)],
    }
}

fn format_outcome(outcome: &FileOutcome) -> String {
    let source = outcome.source.display();
    match &outcome.status {
        FileStatus::Skipped => format!("skip {source} (exists)"),
        FileStatus::Succeeded {
            bytes_before,
            bytes_after,
        } => format!(
            "ok   {source} {} \u{2192} {}",
            megabytes(*bytes_before),
            megabytes(*bytes_after)
        ),
        FileStatus::Failed { error } => format!("FAIL {source}: {error}"),
    }
}

/// Final totals, counts, and the capped error list.
pub fn format_summary(summary: &JobSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Total before: {}", megabytes(summary.total_before)),
        format!("Total after : {}", megabytes(summary.total_after)),
    ];
    if let Some(reduction) = summary.reduction_percent() {
        lines.push(format!("Reduction   : {reduction:.1}%"));
    }
    lines.push(format!(
        "Succeeded: {}, skipped: {}, failed: {}",
        summary.succeeded, summary.skipped, summary.failed
    ));
    lines.push(format!("Output: {}", summary.output_dir.display()));

    if summary.failed > 0 {
        lines.push(String::new());
        lines.push(format!("Errors ({}):", summary.failed));
        for (path, error) in summary.errors().take(MAX_ERRORS_SHOWN) {
            lines.push(format!("    {}: {}", path.display(), error));
        }
        if summary.failed > MAX_ERRORS_SHOWN {
            lines.push(format!(
                "    ... and {} more",
                summary.failed - MAX_ERRORS_SHOWN
            ));
        }
    }
    lines
}

pub fn print_summary(summary: &JobSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Capabilities
// ============================================================================

fn availability_line(label: &str, availability: &Availability) -> String {
    match availability {
        Availability::Available => format!("{label}: available"),
        Availability::Unavailable(reason) => format!("{label}: unavailable ({reason})"),
    }
}

pub fn format_capabilities(capabilities: &Capabilities) -> Vec<String> {
    vec![
        availability_line("HEIF decode", &capabilities.heif_decode),
        availability_line("HEIF encode", &capabilities.heif_encode),
        availability_line("EXIF tag codec", &capabilities.exif_tags),
    ]
}

pub fn print_capabilities(capabilities: &Capabilities) {
    for line in format_capabilities(capabilities) {
        println!("{}", line);
    }
}

// ============================================================================
// Shift-time
// ============================================================================

/// Parameters of a planned run, printed before any file is copied.
pub fn format_shift_plan(plan: &ShiftPlan) -> Vec<String> {
    let options = &plan.options;
    let extensions = plan
        .extensions
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        format!("Input:      {}", options.input_dir.display()),
        format!("Output:     {}", options.output_dir.display()),
        format!(
            "Correction: UTC{:+} -> UTC{:+}",
            options.from_utc, options.to_utc
        ),
        format!("Shift:      {:+} hours", options.delta_hours()),
        format!("Extensions: {extensions}"),
        format!("Files:      {}", plan.files.len()),
        String::new(),
    ]
}

/// Dry runs show the command; failures show the tool's output. Successful
/// shifts print nothing.
pub fn format_shift_outcome(outcome: &ShiftOutcome) -> Vec<String> {
    match &outcome.status {
        ShiftStatus::Shifted => Vec::new(),
        ShiftStatus::DryRun { command } => vec![format!("DRY_RUN: {command}")],
        ShiftStatus::Failed { detail } => {
            let mut lines = vec![format!("[failed] {}", outcome.copy.display())];
            lines.extend(detail.lines().map(|l| format!("    {l}")));
            lines
        }
    }
}

pub fn format_shift_summary(summary: &ShiftSummary) -> Vec<String> {
    vec![
        String::new(),
        "Done".to_string(),
        format!("Succeeded: {}", summary.succeeded),
        format!("Failed:    {}", summary.failed),
        format!("Output:    {}", summary.output_dir.display()),
    ]
}

pub fn print_shift_plan(plan: &ShiftPlan) {
    for line in format_shift_plan(plan) {
        println!("{}", line);
    }
}

pub fn print_shift_outcome(outcome: &ShiftOutcome) {
    for line in format_shift_outcome(outcome) {
        println!("{}", line);
    }
}

pub fn print_shift_summary(summary: &ShiftSummary) {
    for line in format_shift_summary(summary) {
        println!("{}", line);
    }
}
