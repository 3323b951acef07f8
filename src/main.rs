use batch_shrink::config::{self, BackgroundColor, JobOverrides};
use batch_shrink::imaging::Capabilities;
use batch_shrink::output;
use batch_shrink::process::{self, ProcessError, ProcessEvent};
use batch_shrink::timeshift::{self, ShiftOptions, SystemRunner};
use batch_shrink::types::{ExitStatus, OutputFormat};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "batch-shrink")]
#[command(about = "Batch-transcode camera photos into smaller JPEG or HEIF files")]
#[command(long_about = "\
Batch-transcode camera photos into smaller JPEG or HEIF files

Inputs are found recursively by extension (case-insensitive):
  .jpg .jpeg .png .heic .heif .hif .hifc .arw

Every image is decoded, rotated upright, flattened onto the background
color if it has transparency, shrunk so its long edge fits --max-edge, and
re-encoded. Each file succeeds or fails on its own; one bad file never
stops the batch.

Exit codes:
  0   success
  1   no matching input files
  2   invalid --bg value
  3   --keep-orientation-only without the EXIF tag codec
  4   HEIF output without a HEIF encoder
  5   invalid configuration or input directory
  6   shift-time: exiftool not runnable
  10  one or more files failed

Run 'batch-shrink capabilities' to see which optional codecs this build has.")]
#[command(version)]
struct Cli {
    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode every image under INPUT into OUTPUT
    Shrink(ShrinkArgs),
    /// Copy files and shift their timestamps to fix a camera time zone
    ShiftTime(ShiftTimeArgs),
    /// Show which optional codecs are available
    Capabilities,
}

#[derive(clap::Args)]
struct ShrinkArgs {
    /// Input directory (searched recursively)
    input: PathBuf,

    /// Output directory
    output: PathBuf,

    /// Output format [default: heif]
    #[arg(long, value_enum)]
    out_format: Option<OutputFormat>,

    /// Maximum long edge in pixels [default: 6000]
    #[arg(long)]
    max_edge: Option<u32>,

    /// Lossy quality 1-100, JPEG capped at 95 [default: 80]
    #[arg(long)]
    quality: Option<u32>,

    /// JPEG: drop EXIF and ICC profile
    #[arg(long)]
    strip: bool,

    /// JPEG: keep only the orientation tag (ignored with --strip)
    #[arg(long)]
    keep_orientation_only: bool,

    /// Background for transparency: white, black, or R,G,B [default: white]
    #[arg(long)]
    bg: Option<String>,

    /// Parallel workers [default: one per CPU]
    #[arg(long)]
    workers: Option<usize>,

    /// Re-encode even when the output file exists
    #[arg(long)]
    overwrite: bool,

    /// Write all outputs directly into OUTPUT instead of mirroring subdirectories
    #[arg(long)]
    flat: bool,

    /// TOML file with defaults for any of the flags above
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON report of every file's outcome
    #[arg(long)]
    report: Option<PathBuf>,
}

impl ShrinkArgs {
    fn overrides(&self) -> JobOverrides {
        JobOverrides {
            out_format: self.out_format,
            max_edge: self.max_edge,
            quality: self.quality,
            strip: self.strip,
            keep_orientation_only: self.keep_orientation_only,
            bg: self.bg.clone(),
            workers: self.workers,
            overwrite: self.overwrite,
            flat: self.flat,
        }
    }
}

#[derive(clap::Args)]
struct ShiftTimeArgs {
    /// Input directory (searched recursively)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for corrected copies
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// UTC offset the camera was wrongly set to
    #[arg(
        long,
        default_value = "-8",
        allow_hyphen_values = true,
        value_parser = timeshift::parse_utc_offset
    )]
    from_utc: i32,

    /// UTC offset the photos were actually taken in
    #[arg(
        long,
        default_value = "+8",
        allow_hyphen_values = true,
        value_parser = timeshift::parse_utc_offset
    )]
    to_utc: i32,

    /// Extra extension to include, repeatable (e.g. --ext .jpg --ext mp4)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Copy files and print the exiftool commands without running them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let status = match cli.command {
        Command::Shrink(args) => shrink(&args, cli.verbose),
        Command::ShiftTime(args) => shift_time(args),
        Command::Capabilities => {
            output::print_capabilities(Capabilities::detect());
            ExitStatus::Success
        }
    };
    ExitCode::from(status.code())
}

/// `warn` for dependencies, `info` (or `debug` with -v) for this crate.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,batch_shrink={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(err: impl std::fmt::Display, status: ExitStatus) -> ExitStatus {
    eprintln!("error: {err}");
    status
}

fn shrink(args: &ShrinkArgs, verbose: bool) -> ExitStatus {
    // A bad --bg is reported before the config file is even read.
    if let Some(bg) = &args.bg {
        if let Err(err) = BackgroundColor::parse(bg) {
            return fail(err, ExitStatus::InvalidBackground);
        }
    }

    let config = match config::load_config(args.config.as_deref()) {
        Ok(c) => args.overrides().apply(c),
        Err(err) => {
            let err = ProcessError::from(err);
            let status = err.exit_status();
            return fail(err, status);
        }
    };

    let capabilities = Capabilities::detect();
    let job = match process::prepare(&args.input, &args.output, &config, capabilities) {
        Ok(job) => job,
        Err(err) => {
            let status = err.exit_status();
            return fail(err, status);
        }
    };

    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || render_progress(rx, verbose));
    let result = process::run(&job, capabilities, Some(tx));
    let _ = printer.join();

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            let status = err.exit_status();
            return fail(err, status);
        }
    };

    output::print_summary(&summary);
    if let Some(path) = &args.report {
        match process::write_report(path, &summary) {
            Ok(()) => println!("Report: {}", path.display()),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "report not written"),
        }
    }
    summary.exit_status()
}

/// Drive a progress bar from job events. Failures are always printed above
/// the bar; other per-file lines only with `--verbose`.
fn render_progress(rx: mpsc::Receiver<ProcessEvent>, verbose: bool) {
    let mut bar: Option<ProgressBar> = None;
    for event in rx {
        match &event {
            ProcessEvent::Started { total } => {
                let pb = ProgressBar::new(*total as u64);
                if let Ok(style) = ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
                ) {
                    pb.set_style(style.progress_chars("=>-"));
                }
                bar = Some(pb);
            }
            ProcessEvent::FileFinished(outcome) => {
                let Some(pb) = &bar else { continue };
                pb.inc(1);
                if outcome.is_failed() || verbose {
                    for line in output::format_process_event(&event) {
                        pb.println(line);
                    }
                }
            }
        }
    }
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}

fn shift_time(args: ShiftTimeArgs) -> ExitStatus {
    let options = ShiftOptions {
        input_dir: args.input,
        output_dir: args.output,
        from_utc: args.from_utc,
        to_utc: args.to_utc,
        extra_extensions: args.extensions,
        dry_run: args.dry_run,
    };
    let runner = SystemRunner;
    let plan = match timeshift::plan(options, &runner) {
        Ok(plan) => plan,
        Err(err) => {
            let status = err.exit_status();
            return fail(err, status);
        }
    };

    output::print_shift_plan(&plan);
    let summary = timeshift::execute(&plan, &runner, output::print_shift_outcome);
    output::print_shift_summary(&summary);
    summary.exit_status()
}
