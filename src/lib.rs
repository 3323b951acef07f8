//! # Batch Shrink
//!
//! Batch-transcodes a directory tree of camera photos (JPEG, PNG,
//! HEIC/HEIF, Sony ARW) into smaller JPEG or HEIF files, and separately
//! shifts photo timestamps taken with the wrong camera time zone.
//!
//! # Architecture: Prepare, Then Fan Out
//!
//! ```text
//! 1. Prepare   config + capabilities + discovery  →  PreparedJob   (fatal errors only)
//! 2. Run       PreparedJob  →  worker pool  →  FileOutcome per file
//! 3. Report    outcomes  →  JobSummary  →  stdout / JSON
//! ```
//!
//! Everything that can fail the whole run is checked in step 1, before any
//! output directory exists. Step 2 never fails as a whole because of one
//! file: each input runs decode → transform → encode on its own worker and
//! ends as skipped, succeeded, or failed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `JobConfig` from stock defaults, an optional TOML file, and CLI flags |
//! | [`types`] | Input/output formats and exit statuses |
//! | [`scan`] | Recursive, sorted, case-insensitive input discovery |
//! | [`naming`] | Output paths, collision detection, temp file names |
//! | [`imaging`] | Decoders, pixel normalisation, encoders, capability probing |
//! | [`process`] | The job runner: fatal checks, worker pool, aggregation, report |
//! | [`timeshift`] | Copy-and-shift timestamps through `exiftool` |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Optional Codecs Are Capabilities, Not Errors
//!
//! HEIF support links the system libheif and is behind the `heif` feature;
//! the EXIF tag codec is behind `exif`. [`imaging::Capabilities`] is probed
//! once per process and passed by reference into the decoder and encoder,
//! so a missing codec is a typed, testable condition instead of a global
//! flag read from deep inside a worker.
//!
//! ## Pixels Are Upright Before Encoding
//!
//! Orientation is baked into pixels at decode time and the EXIF tag is
//! rewritten to 1, so every output renders correctly whether or not the
//! viewer honours the tag.
//!
//! ## Mirrored Output Layout
//!
//! Outputs keep their input's relative directory by default. `--flat`
//! writes everything into one directory and reports name collisions
//! instead of silently overwriting.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod timeshift;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
