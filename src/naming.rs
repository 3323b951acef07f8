//! Output path planning.
//!
//! An input's output name is its file name with the extension replaced by
//! the target format's (`.jpg` or `.heic`):
//!
//! - `trip/IMG_0001.HEIC` → `<out>/trip/IMG_0001.jpg` (default, structure kept)
//! - `trip/IMG_0001.HEIC` → `<out>/IMG_0001.jpg` (`--flat`)
//!
//! Two inputs can map to the same output (`a.jpg` and `a.png`, or equal
//! names in different directories under `--flat`). Planning walks inputs in
//! sorted order; the first claims the name and the rest get a
//! [`NamingError::Collision`] instead of silently overwriting it.
//!
//! Outputs are written to a hidden sibling (`.IMG_0001.jpg.part`) and
//! renamed into place, see [`temp_path`].

use crate::scan::InputAsset;
use crate::types::OutputFormat;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("name collision: {} is already produced from {}", destination.display(), winner.display())]
    Collision {
        destination: PathBuf,
        winner: PathBuf,
    },
}

/// Relative output path for an input, before joining with the output dir.
pub fn output_relative(relative: &Path, format: OutputFormat, flat: bool) -> PathBuf {
    let renamed = relative.with_extension(format.extension());
    if flat {
        renamed
            .file_name()
            .map(PathBuf::from)
            .unwrap_or(renamed)
    } else {
        renamed
    }
}

/// Destination for every asset, in input order.
pub fn plan_destinations(
    assets: &[InputAsset],
    out_dir: &Path,
    format: OutputFormat,
    flat: bool,
) -> Vec<Result<PathBuf, NamingError>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    assets
        .iter()
        .map(|asset| {
            let destination = out_dir.join(output_relative(&asset.relative, format, flat));
            match claimed.get(&destination) {
                Some(winner) => Err(NamingError::Collision {
                    destination,
                    winner: winner.to_path_buf(),
                }),
                None => {
                    claimed.insert(destination.clone(), &asset.path);
                    Ok(destination)
                }
            }
        })
        .collect()
}

/// Hidden sibling used while the output is being written.
pub fn temp_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(destination.file_name().unwrap_or_default());
    name.push(".part");
    destination.with_file_name(name)
}
