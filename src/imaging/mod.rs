//! Image decoding, normalisation, and encoding.
//!
//! | Stage | Formats | Crate |
//! |---|---|---|
//! | **Decode** | JPEG, PNG | `image` |
//! | | ARW | `rawloader` + in-crate development |
//! | | HEIC/HEIF/HIF | `libheif-rs` (feature `heif`) |
//! | **Transform** | any | `image` (Lanczos3) |
//! | **Encode** | JPEG | `jpeg-encoder` |
//! | | HEIF | `libheif-rs` (feature `heif`) |
//! | **EXIF tags** | orientation-only block | `kamadak-exif` (feature `exif`) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and pixel math (unit testable)
//! - **Parameters**: Data structures describing decode and encode settings
//! - **Backend**: codec traits ([`RawDecoder`], [`HeifCodec`]) and [`ImagingError`]
//! - **Capability**: one-time probe of optional codecs
//! - **Decode / Transform / Encode**: the per-file pipeline stages

pub mod backend;
mod calculations;
pub mod capability;
pub mod decode;
pub mod encode;
pub mod exif;
pub mod heif;
mod params;
pub mod raster;
pub mod raw;
pub mod transform;

pub use backend::{
    Capability, CodecError, HeifCodec, HeifEncodeStrategy, ImagingError, RawDecoder,
    StrategyFailure,
};
pub use calculations::{calculate_downscale_dimensions, composite_channel};
pub use capability::{Availability, Capabilities};
pub use decode::Decoder;
pub use encode::Encoder;
pub use params::{EncodeSpec, JPEG_MAX_QUALITY, MetadataPolicy, Quality, RawPolicy};
pub use raster::{ColorMode, Raster};
pub use raw::RawloaderDecoder;
