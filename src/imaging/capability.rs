//! Process-wide codec capability detection.
//!
//! Optional codecs are probed once, on first use, and the result is shared
//! read-only by every worker. Callers that need a specific capability ask
//! for it through the `require_*` methods, which turn an absent codec into
//! the same [`ImagingError::CapabilityUnavailable`] everywhere.
//!
//! Tests build [`Capabilities`] values by hand instead of probing.

use super::backend::{Capability, ImagingError};
use super::heif;
use std::sync::OnceLock;

/// Whether one capability is present, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

/// Snapshot of optional codec support for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub heif_decode: Availability,
    pub heif_encode: Availability,
    pub exif_tags: Availability,
}

static DETECTED: CapabilityCell = CapabilityCell::new();

impl Capabilities {
    /// Capabilities of this process, probed on the first call only.
    pub fn detect() -> &'static Capabilities {
        DETECTED.get_or_probe(Self::probe)
    }

    /// Run the probes without caching.
    pub fn probe() -> Self {
        let (heif_decode, heif_encode) = heif::probe();
        let exif_tags = if cfg!(feature = "exif") {
            Availability::Available
        } else {
            Availability::Unavailable(
                "built without EXIF tag support (rebuild with --features exif)".into(),
            )
        };
        let caps = Self {
            heif_decode,
            heif_encode,
            exif_tags,
        };
        tracing::debug!(?caps, "probed codec capabilities");
        caps
    }

    /// Everything present. Used by tests that inject mock codecs.
    pub fn all() -> Self {
        Self {
            heif_decode: Availability::Available,
            heif_encode: Availability::Available,
            exif_tags: Availability::Available,
        }
    }

    /// No HEIF support at all, with the given reason.
    pub fn without_heif(reason: &str) -> Self {
        Self {
            heif_decode: Availability::Unavailable(reason.to_string()),
            heif_encode: Availability::Unavailable(reason.to_string()),
            exif_tags: Availability::Available,
        }
    }

    pub fn heif_available(&self) -> bool {
        self.heif_decode.is_available()
    }

    /// Reason HEIF decoding is unavailable, or an empty string if it is.
    pub fn heif_unavailable_reason(&self) -> &str {
        self.heif_decode.reason().unwrap_or("")
    }

    pub fn require_heif_decode(&self) -> Result<(), ImagingError> {
        require(Capability::HeifDecode, &self.heif_decode)
    }

    pub fn require_heif_encode(&self) -> Result<(), ImagingError> {
        require(Capability::HeifEncode, &self.heif_encode)
    }

    pub fn require_exif_tags(&self) -> Result<(), ImagingError> {
        match &self.exif_tags {
            Availability::Available => Ok(()),
            Availability::Unavailable(reason) => {
                Err(ImagingError::MetadataCapabilityUnavailable(reason.clone()))
            }
        }
    }
}

fn require(capability: Capability, availability: &Availability) -> Result<(), ImagingError> {
    match availability {
        Availability::Available => Ok(()),
        Availability::Unavailable(reason) => Err(ImagingError::CapabilityUnavailable {
            capability,
            reason: reason.clone(),
        }),
    }
}

/// Lazily-filled capability slot. The probe runs at most once even when
/// many threads race on the first call.
pub struct CapabilityCell(OnceLock<Capabilities>);

impl CapabilityCell {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn get_or_probe(&self, probe: impl FnOnce() -> Capabilities) -> &Capabilities {
        self.0.get_or_init(probe)
    }
}

impl Default for CapabilityCell {
    fn default() -> Self {
        Self::new()
    }
}
