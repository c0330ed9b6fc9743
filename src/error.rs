use thiserror::Error;

use crate::data::model::Pixel;

/// Errors raised by the processing core.
///
/// Every variant is recoverable: the caller decides whether to report it,
/// retry with a different configuration, or drop the affected pixel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MsiError {
    /// A configuration value is out of range or unknown.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No peak within tolerance of the requested reference m/z.
    #[error("no reference peak within {tolerance} of m/z {mz}")]
    ReferenceNotFound { mz: f64, tolerance: f64 },

    /// Aggregation was requested over zero pixels.
    #[error("selection contains no spectra")]
    EmptySelection,

    /// The normalization factor would be a division by zero.
    #[error("degenerate spectrum: {0}")]
    DegenerateSpectrum(String),

    /// Spectrum arrays break the ordering / sign / length contract.
    #[error("invalid spectrum: {0}")]
    InvalidSpectrum(String),

    /// Aggregation needs every spectrum on the same m/z axis.
    #[error("spectrum at {pixel} does not share the common m/z axis")]
    AxisMismatch { pixel: Pixel },

    /// A per-pixel stage failed.
    #[error("pixel {pixel}: {source}")]
    Pixel {
        pixel: Pixel,
        #[source]
        source: Box<MsiError>,
    },

    /// An image raster would exceed the pixel limit.
    #[error("raster of {width}×{height} pixels is too large")]
    RasterTooLarge { width: u32, height: u32 },

    #[error("processing cancelled")]
    Cancelled,
}

impl MsiError {
    /// Attach a pixel coordinate to a stage error.
    pub fn at(self, pixel: Pixel) -> Self {
        MsiError::Pixel {
            pixel,
            source: Box::new(self),
        }
    }

    /// Whether this error means "leave the spectrum unscaled" rather than a
    /// hard failure.
    pub fn is_degenerate(&self) -> bool {
        match self {
            MsiError::DegenerateSpectrum(_) => true,
            MsiError::Pixel { source, .. } => source.is_degenerate(),
            _ => false,
        }
    }
}

pub type Result<T, E = MsiError> = std::result::Result<T, E>;
