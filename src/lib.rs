//! Pre-processing, aggregation and annotation of mass spectrometry imaging
//! (MSI) data.
//!
//! A [`SpectrumSet`] holds one spectrum per pixel. The
//! [`pipeline`](processing::pipeline) derives a new set through noise
//! reduction, normalization and hotspot removal; the
//! [`aggregate`](processing::aggregate) module turns a set into mean spectra
//! and ion images. [`Session`] bundles the state a viewer host works with.

pub mod annotation;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod session;

pub use config::{FailurePolicy, HotspotMode, HotspotThreshold, NormalizationMethod, ProcessingConfig};
pub use data::model::{MeanSpectrum, MetadataValue, Pixel, RoiMask, Spectrum, SpectrumSet};
pub use error::MsiError;
pub use session::{Session, SpectralSession};
