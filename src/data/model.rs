use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{MsiError, Result};

// ---------------------------------------------------------------------------
// MetadataValue – a single acquisition metadata entry
// ---------------------------------------------------------------------------

/// A dynamically-typed acquisition metadata value (resolution, polarity,
/// pixel size, ...), as handed over by the file loader.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Interpret text typed by a user: integer, float or boolean when it
    /// parses as one, a string otherwise. Empty text is `Null`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            MetadataValue::Null
        } else if let Ok(i) = text.parse::<i64>() {
            MetadataValue::Integer(i)
        } else if let Ok(v) = text.parse::<f64>() {
            MetadataValue::Float(v)
        } else if let Ok(b) = text.parse::<bool>() {
            MetadataValue::Bool(b)
        } else {
            MetadataValue::String(text.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Pixel – spatial coordinate of one spectrum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub const fn new(x: u32, y: u32) -> Self {
        Pixel { x, y }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(u32, u32)> for Pixel {
    fn from((x, y): (u32, u32)) -> Self {
        Pixel { x, y }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – centroid or profile peaks of one pixel
// ---------------------------------------------------------------------------

/// A single mass spectrum.
///
/// `mz` is strictly ascending and `intensity` is non-negative; both have the
/// same length. Construct through [`Spectrum::try_new`] when the arrays come
/// from outside the crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// m/z axis (x).
    pub mz: Vec<f64>,
    /// Intensity axis (y) – same length as `mz`.
    pub intensity: Vec<f64>,
}

impl Spectrum {
    /// Build a spectrum, checking the array contract.
    pub fn try_new(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if mz.len() != intensity.len() {
            return Err(MsiError::InvalidSpectrum(format!(
                "m/z has {} values but intensity has {}",
                mz.len(),
                intensity.len()
            )));
        }
        if let Some(i) = mz.windows(2).position(|w| !(w[0] < w[1])) {
            return Err(MsiError::InvalidSpectrum(format!(
                "m/z not strictly increasing at index {}",
                i + 1
            )));
        }
        if let Some(i) = intensity.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(MsiError::InvalidSpectrum(format!(
                "intensity[{i}] = {} is negative or not finite",
                intensity[i]
            )));
        }
        Ok(Spectrum { mz, intensity })
    }

    /// Build from `(m/z, intensity)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (mz, intensity) = pairs.iter().copied().unzip();
        Spectrum::try_new(mz, intensity)
    }

    pub fn empty() -> Self {
        Spectrum::default()
    }

    /// Number of peaks.
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Largest intensity, `None` for an empty spectrum.
    pub fn max_intensity(&self) -> Option<f64> {
        self.intensity.iter().copied().reduce(f64::max)
    }

    /// Total ion current.
    pub fn tic(&self) -> f64 {
        self.intensity.iter().sum()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    /// Index range of peaks with `lo <= m/z <= hi`.
    pub fn window(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let start = self.mz.partition_point(|&m| m < lo);
        let end = self.mz.partition_point(|&m| m <= hi);
        start..end.max(start)
    }

    /// Index of the peak nearest to `target` within `tolerance`.
    pub fn nearest_peak(&self, target: f64, tolerance: f64) -> Option<usize> {
        let window = self.window(target - tolerance, target + tolerance);
        window.min_by(|&a, &b| {
            let da = (self.mz[a] - target).abs();
            let db = (self.mz[b] - target).abs();
            da.total_cmp(&db)
        })
    }

    /// Same axis, intensities multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Spectrum {
            mz: self.mz.clone(),
            intensity: self.intensity.iter().map(|v| v * factor).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumSet – the complete loaded dataset
// ---------------------------------------------------------------------------

/// All spectra of one acquisition, keyed by pixel.
///
/// Processing never mutates a set; every stage returns a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumSet {
    pub spectra: BTreeMap<Pixel, Spectrum>,
    /// Acquisition metadata (resolution, polarity, ...).
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl SpectrumSet {
    pub fn from_spectra(spectra: BTreeMap<Pixel, Spectrum>) -> Self {
        SpectrumSet {
            spectra,
            metadata: BTreeMap::new(),
        }
    }

    /// Same metadata, different spectra.
    pub fn with_spectra(&self, spectra: BTreeMap<Pixel, Spectrum>) -> Self {
        SpectrumSet {
            spectra,
            metadata: self.metadata.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn get(&self, pixel: &Pixel) -> Option<&Spectrum> {
        self.spectra.get(pixel)
    }

    pub fn pixels(&self) -> impl Iterator<Item = &Pixel> {
        self.spectra.keys()
    }

    /// Add or replace one metadata entry; `Null` removes it.
    pub fn set_metadata(&mut self, key: &str, value: MetadataValue) {
        match value {
            MetadataValue::Null => {
                self.metadata.remove(key);
            }
            value => {
                self.metadata.insert(key.to_string(), value);
            }
        }
    }

    /// `(width, height)` of the smallest raster covering every pixel.
    ///
    /// Saturates at `u32::MAX`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.spectra.keys().fold((0, 0), |(w, h), p| {
            (w.max(p.x.saturating_add(1)), h.max(p.y.saturating_add(1)))
        })
    }
}

impl FromIterator<(Pixel, Spectrum)> for SpectrumSet {
    fn from_iter<I: IntoIterator<Item = (Pixel, Spectrum)>>(iter: I) -> Self {
        SpectrumSet::from_spectra(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// RoiMask / MeanSpectrum
// ---------------------------------------------------------------------------

/// User-selected set of pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoiMask {
    pub pixels: BTreeSet<Pixel>,
}

/// Pixel-wise mean of a set of spectra sharing one m/z axis.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanSpectrum {
    pub spectrum: Spectrum,
    /// Number of pixels that contributed.
    pub n_pixels: usize,
}
