use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::model::{MeanSpectrum, Pixel, RoiMask, Spectrum, SpectrumSet};
use crate::data::roi;
use crate::error::{MsiError, Result};

/// Largest raster (width × height) an ion image may be expanded to.
pub const MAX_RASTER_PIXELS: u64 = 1 << 28;

/// Pixel-wise mean over `set`, or over the pixels of `roi` present in `set`.
///
/// All included spectra must share one m/z axis; see
/// [`crate::processing::binning::bin_to_common_axis`].
pub fn mean_spectrum(set: &SpectrumSet, roi: Option<&RoiMask>) -> Result<MeanSpectrum> {
    let included: Vec<(&Pixel, &Spectrum)> = match roi {
        Some(mask) => roi::resolve(mask, set).collect(),
        None => set.spectra.iter().collect(),
    };
    let Some(&(_, first)) = included.first() else {
        return Err(MsiError::EmptySelection);
    };

    if let Some(&(pixel, _)) = included.iter().find(|(_, sp)| sp.mz != first.mz) {
        return Err(MsiError::AxisMismatch { pixel: *pixel });
    }

    let n = included.len();
    let mut sums = vec![0.0; first.len()];
    for (_, sp) in &included {
        for (acc, v) in sums.iter_mut().zip(&sp.intensity) {
            *acc += v;
        }
    }
    let intensity = sums.into_iter().map(|s| s / n as f64).collect();

    Ok(MeanSpectrum {
        spectrum: Spectrum {
            mz: first.mz.clone(),
            intensity,
        },
        n_pixels: n,
    })
}

/// How intensities inside the m/z window collapse to one pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    #[default]
    Sum,
    Max,
    Mean,
}

impl std::str::FromStr for Reduce {
    type Err = MsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Reduce::Sum),
            "max" => Ok(Reduce::Max),
            "mean" => Ok(Reduce::Mean),
            other => Err(MsiError::InvalidConfig(format!("unknown reduction '{other}'"))),
        }
    }
}

impl Reduce {
    fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Reduce::Sum => values.iter().sum(),
            Reduce::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reduce::Mean => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

/// Intensity distribution of one m/z window across the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct IonImage {
    pub mz: f64,
    pub tolerance: f64,
    pub values: BTreeMap<Pixel, f64>,
    pub width: u32,
    pub height: u32,
}

impl IonImage {
    /// Number of raster cells, or `RasterTooLarge` past [`MAX_RASTER_PIXELS`].
    pub fn raster_len(&self) -> Result<usize> {
        let len = u64::from(self.width) * u64::from(self.height);
        if len > MAX_RASTER_PIXELS {
            return Err(MsiError::RasterTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        Ok(len as usize)
    }

    /// Row-major `height × width` raster; pixels without a spectrum are 0.
    pub fn to_raster(&self) -> Result<Vec<f64>> {
        let mut raster = vec![0.0; self.raster_len()?];
        for (p, v) in &self.values {
            raster[p.y as usize * self.width as usize + p.x as usize] = *v;
        }
        Ok(raster)
    }

    /// `(min, max)` over all pixel values.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values.values().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Reduce intensities with `mz - tol <= m/z <= mz + tol` for every pixel.
pub fn ion_image(set: &SpectrumSet, mz: f64, tolerance: f64, reduce: Reduce) -> IonImage {
    let tol = tolerance.abs();
    let values = set
        .spectra
        .par_iter()
        .map(|(pixel, sp)| {
            let window = sp.window(mz - tol, mz + tol);
            (*pixel, reduce.apply(&sp.intensity[window]))
        })
        .collect();
    let (width, height) = set.dimensions();
    IonImage {
        mz,
        tolerance: tol,
        values,
        width,
        height,
    }
}
