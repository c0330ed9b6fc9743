//! Hotspot removal: one reduction over the whole set to fix a threshold,
//! then an independent clip / rescale pass per spectrum.

use rayon::prelude::*;

use crate::config::{HotspotMode, HotspotThreshold};
use crate::data::model::Spectrum;
use crate::processing::stats;

/// Phase 1: derive the intensity threshold from every spectrum in the set.
///
/// Returns `None` when no spectrum has a peak (nothing to clip).
pub fn threshold<'a, I>(spectra: I, statistic: HotspotThreshold) -> Option<f64>
where
    I: IntoParallelIterator<Item = &'a Spectrum>,
{
    match statistic {
        HotspotThreshold::Sigma(k) => {
            let maxima: Vec<f64> = spectra
                .into_par_iter()
                .filter_map(Spectrum::max_intensity)
                .collect();
            let mean = stats::mean(&maxima)?;
            let sd = stats::std_dev(&maxima)?;
            Some(mean + k * sd)
        }
        HotspotThreshold::Percentile(p) => {
            let nonzero: Vec<f64> = spectra
                .into_par_iter()
                .flat_map_iter(|sp| sp.intensity.iter().copied().filter(|&v| v != 0.0))
                .collect();
            stats::percentile(&nonzero, p)
        }
    }
}

/// Phase 2: bring one spectrum under `limit`.
pub fn remove(spectrum: &Spectrum, mode: HotspotMode, limit: f64) -> Spectrum {
    match mode {
        HotspotMode::None => spectrum.clone(),
        HotspotMode::Clip => Spectrum {
            mz: spectrum.mz.clone(),
            intensity: spectrum.intensity.iter().map(|&v| v.min(limit)).collect(),
        },
        HotspotMode::Rescale => match spectrum.max_intensity() {
            Some(max) if max > limit => {
                let mut out = spectrum.scaled(limit / max);
                // keep the bound exact under rounding
                for v in &mut out.intensity {
                    *v = v.min(limit);
                }
                out
            }
            _ => spectrum.clone(),
        },
    }
}
