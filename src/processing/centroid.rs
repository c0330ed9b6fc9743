//! Conversion of profile spectra to centroid spectra.

use rayon::prelude::*;

use crate::data::model::{Spectrum, SpectrumSet};
use crate::processing::stats;

/// Heuristic centroid-mode check: profile spectra carry many zero samples
/// between peaks, centroid spectra carry none (or almost nothing at all).
pub fn is_centroided(spectrum: &Spectrum) -> bool {
    let Some(min) = spectrum.intensity.iter().copied().reduce(f64::min) else {
        return true;
    };
    let median = stats::median(&spectrum.intensity).unwrap_or(0.0);
    min > 0.0 || (min == 0.0 && median == 0.0)
}

/// Collapse each run of non-zero samples into one peak.
///
/// A run is bounded by the zero samples on either side (or the spectrum
/// ends). The peak m/z is the intensity-weighted mean over that range and its
/// intensity is the trapezoidal area under the profile.
pub fn centroid(spectrum: &Spectrum) -> Spectrum {
    let n = spectrum.len();
    let mz = &spectrum.mz;
    let y = &spectrum.intensity;
    let mut out = Spectrum::empty();

    let mut i = 0;
    while i < n {
        if y[i] == 0.0 {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < n && y[i] != 0.0 {
            i += 1;
        }
        let lo = run_start.saturating_sub(1);
        let hi = i.min(n - 1);

        let weight: f64 = y[lo..=hi].iter().sum();
        let centre = (lo..=hi).map(|k| mz[k] * y[k]).sum::<f64>() / weight;
        let area = (lo..hi)
            .map(|k| (mz[k + 1] - mz[k]) * (y[k] + y[k + 1]) / 2.0)
            .sum::<f64>();

        out.mz.push(centre);
        out.intensity.push(area);
    }
    out
}

/// Centroid every spectrum of the set. Already-centroided input is returned
/// unchanged.
pub fn centroid_set(set: &SpectrumSet) -> SpectrumSet {
    let spectra = set
        .spectra
        .par_iter()
        .map(|(pixel, sp)| {
            let out = if is_centroided(sp) { sp.clone() } else { centroid(sp) };
            (*pixel, out)
        })
        .collect();
    set.with_spectra(spectra)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Spectrum {
        Spectrum::from_pairs(&[
            (99.0, 0.0),
            (100.0, 1.0),
            (101.0, 2.0),
            (102.0, 1.0),
            (103.0, 0.0),
            (106.0, 3.0),
            (107.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn detects_profile_and_centroid_data() {
        assert!(!is_centroided(&profile()));
        assert!(is_centroided(&Spectrum::from_pairs(&[(1.0, 2.0), (2.0, 1.0)]).unwrap()));
        assert!(is_centroided(&Spectrum::empty()));
    }

    #[test]
    fn collapses_runs_into_peaks() {
        let out = centroid(&profile());
        assert_eq!(out.mz, vec![101.0, 106.0]);
        // trapezoids: 0.5 + 1.5 + 1.5 + 0.5, and 4.5 + 1.5
        assert_eq!(out.intensity, vec![4.0, 6.0]);
    }

    #[test]
    fn run_touching_the_edge() {
        let sp = Spectrum::from_pairs(&[(1.0, 2.0), (2.0, 2.0), (3.0, 0.0)]).unwrap();
        let out = centroid(&sp);
        assert_eq!(out.len(), 1);
        assert!((out.mz[0] - 1.5).abs() < 1e-12);
        assert_eq!(out.intensity[0], 3.0);
    }
}
