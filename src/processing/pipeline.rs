use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::{FailurePolicy, HotspotMode, ProcessingConfig};
use crate::data::model::{Pixel, Spectrum, SpectrumSet};
use crate::error::{MsiError, Result};
use crate::processing::{hotspot, noise, normalize::Normalizer};

/// A pixel dropped under [`FailurePolicy::Exclude`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedPixel {
    pub pixel: Pixel,
    pub reason: MsiError,
}

/// What happened during a run, beyond the spectra themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Pixels left unscaled because their normalization factor was undefined.
    pub degenerate: Vec<Pixel>,
    pub excluded: Vec<ExcludedPixel>,
    /// Threshold applied by hotspot removal, if it ran.
    pub hotspot_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub spectra: SpectrumSet,
    pub report: PipelineReport,
}

/// Outcome of the per-pixel stages for one pixel.
enum PixelResult {
    Done(Spectrum),
    Unscaled(Spectrum),
    Failed(MsiError),
}

/// Runs noise reduction, normalization and hotspot removal, in that order.
pub struct Pipeline<'a> {
    config: &'a ProcessingConfig,
    normalizer: Normalizer,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and build a pipeline for it.
    pub fn new(config: &'a ProcessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            config,
            normalizer: Normalizer::from_config(config),
        })
    }

    pub fn run(&self, input: &SpectrumSet) -> Result<PipelineOutput> {
        self.run_with_cancel(input, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::run`], checking `cancel` between batches of pixels.
    pub fn run_with_cancel(&self, input: &SpectrumSet, cancel: &AtomicBool) -> Result<PipelineOutput> {
        let start = Instant::now();
        info!(
            "Pre-processing {} spectra ({})",
            input.len(),
            self.config.label()
        );

        let entries: Vec<(&Pixel, &Spectrum)> = input.spectra.iter().collect();
        let mut report = PipelineReport::default();
        let mut processed: BTreeMap<Pixel, Spectrum> = BTreeMap::new();

        for batch in entries.chunks(self.config.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                warn!("Pre-processing cancelled after {} spectra", processed.len());
                return Err(MsiError::Cancelled);
            }
            let results: Vec<(Pixel, PixelResult)> = batch
                .par_iter()
                .map(|&(pixel, spectrum)| (*pixel, self.process_pixel(spectrum)))
                .collect();

            for (pixel, result) in results {
                match result {
                    PixelResult::Done(sp) => {
                        processed.insert(pixel, sp);
                    }
                    PixelResult::Unscaled(sp) => {
                        report.degenerate.push(pixel);
                        processed.insert(pixel, sp);
                    }
                    // results keep batch order and batches follow pixel order,
                    // so the first failure seen is the lowest coordinate
                    PixelResult::Failed(reason) => match self.config.failure_policy {
                        FailurePolicy::Abort => {
                            warn!(
                                "Pre-processing aborted at {pixel} after {} spectra: {reason}",
                                processed.len()
                            );
                            return Err(reason.at(pixel));
                        }
                        FailurePolicy::Exclude => {
                            warn!("Excluding pixel {pixel}: {reason}");
                            report.excluded.push(ExcludedPixel { pixel, reason });
                        }
                    },
                }
            }
        }

        if !report.degenerate.is_empty() {
            warn!(
                "{} spectra could not be normalized and were left unscaled",
                report.degenerate.len()
            );
        }
        debug!("Noise reduction and normalization took {:?}", start.elapsed());

        let spectra = self.remove_hotspots(processed, &mut report, cancel)?;
        info!(
            "Pre-processing finished in {:?}: {} spectra kept, {} excluded",
            start.elapsed(),
            spectra.len(),
            report.excluded.len()
        );
        Ok(PipelineOutput {
            spectra: input.with_spectra(spectra),
            report,
        })
    }

    fn process_pixel(&self, spectrum: &Spectrum) -> PixelResult {
        let reduced = match noise::reduce_noise(spectrum, self.config.noise_reduction_pct) {
            Ok(sp) => sp,
            Err(e) => return PixelResult::Failed(e),
        };
        match self.normalizer.apply(&reduced) {
            Ok(sp) => PixelResult::Done(sp),
            Err(e) if e.is_degenerate() => PixelResult::Unscaled(reduced),
            Err(e) => PixelResult::Failed(e),
        }
    }

    fn remove_hotspots(
        &self,
        spectra: BTreeMap<Pixel, Spectrum>,
        report: &mut PipelineReport,
        cancel: &AtomicBool,
    ) -> Result<BTreeMap<Pixel, Spectrum>> {
        let mode = self.config.hotspot_removal;
        if mode == HotspotMode::None {
            return Ok(spectra);
        }
        let Some(limit) = hotspot::threshold(
            spectra.par_iter().map(|(_, sp)| sp),
            self.config.hotspot_threshold,
        ) else {
            debug!("Hotspot removal skipped: no peaks in the set");
            return Ok(spectra);
        };
        info!("Hotspot removal ({mode:?}): limit = {limit}");
        report.hotspot_threshold = Some(limit);

        if cancel.load(Ordering::Relaxed) {
            return Err(MsiError::Cancelled);
        }
        Ok(spectra
            .par_iter()
            .map(|(pixel, sp)| (*pixel, hotspot::remove(sp, mode, limit)))
            .collect())
    }
}

/// Validate `config` and run it over `input`.
pub fn run(input: &SpectrumSet, config: &ProcessingConfig) -> Result<PipelineOutput> {
    Pipeline::new(config)?.run(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HotspotThreshold, NormalizationMethod, DEFAULT_BATCH_SIZE};

    fn example_set() -> SpectrumSet {
        [
            (
                Pixel::new(0, 0),
                Spectrum::from_pairs(&[(100.0, 10.0), (200.0, 100.0)]).unwrap(),
            ),
            (
                Pixel::new(0, 1),
                Spectrum::from_pairs(&[(100.0, 20.0), (200.0, 50.0)]).unwrap(),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test_log::test]
    fn identity_config_reproduces_input() {
        let input = example_set();
        let out = run(&input, &ProcessingConfig::default()).unwrap();
        assert_eq!(out.spectra, input);
        assert_eq!(out.report, PipelineReport::default());
    }

    fn noise_then_tic(pct: f64) -> ProcessingConfig {
        ProcessingConfig {
            noise_reduction_pct: pct,
            normalization_method: NormalizationMethod::Tic,
            ..Default::default()
        }
    }

    #[test_log::test]
    fn noise_then_tic_at_half_maximum() {
        // 20 < 50% of 50, so both pixels keep only their 200.0 peak
        let out = run(&example_set(), &noise_then_tic(50.0)).unwrap();
        for pixel in [Pixel::new(0, 0), Pixel::new(0, 1)] {
            let sp = out.spectra.get(&pixel).unwrap();
            assert_eq!(sp.mz, vec![200.0]);
            assert_eq!(sp.intensity, vec![1.0]);
        }
    }

    #[test_log::test]
    fn noise_then_tic_keeps_peaks_at_threshold() {
        let out = run(&example_set(), &noise_then_tic(40.0)).unwrap();

        let p00 = out.spectra.get(&Pixel::new(0, 0)).unwrap();
        assert_eq!(p00.mz, vec![200.0]);
        assert_eq!(p00.intensity, vec![1.0]);

        let p01 = out.spectra.get(&Pixel::new(0, 1)).unwrap();
        assert_eq!(p01.mz, vec![100.0, 200.0]);
        assert!((p01.intensity[0] - 20.0 / 70.0).abs() < 1e-12);
        assert!((p01.intensity[1] - 50.0 / 70.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_config_fails_before_processing() {
        let config = ProcessingConfig {
            noise_reduction_pct: 120.0,
            ..Default::default()
        };
        assert!(matches!(
            run(&example_set(), &config),
            Err(MsiError::InvalidConfig(_))
        ));
    }

    fn reference_config(policy: FailurePolicy) -> ProcessingConfig {
        ProcessingConfig {
            normalization_method: NormalizationMethod::ReferencePeak,
            reference_peak_mz: Some(200.0),
            reference_tolerance: 0.01,
            failure_policy: policy,
            ..Default::default()
        }
    }

    fn set_with_missing_reference() -> SpectrumSet {
        let mut set = example_set();
        set.spectra.insert(
            Pixel::new(2, 0),
            Spectrum::from_pairs(&[(100.0, 5.0)]).unwrap(),
        );
        set.spectra.insert(
            Pixel::new(1, 3),
            Spectrum::from_pairs(&[(150.0, 5.0)]).unwrap(),
        );
        set
    }

    #[test_log::test]
    fn abort_policy_names_first_failing_pixel() {
        let err = run(&set_with_missing_reference(), &reference_config(FailurePolicy::Abort)).unwrap_err();
        match err {
            MsiError::Pixel { pixel, source } => {
                assert_eq!(pixel, Pixel::new(1, 3));
                assert!(matches!(*source, MsiError::ReferenceNotFound { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test_log::test]
    fn exclude_policy_records_dropped_pixels() {
        let out = run(&set_with_missing_reference(), &reference_config(FailurePolicy::Exclude)).unwrap();
        assert_eq!(out.spectra.len(), 2);
        let excluded: Vec<Pixel> = out.report.excluded.iter().map(|e| e.pixel).collect();
        assert_eq!(excluded, vec![Pixel::new(1, 3), Pixel::new(2, 0)]);
        let kept = out.spectra.get(&Pixel::new(0, 1)).unwrap();
        assert!((kept.intensity[0] - 0.4).abs() < 1e-12);
        assert!((kept.intensity[1] - 1.0).abs() < 1e-12);
    }

    #[test_log::test]
    fn degenerate_spectra_are_flagged_and_unscaled() {
        let mut set = example_set();
        let zeros = Spectrum::from_pairs(&[(100.0, 0.0), (200.0, 0.0)]).unwrap();
        set.spectra.insert(Pixel::new(5, 5), zeros.clone());
        let config = ProcessingConfig {
            normalization_method: NormalizationMethod::Tic,
            ..Default::default()
        };
        let out = run(&set, &config).unwrap();
        assert_eq!(out.report.degenerate, vec![Pixel::new(5, 5)]);
        assert_eq!(out.spectra.get(&Pixel::new(5, 5)), Some(&zeros));
    }

    #[test_log::test]
    fn clip_bounds_every_spectrum() {
        let mut set = example_set();
        set.spectra.insert(
            Pixel::new(3, 3),
            Spectrum::from_pairs(&[(100.0, 5000.0), (200.0, 10.0)]).unwrap(),
        );
        let config = ProcessingConfig {
            hotspot_removal: HotspotMode::Clip,
            hotspot_threshold: HotspotThreshold::Sigma(1.0),
            ..Default::default()
        };
        let out = run(&set, &config).unwrap();
        let limit = out.report.hotspot_threshold.unwrap();
        assert!(limit < 5000.0);
        for sp in out.spectra.spectra.values() {
            assert!(sp.max_intensity().unwrap() <= limit);
        }
        // the input is untouched
        assert_eq!(set.get(&Pixel::new(3, 3)).unwrap().intensity[0], 5000.0);
    }

    #[test]
    fn cancelled_run_stops() {
        let cancel = AtomicBool::new(true);
        let config = ProcessingConfig::default();
        let err = Pipeline::new(&config)
            .unwrap()
            .run_with_cancel(&example_set(), &cancel)
            .unwrap_err();
        assert_eq!(err, MsiError::Cancelled);
    }

    #[test_log::test]
    fn abort_stops_at_first_failing_batch() {
        let config = ProcessingConfig {
            batch_size: 1,
            ..reference_config(FailurePolicy::Abort)
        };
        let err = run(&set_with_missing_reference(), &config).unwrap_err();
        assert!(matches!(err, MsiError::Pixel { pixel, .. } if pixel == Pixel::new(1, 3)));
    }

    /// Small deterministic sets covering the awkward shapes: metadata, empty
    /// spectra, all-zero spectra, many pixels.
    fn generated_sets() -> Vec<SpectrumSet> {
        let mut sets = vec![example_set()];

        let mut with_metadata = example_set();
        with_metadata.metadata.insert(
            "polarity".to_string(),
            crate::data::model::MetadataValue::String("positive".into()),
        );
        with_metadata.spectra.insert(Pixel::new(4, 0), Spectrum::empty());
        with_metadata.spectra.insert(
            Pixel::new(4, 1),
            Spectrum::from_pairs(&[(100.0, 0.0), (300.0, 0.0)]).unwrap(),
        );
        sets.push(with_metadata);

        let mut seed = 7u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as f64 / (1u64 << 31) as f64
        };
        for n in [1u32, 5, 17] {
            let set: SpectrumSet = (0..n)
                .map(|i| {
                    let pairs: Vec<(f64, f64)> = (0..(i % 6))
                        .map(|k| (100.0 + 50.0 * k as f64, (next() * 100.0).round()))
                        .collect();
                    (Pixel::new(i % 4, i / 4), Spectrum::from_pairs(&pairs).unwrap())
                })
                .collect();
            sets.push(set);
        }
        sets
    }

    #[test_log::test]
    fn identity_law_holds_for_any_batch_size() {
        for set in generated_sets() {
            for batch_size in [1, 3, DEFAULT_BATCH_SIZE] {
                let config = ProcessingConfig {
                    batch_size,
                    ..Default::default()
                };
                let out = run(&set, &config).unwrap();
                assert_eq!(out.spectra, set, "batch size {batch_size}");
                assert_eq!(out.report, PipelineReport::default());
            }
        }
    }

    #[test_log::test]
    fn rescale_bounds_every_spectrum() {
        for set in generated_sets() {
            let config = ProcessingConfig {
                hotspot_removal: HotspotMode::Rescale,
                hotspot_threshold: HotspotThreshold::Sigma(0.5),
                ..Default::default()
            };
            let out = run(&set, &config).unwrap();
            let Some(limit) = out.report.hotspot_threshold else {
                continue;
            };
            for (pixel, sp) in &out.spectra.spectra {
                let before = set.get(pixel).unwrap();
                assert_eq!(sp.mz, before.mz);
                assert!(sp.intensity.iter().all(|&v| v <= limit + 1e-9));
                // rescaling keeps the relative peak heights of a spectrum
                if let Some(max) = before.max_intensity().filter(|&m| m > limit) {
                    for (a, b) in sp.intensity.iter().zip(&before.intensity) {
                        assert!((a - b * limit / max).abs() < 1e-9);
                    }
                }
            }
        }
    }
}
