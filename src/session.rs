use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::config::ProcessingConfig;
use crate::data::loader;
use crate::data::model::{MeanSpectrum, Pixel, RoiMask, Spectrum, SpectrumSet};
use crate::error::{MsiError, Result};
use crate::processing::aggregate::{self, IonImage, Reduce};
use crate::processing::binning::{self, DEFAULT_DECIMALS};
use crate::processing::centroid;
use crate::processing::pipeline::{Pipeline, PipelineOutput, PipelineReport};

// ---------------------------------------------------------------------------
// Host-facing interface
// ---------------------------------------------------------------------------

/// The narrow surface a viewer host needs: load, process, aggregate, select.
pub trait SpectralSession {
    fn load_spectra(&mut self, path: &Path) -> anyhow::Result<()>;
    fn run_pipeline(&mut self) -> Result<&PipelineReport>;
    fn mean_spectrum(&mut self) -> Result<MeanSpectrum>;
    fn roi_mask(&self) -> &RoiMask;
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything one user works on, passed explicitly instead of living in
/// globals.
#[derive(Debug)]
pub struct Session {
    /// Loaded dataset (None until a file is loaded).
    dataset: Option<SpectrumSet>,

    /// Result of the last pipeline run for the current dataset and config.
    processed: Option<PipelineOutput>,

    /// Pre-processing parameters for the next run.
    config: ProcessingConfig,

    /// Current region of interest.
    roi: RoiMask,

    /// Whole-dataset mean spectra, keyed by the serialized config that
    /// produced the set they average.
    mean_cache: BTreeMap<String, MeanSpectrum>,

    /// m/z decimals of the common axis used for mean spectra.
    bin_decimals: u32,

    /// Checked by pipeline runs between pixel batches.
    cancel: Arc<AtomicBool>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            dataset: None,
            processed: None,
            config: ProcessingConfig::default(),
            roi: RoiMask::default(),
            mean_cache: BTreeMap::new(),
            bin_decimals: DEFAULT_DECIMALS,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Session {
    pub fn new(config: ProcessingConfig) -> Self {
        Session {
            config,
            ..Default::default()
        }
    }

    /// Ingest a newly loaded dataset; drops all derived state.
    pub fn set_dataset(&mut self, dataset: SpectrumSet) {
        self.dataset = Some(dataset);
        self.processed = None;
        self.mean_cache.clear();
        self.roi.clear();
    }

    pub fn dataset(&self) -> Option<&SpectrumSet> {
        self.dataset.as_ref()
    }

    pub fn processed(&self) -> Option<&PipelineOutput> {
        self.processed.as_ref()
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Replace the config. The processed set no longer matches it and is
    /// dropped; cached means stay, keyed by the config they came from.
    pub fn set_config(&mut self, config: ProcessingConfig) -> Result<()> {
        config.validate()?;
        if config != self.config {
            self.config = config;
            self.processed = None;
        }
        Ok(())
    }

    /// Change the rounding of the common m/z axis; cached means are dropped.
    pub fn set_bin_decimals(&mut self, decimals: u32) {
        if decimals != self.bin_decimals {
            self.bin_decimals = decimals;
            self.mean_cache.clear();
        }
    }

    pub fn roi_mut(&mut self) -> &mut RoiMask {
        &mut self.roi
    }

    pub fn set_roi(&mut self, roi: RoiMask) {
        self.roi = roi;
    }

    pub fn clear_roi(&mut self) {
        self.roi.clear();
    }

    /// Flag another thread can set to stop a pipeline run at its next batch
    /// boundary. A flag raised before a run cancels that run; it is cleared
    /// once the run returns.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cache_key(&self) -> Result<String> {
        let key = match self.processed {
            Some(_) => serde_json::to_string(&self.config),
            None => serde_json::to_string(&ProcessingConfig::default()),
        };
        key.map_err(|e| MsiError::InvalidConfig(e.to_string()))
    }

    fn raw(&self) -> Result<&SpectrumSet> {
        self.dataset.as_ref().ok_or(MsiError::EmptySelection)
    }

    /// The processed set if the pipeline ran, the raw set otherwise.
    pub fn current(&self) -> Result<&SpectrumSet> {
        match &self.processed {
            Some(out) => Ok(&out.spectra),
            None => self.raw(),
        }
    }

    /// Replace the raw dataset by its centroided form.
    pub fn centroid(&mut self) -> Result<()> {
        let centroided = centroid::centroid_set(self.raw()?);
        info!("Centroided {} spectra", centroided.len());
        self.set_dataset(centroided);
        Ok(())
    }

    /// Mean spectrum over the current ROI.
    pub fn roi_mean_spectrum(&self) -> Result<MeanSpectrum> {
        if self.roi.is_empty() {
            return Err(MsiError::EmptySelection);
        }
        let binned = binning::bin_to_common_axis(self.current()?, self.bin_decimals);
        aggregate::mean_spectrum(&binned, Some(&self.roi))
    }

    pub fn ion_image(&self, mz: f64, tolerance: f64, reduce: Reduce) -> Result<IonImage> {
        Ok(aggregate::ion_image(self.current()?, mz, tolerance, reduce))
    }

    /// Spectrum of one pixel in the current set.
    pub fn spectrum_at(&self, pixel: Pixel) -> Option<&Spectrum> {
        self.current().ok()?.get(&pixel)
    }
}

impl SpectralSession for Session {
    fn load_spectra(&mut self, path: &Path) -> anyhow::Result<()> {
        let dataset = loader::load_file(path)?;
        self.set_dataset(dataset);
        Ok(())
    }

    fn run_pipeline(&mut self) -> Result<&PipelineReport> {
        let raw = self.raw()?;
        let result =
            Pipeline::new(&self.config).and_then(|p| p.run_with_cancel(raw, &self.cancel));
        self.cancel.store(false, Ordering::Relaxed);
        Ok(&self.processed.insert(result?).report)
    }

    fn mean_spectrum(&mut self) -> Result<MeanSpectrum> {
        let key = self.cache_key()?;
        if let Some(cached) = self.mean_cache.get(&key) {
            debug!("Mean spectrum '{key}' served from cache");
            return Ok(cached.clone());
        }
        let binned = binning::bin_to_common_axis(self.current()?, self.bin_decimals);
        let mean = aggregate::mean_spectrum(&binned, None)?;
        self.mean_cache.insert(key, mean.clone());
        Ok(mean)
    }

    fn roi_mask(&self) -> &RoiMask {
        &self.roi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, NormalizationMethod};

    fn dataset() -> SpectrumSet {
        [
            (
                Pixel::new(0, 0),
                Spectrum::from_pairs(&[(100.0, 1.0), (200.0, 3.0)]).unwrap(),
            ),
            (
                Pixel::new(1, 0),
                Spectrum::from_pairs(&[(100.0, 3.0), (200.0, 1.0)]).unwrap(),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn operations_need_a_dataset() {
        let mut session = Session::default();
        assert_eq!(session.mean_spectrum(), Err(MsiError::EmptySelection));
        assert!(session.run_pipeline().is_err());
    }

    #[test]
    fn mean_uses_processed_set_after_pipeline() {
        let mut session = Session::default();
        session.set_dataset(dataset());
        assert_eq!(session.mean_spectrum().unwrap().spectrum.intensity, vec![2.0, 2.0]);

        session
            .set_config(ProcessingConfig {
                normalization_method: NormalizationMethod::Tic,
                ..Default::default()
            })
            .unwrap();
        session.run_pipeline().unwrap();
        let mean = session.mean_spectrum().unwrap();
        assert_eq!(mean.spectrum.intensity, vec![0.5, 0.5]);
    }

    #[test]
    fn config_change_drops_processed_set() {
        let mut session = Session::default();
        session.set_dataset(dataset());
        session
            .set_config(ProcessingConfig {
                normalization_method: NormalizationMethod::Rms,
                ..Default::default()
            })
            .unwrap();
        session.run_pipeline().unwrap();
        assert!(session.processed().is_some());
        session.set_config(ProcessingConfig::default()).unwrap();
        assert!(session.processed().is_none());

        let bad = ProcessingConfig {
            noise_reduction_pct: -3.0,
            ..Default::default()
        };
        assert!(session.set_config(bad).is_err());
        assert_eq!(session.config(), &ProcessingConfig::default());
    }

    #[test]
    fn roi_mean_requires_selection() {
        let mut session = Session::default();
        session.set_dataset(dataset());
        assert_eq!(session.roi_mean_spectrum(), Err(MsiError::EmptySelection));

        session.roi_mut().insert(Pixel::new(1, 0));
        let mean = session.roi_mean_spectrum().unwrap();
        assert_eq!(mean.n_pixels, 1);
        assert_eq!(mean.spectrum.intensity, vec![3.0, 1.0]);
        assert_eq!(session.roi_mask().len(), 1);
    }

    #[test]
    fn mean_follows_every_config_field() {
        let spectra: SpectrumSet = [
            (
                Pixel::new(0, 0),
                Spectrum::from_pairs(&[(121.0444, 2.0), (200.0, 4.0)]).unwrap(),
            ),
            (
                Pixel::new(1, 0),
                Spectrum::from_pairs(&[(121.0494, 1.0), (200.0, 4.0)]).unwrap(),
            ),
        ]
        .into_iter()
        .collect();
        let narrow = ProcessingConfig {
            normalization_method: NormalizationMethod::ReferencePeak,
            reference_tolerance: 0.001,
            failure_policy: FailurePolicy::Exclude,
            ..Default::default()
        };
        let mut session = Session::new(narrow.clone());
        session.set_dataset(spectra);
        session.run_pipeline().unwrap();
        assert_eq!(session.mean_spectrum().unwrap().n_pixels, 1);

        session
            .set_config(ProcessingConfig {
                reference_tolerance: 0.01,
                ..narrow.clone()
            })
            .unwrap();
        session.run_pipeline().unwrap();
        assert_eq!(session.mean_spectrum().unwrap().n_pixels, 2);

        // switching back serves the first mean again
        session.set_config(narrow).unwrap();
        session.run_pipeline().unwrap();
        assert_eq!(session.mean_spectrum().unwrap().n_pixels, 1);
    }

    #[test]
    fn cancel_handle_stops_the_next_run_only() {
        let mut session = Session::default();
        session.set_dataset(dataset());
        let cancel = session.cancel_handle();

        cancel.store(true, Ordering::Relaxed);
        assert_eq!(session.run_pipeline().unwrap_err(), MsiError::Cancelled);
        assert!(session.processed().is_none());
        assert!(!cancel.load(Ordering::Relaxed));

        session.run_pipeline().unwrap();
        assert!(session.processed().is_some());
    }
}
