use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MsiError, Result};

/// Reference m/z used when the config does not name one.
pub const DEFAULT_REFERENCE_MZ: f64 = 121.0444;
pub const DEFAULT_REFERENCE_TOLERANCE: f64 = 0.003;
pub const DEFAULT_HOTSPOT_SIGMA: f64 = 3.0;
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    #[default]
    None,
    Tic,
    Rms,
    Median,
    ReferencePeak,
}

impl FromStr for NormalizationMethod {
    type Err = MsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "original" => Ok(NormalizationMethod::None),
            "tic" => Ok(NormalizationMethod::Tic),
            "rms" => Ok(NormalizationMethod::Rms),
            "median" => Ok(NormalizationMethod::Median),
            "reference_peak" | "reference-peak" | "peak" => Ok(NormalizationMethod::ReferencePeak),
            other => Err(MsiError::InvalidConfig(format!(
                "unknown normalization method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NormalizationMethod::None => "none",
            NormalizationMethod::Tic => "tic",
            NormalizationMethod::Rms => "rms",
            NormalizationMethod::Median => "median",
            NormalizationMethod::ReferencePeak => "reference_peak",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotspotMode {
    #[default]
    None,
    /// Cap offending intensities at the threshold.
    Clip,
    /// Scale the whole offending spectrum down to the threshold.
    Rescale,
}

impl FromStr for HotspotMode {
    type Err = MsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(HotspotMode::None),
            "clip" => Ok(HotspotMode::Clip),
            "rescale" => Ok(HotspotMode::Rescale),
            other => Err(MsiError::InvalidConfig(format!(
                "unknown hotspot removal mode '{other}'"
            ))),
        }
    }
}

/// Statistic the hotspot threshold is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotspotThreshold {
    /// `mean + k * stddev` of the per-spectrum maxima.
    Sigma(f64),
    /// The given percentile of all non-zero intensities in the set.
    Percentile(f64),
}

impl Default for HotspotThreshold {
    fn default() -> Self {
        HotspotThreshold::Sigma(DEFAULT_HOTSPOT_SIGMA)
    }
}

/// What the pipeline does with a pixel whose stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole run, naming the pixel.
    #[default]
    Abort,
    /// Drop the pixel from the output and record it in the report.
    Exclude,
}

impl FromStr for FailurePolicy {
    type Err = MsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "exclude" => Ok(FailurePolicy::Exclude),
            other => Err(MsiError::InvalidConfig(format!(
                "unknown failure policy '{other}'"
            ))),
        }
    }
}

/// Pre-processing parameters for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Peaks below this percentage of the spectrum maximum are dropped.
    pub noise_reduction_pct: f64,
    pub normalization_method: NormalizationMethod,
    pub reference_peak_mz: Option<f64>,
    pub reference_tolerance: f64,
    pub hotspot_removal: HotspotMode,
    pub hotspot_threshold: HotspotThreshold,
    pub failure_policy: FailurePolicy,
    /// Pixels processed between two cancellation checks.
    pub batch_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            noise_reduction_pct: 0.0,
            normalization_method: NormalizationMethod::None,
            reference_peak_mz: None,
            reference_tolerance: DEFAULT_REFERENCE_TOLERANCE,
            hotspot_removal: HotspotMode::None,
            hotspot_threshold: HotspotThreshold::default(),
            failure_policy: FailurePolicy::Abort,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ProcessingConfig {
    /// Read a JSON config file. Unknown keys or values are `InvalidConfig`.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Ok(Self::from_json_str(&text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| MsiError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn reference_mz(&self) -> f64 {
        self.reference_peak_mz.unwrap_or(DEFAULT_REFERENCE_MZ)
    }

    /// True when every stage is disabled.
    pub fn is_identity(&self) -> bool {
        self.noise_reduction_pct == 0.0
            && self.normalization_method == NormalizationMethod::None
            && self.hotspot_removal == HotspotMode::None
    }

    /// Short label naming the result of this config, e.g. `"tic"` or
    /// `"reference_peak 121.0444"`.
    pub fn label(&self) -> String {
        let mut label = match self.normalization_method {
            NormalizationMethod::None => "original".to_string(),
            NormalizationMethod::ReferencePeak => {
                format!("reference_peak {}", self.reference_mz())
            }
            other => other.to_string(),
        };
        if self.noise_reduction_pct > 0.0 {
            label.push_str(&format!(" noise>{}%", self.noise_reduction_pct));
        }
        match (self.hotspot_removal, self.hotspot_threshold) {
            (HotspotMode::None, _) => {}
            (mode, HotspotThreshold::Sigma(k)) => label.push_str(&format!(" {mode:?}@{k}σ")),
            (mode, HotspotThreshold::Percentile(p)) => {
                label.push_str(&format!(" {mode:?}@p{p}"))
            }
        }
        label
    }

    /// Check every parameter. Runs once, before any per-pixel work.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MsiError::InvalidConfig(msg));

        if !(0.0..=100.0).contains(&self.noise_reduction_pct) {
            return invalid(format!(
                "noise_reduction_pct must be within [0, 100], got {}",
                self.noise_reduction_pct
            ));
        }
        if self.normalization_method == NormalizationMethod::ReferencePeak {
            let mz = self.reference_mz();
            if !mz.is_finite() || mz <= 0.0 {
                return invalid(format!("reference_peak_mz must be positive, got {mz}"));
            }
            if !self.reference_tolerance.is_finite() || self.reference_tolerance <= 0.0 {
                return invalid(format!(
                    "reference_tolerance must be positive, got {}",
                    self.reference_tolerance
                ));
            }
        }
        if self.hotspot_removal != HotspotMode::None {
            match self.hotspot_threshold {
                HotspotThreshold::Sigma(k) if !k.is_finite() || k < 0.0 => {
                    return invalid(format!("hotspot sigma must be >= 0, got {k}"));
                }
                HotspotThreshold::Percentile(p) if !(p > 0.0 && p <= 100.0) => {
                    return invalid(format!("hotspot percentile must be within (0, 100], got {p}"));
                }
                _ => {}
            }
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}
