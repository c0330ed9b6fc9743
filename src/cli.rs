use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use msi_explorer::processing::aggregate::Reduce;
use msi_explorer::processing::binning::DEFAULT_DECIMALS;
use msi_explorer::{
    FailurePolicy, HotspotMode, HotspotThreshold, MetadataValue, NormalizationMethod, Pixel,
    ProcessingConfig, RoiMask,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pre-process a dataset and export its mean spectrum
    Process {
        #[command(flatten)]
        input: InputArgs,

        /// Mean spectrum output (.csv)
        #[arg(short, long)]
        output: PathBuf,

        /// Only export m/z values within LOW HIGH
        #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
        range: Option<Vec<f64>>,
    },

    /// Pre-process a dataset and export the ion image of one m/z window
    IonImage {
        #[command(flatten)]
        input: InputArgs,

        /// Target m/z
        #[arg(long)]
        mz: f64,

        /// Half-width of the m/z window
        #[arg(long, default_value_t = 0.1)]
        tolerance: f64,

        /// How intensities inside the window are combined (sum, max, mean)
        #[arg(long, default_value = "sum")]
        reduce: Reduce,

        /// Colour map for PNG output (inferno, grey)
        #[arg(long, default_value = "inferno")]
        cmap: String,

        /// Ion image output (.png or .csv)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Pre-process a dataset and match its mean spectrum against databases
    Annotate {
        #[command(flatten)]
        input: InputArgs,

        /// Database CSV file(s): exact_mass,name,formula
        #[arg(long = "db", required = true)]
        databases: Vec<PathBuf>,

        /// m/z matching tolerance
        #[arg(long, default_value_t = 0.01)]
        tolerance: f64,

        /// Annotation table output (.csv); printed when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show, edit and export the acquisition metadata of a dataset
    Metadata {
        /// Spectrum set (.parquet, .json or .csv)
        input: PathBuf,

        /// Add or replace an entry; an empty VALUE removes it
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        entries: Vec<(String, MetadataValue)>,

        /// Metadata output (.csv); printed when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write an empty metabolite database with the expected header
    TemplateDb {
        /// Path of the new database file
        path: PathBuf,
    },
}

/// Dataset and pre-processing options shared by all data commands.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Spectrum set (.parquet, .json or .csv)
    pub input: PathBuf,

    /// Path to the JSON configuration file (flags below over-write it)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Remove peaks below this percentage of each spectrum maximum
    #[arg(long)]
    pub noise: Option<f64>,

    /// Normalization method (none, tic, rms, median, reference_peak)
    #[arg(long)]
    pub normalize: Option<NormalizationMethod>,

    /// m/z of the reference peak
    #[arg(long)]
    pub reference_mz: Option<f64>,

    /// m/z tolerance of the reference peak lookup
    #[arg(long)]
    pub reference_tolerance: Option<f64>,

    /// Hotspot removal mode (none, clip, rescale)
    #[arg(long)]
    pub hotspot: Option<HotspotMode>,

    /// Hotspot threshold as mean + K * stddev of spectrum maxima
    #[arg(long, value_name = "K", conflicts_with = "hotspot_percentile")]
    pub hotspot_sigma: Option<f64>,

    /// Hotspot threshold as the P-th percentile of all intensities
    #[arg(long, value_name = "P")]
    pub hotspot_percentile: Option<f64>,

    /// What to do with pixels that fail pre-processing (abort, exclude)
    #[arg(long)]
    pub on_failure: Option<FailurePolicy>,

    /// Convert profile spectra to centroid spectra before pre-processing
    #[arg(long)]
    pub centroid: bool,

    /// Restrict aggregation to the rectangle X0,Y0,X1,Y1
    #[arg(long, value_parser = parse_rect)]
    pub roi: Option<RoiMask>,

    /// Decimal places of the common m/z axis of mean spectra
    #[arg(long, default_value_t = DEFAULT_DECIMALS)]
    pub bin_decimals: u32,
}

impl InputArgs {
    /// Config file (or defaults) with command line overrides applied.
    pub fn processing_config(&self) -> Result<ProcessingConfig> {
        let mut config = match &self.config {
            Some(path) => ProcessingConfig::from_json_file(path)?,
            None => ProcessingConfig::default(),
        };
        if let Some(pct) = self.noise {
            config.noise_reduction_pct = pct;
        }
        if let Some(method) = self.normalize {
            config.normalization_method = method;
        }
        if let Some(mz) = self.reference_mz {
            config.reference_peak_mz = Some(mz);
        }
        if let Some(tol) = self.reference_tolerance {
            config.reference_tolerance = tol;
        }
        if let Some(mode) = self.hotspot {
            config.hotspot_removal = mode;
        }
        if let Some(k) = self.hotspot_sigma {
            config.hotspot_threshold = HotspotThreshold::Sigma(k);
        }
        if let Some(p) = self.hotspot_percentile {
            config.hotspot_threshold = HotspotThreshold::Percentile(p);
        }
        if let Some(policy) = self.on_failure {
            config.failure_policy = policy;
        }
        config.validate().context("validating configuration")?;
        Ok(config)
    }
}

fn parse_key_value(s: &str) -> Result<(String, MetadataValue), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), MetadataValue::parse(value)))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn parse_rect(s: &str) -> Result<RoiMask, String> {
    let coords: Vec<u32> = s
        .split(',')
        .map(|t| t.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid coordinate in '{s}': {e}"))?;
    match coords.as_slice() {
        &[x0, y0, x1, y1] => Ok(RoiMask::rectangle(Pixel::new(x0, y0), Pixel::new(x1, y1))),
        _ => Err(format!("expected X0,Y0,X1,Y1, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "msi-explorer",
            "process",
            "data.json",
            "--noise",
            "5",
            "--normalize",
            "tic",
            "--hotspot",
            "clip",
            "--hotspot-percentile",
            "99",
            "--roi",
            "0,0,1,1",
            "-o",
            "mean.csv",
        ])
        .unwrap();
        let Command::Process { input, .. } = cli.command else {
            panic!("expected process");
        };
        let config = input.processing_config().unwrap();
        assert_eq!(config.noise_reduction_pct, 5.0);
        assert_eq!(config.normalization_method, NormalizationMethod::Tic);
        assert_eq!(config.hotspot_removal, HotspotMode::Clip);
        assert_eq!(config.hotspot_threshold, HotspotThreshold::Percentile(99.0));
        assert_eq!(input.roi.unwrap().len(), 4);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Cli::try_parse_from(["msi-explorer", "process", "d.json", "--normalize", "zscore", "-o", "m.csv"]).is_err());
        assert!(parse_rect("1,2,3").is_err());

        let cli = Cli::try_parse_from(["msi-explorer", "process", "d.json", "--noise", "150", "-o", "m.csv"]).unwrap();
        let Command::Process { input, .. } = cli.command else {
            panic!("expected process");
        };
        assert!(input.processing_config().is_err());
    }

    #[test]
    fn metadata_entries_parse() {
        let cli = Cli::try_parse_from([
            "msi-explorer",
            "metadata",
            "data.json",
            "--set",
            "pixel size=20",
            "--set",
            "comment=",
        ])
        .unwrap();
        let Command::Metadata { entries, output, .. } = cli.command else {
            panic!("expected metadata");
        };
        assert_eq!(
            entries,
            vec![
                ("pixel size".to_string(), MetadataValue::Integer(20)),
                ("comment".to_string(), MetadataValue::Null),
            ]
        );
        assert!(output.is_none());
        assert!(parse_key_value("=5").is_err());
        assert!(parse_key_value("novalue").is_err());
    }
}
