mod cli;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use msi_explorer::annotation::{self, Database};
use msi_explorer::color::ColorMap;
use msi_explorer::data::{export, loader};
use msi_explorer::{MeanSpectrum, Session, SpectralSession};

use cli::{Cli, Command, InputArgs};

/// Load, optionally centroid, and pre-process the input of a data command.
fn prepare(input: &InputArgs) -> Result<Session> {
    let config = input.processing_config()?;
    let mut session = Session::new(config);
    session.set_bin_decimals(input.bin_decimals);
    session.load_spectra(&input.input)?;
    if input.centroid {
        session.centroid()?;
    }
    if let Some(roi) = &input.roi {
        session.set_roi(roi.clone());
    }

    let report = session.run_pipeline().context("pre-processing")?;
    if !report.excluded.is_empty() {
        warn!("{} pixel(s) excluded from the result", report.excluded.len());
    }
    if let Some(limit) = report.hotspot_threshold {
        info!("Hotspot threshold: {limit}");
    }
    Ok(session)
}

fn mean_of(session: &mut Session) -> Result<MeanSpectrum> {
    let mean = if session.roi_mask().is_empty() {
        session.mean_spectrum()?
    } else {
        session.roi_mean_spectrum()?
    };
    info!(
        "Mean spectrum over {} pixels, {} m/z bins",
        mean.n_pixels,
        mean.spectrum.len()
    );
    Ok(mean)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            input,
            output,
            range,
        } => {
            let mut session = prepare(&input)?;
            let mean = mean_of(&mut session)?;
            let range = range.map(|r| (r[0], r[1]));
            export::save_spectrum_csv(&output, &mean.spectrum, range)?;
        }
        Command::IonImage {
            input,
            mz,
            tolerance,
            reduce,
            cmap,
            output,
        } => {
            let cmap = ColorMap::by_name(&cmap)
                .with_context(|| format!("unknown colour map '{cmap}'"))?;
            let session = prepare(&input)?;
            let image = session.ion_image(mz, tolerance, reduce)?;
            export::save_ion_image(&output, &image, &cmap)?;
        }
        Command::Annotate {
            input,
            databases,
            tolerance,
            output,
        } => {
            let db = Database::from_csv_files(&databases)?;
            let mut session = prepare(&input)?;
            let mean = mean_of(&mut session)?;
            let hits = db.annotate(&mean.spectrum, tolerance);
            info!("{} annotations", hits.len());

            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };
            let mut csv = csv::Writer::from_writer(sink);
            csv.write_record(["peak_mz", "intensity", "exact_mass", "name", "formula", "error"])?;
            for hit in &hits {
                csv.serialize((
                    hit.peak_mz,
                    hit.intensity,
                    hit.entry.exact_mass,
                    &hit.entry.name,
                    &hit.entry.formula,
                    hit.error,
                ))?;
            }
            csv.flush()?;
        }
        Command::Metadata {
            input,
            entries,
            output,
        } => {
            let mut set = loader::load_file(&input)?;
            for (key, value) in entries {
                set.set_metadata(&key, value);
            }
            match &output {
                Some(path) => export::save_metadata_csv(path, &set.metadata)?,
                None => export::write_metadata_csv(std::io::stdout().lock(), &set.metadata)?,
            }
        }
        Command::TemplateDb { path } => annotation::write_template(&path)?,
    }
    Ok(())
}
