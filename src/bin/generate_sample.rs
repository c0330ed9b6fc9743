use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, Int64Array, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

const WIDTH: i64 = 40;
const HEIGHT: i64 = 30;

/// Reference ion present in every pixel (matches the default reference m/z).
const REFERENCE_MZ: f64 = 121.0444;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Centroided spectrum of one pixel: a reference ion, two tissue-dependent
/// lipids, and sparse chemical noise.
fn pixel_spectrum(x: i64, y: i64, rng: &mut SimpleRng) -> (Vec<f64>, Vec<f64>) {
    // circular "tissue" region in the middle of the slide
    let (cx, cy) = (WIDTH as f64 / 2.0, HEIGHT as f64 / 2.0);
    let inside = gaussian(((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt(), 0.0, 8.0, 1.0);
    // per-pixel ionisation efficiency, the reason normalization exists
    let efficiency = 0.5 + rng.next_f64();

    let mut peaks: Vec<(f64, f64)> = vec![
        (REFERENCE_MZ, 1000.0 * efficiency),
        (760.5851, 5000.0 * inside * efficiency),
        (782.5670, 2000.0 * (1.0 - inside) * efficiency),
    ];
    for _ in 0..20 {
        let mz = 100.0 + rng.next_f64() * 900.0;
        peaks.push(((mz * 1e4).round() / 1e4, 50.0 * rng.next_f64() * efficiency));
    }
    // a few saturated hotspots
    if rng.next_f64() < 0.01 {
        peaks.push((600.0, 1e6));
    }

    peaks.retain(|&(_, i)| i > 0.0);
    peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
    peaks.dedup_by(|a, b| a.0 == b.0);
    peaks.into_iter().unzip()
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut mz_builder = ListBuilder::new(Float64Builder::new());
    let mut int_builder = ListBuilder::new(Float64Builder::new());

    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let (mz, intensity) = pixel_spectrum(x, y, &mut rng);
            mz_builder.values().append_slice(&mz);
            mz_builder.append(true);
            int_builder.values().append_slice(&intensity);
            int_builder.append(true);
            xs.push(x);
            ys.push(y);
        }
    }
    let n_spectra = xs.len();

    let list = |name: &str| {
        Field::new(
            name,
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        )
    };
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Int64, false),
        list("mz"),
        list("intensity"),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(xs)),
            Arc::new(Int64Array::from(ys)),
            Arc::new(mz_builder.finish()),
            Arc::new(int_builder.finish()),
        ],
    )
    .context("building record batch")?;

    let metadata: HashMap<&str, &str> = [("polarity", "positive"), ("pixel size", "20")].into();
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(
            metadata
                .into_iter()
                .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
                .collect(),
        ))
        .build();

    let output_path = "sample_msi.parquet";
    let file = std::fs::File::create(output_path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).context("creating writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;

    info!("Wrote {n_spectra} spectra ({WIDTH}×{HEIGHT} pixels) to {output_path}");
    println!("Wrote {n_spectra} spectra to {output_path}");
    Ok(())
}
