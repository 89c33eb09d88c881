use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Write a synthetic `id,label,feat_0..feat_n` CSV dataset.
#[derive(Parser, Debug)]
#[command(about = "Generate a sample dataset for example-splitter")]
struct Args {
    /// Output CSV path.
    #[arg(long, default_value = "data/sample.csv")]
    output: PathBuf,

    /// Number of data rows (header excluded).
    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// Number of feature columns.
    #[arg(long, default_value_t = 8)]
    features: usize,

    /// PRNG seed; the same seed always produces the same file.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Every n-th row is malformed so a run exercises the failure counter.
const MALFORMED_EVERY: usize = 50;

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
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
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

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// A row whose label is a noisy linear function of its features.
fn generate_row(id: usize, weights: &[f64], rng: &mut SimpleRng) -> Vec<String> {
    let feat: Vec<f64> = weights.iter().map(|_| rng.gauss(0.0, 1.0)).collect();
    let signal: f64 = feat.iter().zip(weights).map(|(x, w)| x * w).sum();
    let label = if signal + rng.gauss(0.0, 0.1) > 0.0 { 1.0 } else { 0.0 };

    let mut row = Vec::with_capacity(feat.len() + 2);
    row.push(id.to_string());
    row.push(format!("{label:.1}"));
    row.extend(feat.iter().map(|v| format!("{v:.6}")));
    row
}

/// Cycle through the kinds of damage the splitter has to tolerate.
fn corrupt_row(row: &mut Vec<String>, id: usize) {
    match (id / MALFORMED_EVERY) % 3 {
        0 => row[1] = "n/a".to_string(),
        1 => row.truncate(1),
        _ => {
            if let Some(last) = row.last_mut() {
                last.clear();
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let weights: Vec<f64> = (0..args.features).map(|_| rng.gauss(0.0, 1.0)).collect();

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut header = vec!["id".to_string(), "label".to_string()];
    header.extend((0..args.features).map(|i| format!("feat_{i}")));
    writer.write_record(&header).context("writing header")?;

    let mut malformed = 0;
    for id in 0..args.rows {
        let mut row = generate_row(id, &weights, &mut rng);
        if id % MALFORMED_EVERY == MALFORMED_EVERY - 1 {
            corrupt_row(&mut row, id);
            malformed += 1;
        }
        writer
            .write_record(&row)
            .with_context(|| format!("writing row {id}"))?;
    }
    writer.flush().context("flushing CSV")?;

    println!(
        "Wrote {} rows ({} features, {malformed} malformed) to {}",
        args.rows,
        args.features,
        args.output.display()
    );
    Ok(())
}
