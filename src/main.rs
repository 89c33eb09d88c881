use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use example_splitter::config::{Config, OutputFormat};
use example_splitter::pipeline;

/// Split a delimited `id,label,feat...` dataset into train/validation/test
/// example files.
#[derive(Parser, Debug)]
#[command(name = "example-splitter")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The project to which the job is attributed in cloud mode.
    #[arg(long)]
    project_id: Option<String>,

    /// Run as a staged job on a worker pool instead of sequentially.
    #[arg(long)]
    cloud: bool,

    /// Run sequentially even if the configuration file enables cloud mode.
    #[arg(long, conflicts_with = "cloud")]
    local: bool,

    /// Local directory in which to place outputs.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Input file, directory or glob pattern.
    #[arg(long)]
    input: Option<String>,

    /// Serialization of the output files.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Number of files written per bucket.
    #[arg(long)]
    num_shards: Option<usize>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(project_id) = self.project_id {
            config.project_id = Some(project_id);
        }
        if self.cloud {
            config.cloud = true;
        } else if self.local {
            config.cloud = false;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(num_shards) = self.num_shards {
            config.num_shards = num_shards;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);

    info!("Reading {} into {}", config.input, config.output_dir.display());
    let summary = pipeline::run(&config).context("preprocessing failed")?;

    for file in &summary.files {
        println!("{:>10} {}", file.records, file.path.display());
    }
    println!("{}", summary.counters);
    Ok(())
}
