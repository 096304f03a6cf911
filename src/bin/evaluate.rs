use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use tasknet::backend::{default_device, InferenceBackend};
use tasknet::data::{load_data, DataRequest, ImageSpec, LoaderOptions, Split};
use tasknet::model::TaskNet;
use tasknet::training::evaluate;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate saved task net weights on a test set")]
struct Args {
    /// Weights written by training, e.g. LeNet_net_mnist.pth
    #[arg(short, long)]
    weights: PathBuf,

    #[arg(short, long, default_value = "mnist")]
    data: String,

    #[arg(long, default_value = "data")]
    datadir: PathBuf,

    #[arg(short, long, default_value_t = 128)]
    batch: usize,

    /// Only used by synthetic data
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    no_download: bool,

    /// Also write the metrics as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let device = default_device();

    println!("Loading {}", args.weights.display());
    let model = TaskNet::<InferenceBackend>::load(&args.weights, &device)?;
    println!("{}", model.summary());

    let request = DataRequest {
        name: &args.data,
        split: Split::Test,
        batch: args.batch,
        rootdir: &args.datadir,
        spec: ImageSpec::new(model.num_channels(), model.image_size()),
        download: !args.no_download,
        options: LoaderOptions::detect(),
        seed: args.seed,
    };
    let mut loader = load_data::<InferenceBackend>(&request, &device)?
        .ok_or_else(|| anyhow!("dataset '{}' has no test split", args.data))?;

    println!("Evaluating {} model on {} test set", model.kind(), args.data);
    let metrics = evaluate(&mut loader, &model)?;

    if let Some(path) = args.json {
        std::fs::write(&path, serde_json::to_string_pretty(&metrics)?)?;
        log::info!("Wrote metrics to {}", path.display());
    }

    Ok(())
}
