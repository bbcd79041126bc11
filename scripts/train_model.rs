use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use newsblink::{
    app::ComponentRegistry,
    config::{Config, EmbedderKind},
};

struct TrainArgs {
    dataset: PathBuf,
    model: PathBuf,
    mapping: PathBuf,
    clusters: NonZeroUsize,
    embedder: EmbedderKind,
    hashing_dim: Option<NonZeroUsize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    if !args.dataset.exists() {
        bail!("dataset {} does not exist", args.dataset.display());
    }

    let mut config = Config::with_paths(&args.dataset, &args.model, &args.mapping)
        .with_n_clusters(args.clusters)
        .with_embedder(args.embedder);
    if let Some(dim) = args.hashing_dim {
        config = config.with_hashing_dim(dim);
    }

    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;
    let snapshot = registry
        .orchestrator()
        .retrain_from_dataset()
        .await
        .context("training failed; existing artifacts were left untouched")?;

    println!(
        "trained {} samples into {} clusters (revision {})",
        snapshot.model.sample_count(),
        snapshot.model.n_clusters(),
        snapshot.model.metadata.revision
    );
    for (cluster, size) in snapshot.model.cluster_sizes().into_iter().enumerate() {
        println!(
            "  cluster {cluster:>2}: {size:>5} samples -> {}",
            snapshot.category_name(cluster)
        );
    }
    println!("model written to {}", args.model.display());
    println!("category mapping written to {}", args.mapping.display());
    Ok(())
}

fn parse_args() -> Result<TrainArgs> {
    let mut dataset = None;
    let mut model = None;
    let mut mapping = None;
    let mut clusters = None;
    let mut embedder = None;
    let mut hashing_dim = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dataset" => {
                let value = args.next().context("--dataset requires a path argument")?;
                dataset = Some(PathBuf::from(value));
            }
            "--model" => {
                let value = args.next().context("--model requires a path argument")?;
                model = Some(PathBuf::from(value));
            }
            "--mapping" => {
                let value = args.next().context("--mapping requires a path argument")?;
                mapping = Some(PathBuf::from(value));
            }
            "--clusters" => {
                let value = args.next().context("--clusters requires a count")?;
                let parsed = value
                    .parse::<NonZeroUsize>()
                    .context("--clusters must be a positive integer")?;
                clusters = Some(parsed);
            }
            "--embedder" => {
                let value = args.next().context("--embedder requires bert or hashing")?;
                embedder = Some(value.parse::<EmbedderKind>()?);
            }
            "--hashing-dim" => {
                let value = args.next().context("--hashing-dim requires a dimension")?;
                let parsed = value
                    .parse::<NonZeroUsize>()
                    .context("--hashing-dim must be a positive integer")?;
                hashing_dim = Some(parsed);
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }

    let dataset = dataset.ok_or_else(|| anyhow!("--dataset is required"))?;
    let model = model.unwrap_or_else(|| PathBuf::from("models/agnes_model.json"));
    let mapping =
        mapping.unwrap_or_else(|| PathBuf::from("models/cluster_category_mapping.json"));
    let clusters = clusters.unwrap_or(NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN));
    // 次元指定だけ渡された場合はハッシング埋め込みとみなす
    let embedder = embedder.unwrap_or(if hashing_dim.is_some() {
        EmbedderKind::Hashing
    } else {
        EmbedderKind::Bert
    });

    Ok(TrainArgs {
        dataset,
        model,
        mapping,
        clusters,
        embedder,
        hashing_dim,
    })
}

fn print_usage() {
    eprintln!(
        "Usage: train_model --dataset <path> [--model <path>] [--mapping <path>] [--clusters 8] [--embedder bert|hashing] [--hashing-dim 384]"
    );
}
