use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use newsblink::{evaluation::ClusteringQuality, model::ArtifactPaths};

const PREVIEW_LABELS: usize = 10;

fn main() -> Result<()> {
    let (model_path, mapping_path) = parse_args()?;
    let paths = ArtifactPaths::new(&model_path, &mapping_path);
    let (model, mapping) = paths
        .load()
        .with_context(|| format!("failed to load artifacts from {}", model_path.display()))?
        .ok_or_else(|| anyhow!("model {} does not exist", model_path.display()))?;

    println!("model: {}", model_path.display());
    println!("  revision:   {}", model.metadata.revision);
    println!("  trained at: {}", model.metadata.trained_at.to_rfc3339());
    println!("  embedder:   {}", model.metadata.embedder);
    println!("  samples:    {}", model.sample_count());
    println!("  dimension:  {}", model.dimension().unwrap_or_default());
    println!("  clusters:   {}", model.n_clusters());
    for (cluster, size) in model.cluster_sizes().into_iter().enumerate() {
        println!(
            "    {cluster:>2}: {size:>5} samples -> {}",
            mapping.category_name(cluster)
        );
    }
    let preview: Vec<String> = model
        .labels
        .iter()
        .take(PREVIEW_LABELS)
        .map(ToString::to_string)
        .collect();
    println!("  first labels: [{}]", preview.join(", "));

    if mapping.is_empty() {
        println!("category mapping: none (all clusters report Unknown)");
    } else {
        println!("category mapping: {}", mapping_path.display());
        println!("{}", serde_json::to_string_pretty(&mapping.clusters)?);
    }

    let quality = ClusteringQuality::of(&model);
    println!("non-empty clusters: {}", quality.non_empty_clusters);
    match quality.silhouette {
        Some(score) => println!("silhouette score: {score:.4}"),
        None => println!("silhouette score: n/a"),
    }
    match quality.davies_bouldin {
        Some(score) => println!("davies-bouldin index: {score:.4}"),
        None => println!("davies-bouldin index: n/a"),
    }
    Ok(())
}

fn parse_args() -> Result<(PathBuf, PathBuf)> {
    let mut model = None;
    let mut mapping = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--model" => {
                let value = args.next().context("--model requires a path argument")?;
                model = Some(PathBuf::from(value));
            }
            "--mapping" => {
                let value = args.next().context("--mapping requires a path argument")?;
                mapping = Some(PathBuf::from(value));
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

    let model = model.unwrap_or_else(|| PathBuf::from("models/agnes_model.json"));
    let mapping = mapping.unwrap_or_else(|| {
        model
            .parent()
            .map(|dir| dir.join("cluster_category_mapping.json"))
            .unwrap_or_else(|| PathBuf::from("cluster_category_mapping.json"))
    });
    Ok((model, mapping))
}

fn print_usage() {
    eprintln!("Usage: inspect_model [--model <path>] [--mapping <path>]");
}
