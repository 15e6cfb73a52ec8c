use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cond_dataset::{CondDataset, CondModality, IndexSource, Split};
use cond_tools::{init_logging, ToolConfig};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "cond_index",
    about = "Build or refresh the sidecar path index for a dataset split"
)]
struct Args {
    /// Tools config (defaults to $COND_TOOLS_CONFIG or ./cond-tools.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dataset root; overrides `dataset_root` from the config.
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long, default_value = "train")]
    split: Split,
    /// Condition modality to index; overrides the config for this split.
    #[arg(long)]
    modality: Option<CondModality>,
    /// Ignore an existing sidecar and rebuild it.
    #[arg(long, default_value_t = false)]
    rebuild: bool,
    /// Only probe files smaller than this many bytes.
    #[arg(long)]
    probe_size_limit: Option<u64>,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    /// Print the dataset summary as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let tools = ToolConfig::load_from(args.config.as_deref());
    init_logging(&tools.log_filter)?;

    let mut cfg = tools.dataset_config(args.root.as_deref(), args.split);
    if let Some(m) = args.modality {
        match args.split {
            Split::Train => cfg.train_modality = m,
            Split::Val => cfg.val_modality = m,
        }
    }
    if args.probe_size_limit.is_some() {
        cfg.probe_size_limit = args.probe_size_limit;
    }
    cfg.rebuild_index = args.rebuild;
    cfg.show_progress = tools.show_progress && !args.no_progress;
    debug!("resolved dataset config: {cfg:?}");

    let root = cfg.root.clone();
    let ds = CondDataset::new(cfg)
        .with_context(|| format!("index {} split under {}", args.split, root.display()))?;

    let summary = ds.summary();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    match ds.index_source() {
        IndexSource::Cache => println!("Index loaded from sidecar (use --rebuild to refresh)"),
        IndexSource::Rebuilt { reason, summary } => println!(
            "Index rebuilt ({:?}): {} candidates, {} probed, {} kept, {} dropped",
            reason,
            summary.total,
            summary.probed,
            summary.kept,
            summary.dropped.len()
        ),
    }
    println!(
        "{} {} samples: {} across {} classes ({} unclassified)",
        summary.split, summary.modality, summary.total, summary.num_classes, summary.unclassified
    );
    Ok(())
}
