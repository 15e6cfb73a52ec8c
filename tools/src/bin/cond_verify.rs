use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cond_dataset::index::{read_sidecar, write_sidecar};
use cond_dataset::{sidecar_path, verify_paths, CondModality, Split};
use cond_tools::{init_logging, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    name = "cond_verify",
    about = "Re-open every path in an existing sidecar index and report failures"
)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long, default_value = "train")]
    split: Split,
    #[arg(long)]
    modality: Option<CondModality>,
    /// Rewrite the sidecar without the failing paths.
    #[arg(long, default_value_t = false)]
    prune: bool,
    /// Exit with an error if any path fails.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let tools = ToolConfig::load_from(args.config.as_deref());
    init_logging(&tools.log_filter)?;

    let cfg = tools.dataset_config(args.root.as_deref(), args.split);
    let modality = args.modality.unwrap_or_else(|| cfg.active_modality());
    let sidecar = sidecar_path(&cfg.root, args.split, modality);
    let mut entries =
        read_sidecar(&sidecar).with_context(|| format!("read sidecar {}", sidecar.display()))?;
    let Some(paths) = entries.remove(modality.as_str()) else {
        bail!("{} has no {:?} entry", sidecar.display(), modality.as_str());
    };

    let summary = verify_paths(&paths, modality, cfg.mask_canvas, tools.show_progress);
    for path in &summary.dropped {
        println!("{}", path.display());
    }
    println!(
        "Verify complete: {} paths, {} ok, {} failed",
        summary.total,
        summary.kept,
        summary.dropped.len()
    );

    if args.prune && !summary.is_clean() {
        let kept = summary.without_dropped(paths);
        write_sidecar(&sidecar, modality, &kept)
            .with_context(|| format!("rewrite sidecar {}", sidecar.display()))?;
        println!("Pruned sidecar now lists {} paths", kept.len());
    }
    if args.strict && !summary.is_clean() {
        bail!("{} paths failed verification", summary.dropped.len());
    }
    Ok(())
}
