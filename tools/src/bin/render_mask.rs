use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cond_dataset::{color_map, load_annotations, render_annotations, ANNOTATION_CANVAS};
use cond_tools::{init_logging, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    name = "render_mask",
    about = "Render a mask annotation JSON file to a PNG preview"
)]
struct Args {
    /// Annotation file (JSON array of {segmentation, area}).
    #[arg(long)]
    input: PathBuf,
    /// Output image; defaults to the input path with a .png extension.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = ANNOTATION_CANVAS)]
    canvas: u32,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let tools = ToolConfig::load_from(args.config.as_deref());
    init_logging(&tools.log_filter)?;

    let anns = load_annotations(&args.input)
        .with_context(|| format!("load annotations {}", args.input.display()))?;
    let mask = render_annotations(&anns, args.canvas, color_map())
        .with_context(|| format!("render {}", args.input.display()))?;

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("png"));
    mask.save(&output)
        .with_context(|| format!("write {}", output.display()))?;
    println!(
        "Rendered {} annotations to {} ({}x{})",
        anns.len(),
        output.display(),
        args.canvas,
        args.canvas
    );
    Ok(())
}
