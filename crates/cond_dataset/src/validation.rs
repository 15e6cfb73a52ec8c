//! Condition-file probing: decide which indexed files are actually loadable.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::colormap::color_map;
use crate::render::render_annotation_file_checked;
use crate::types::{CondModality, DatasetError, DatasetResult};

/// How a probe pass treats the candidate list.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub modality: CondModality,
    /// Canvas used when rendering mask annotations.
    pub mask_canvas: u32,
    /// Only probe files strictly smaller than this many bytes; larger files
    /// are kept without decoding. `None` probes everything.
    pub size_limit: Option<u64>,
    pub progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub total: usize,
    pub probed: usize,
    pub kept: usize,
    pub dropped: Vec<PathBuf>,
}

impl ProbeSummary {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }

    /// `paths` minus every dropped entry, order preserved.
    pub fn without_dropped(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        if self.dropped.is_empty() {
            return paths;
        }
        let dropped: HashSet<&Path> = self.dropped.iter().map(PathBuf::as_path).collect();
        paths
            .into_iter()
            .filter(|p| !dropped.contains(p.as_path()))
            .collect()
    }
}

/// Open `path` the way the sample accessor would. Mask annotations are parsed
/// and rendered; everything else is decoded as an image.
pub fn probe_condition(path: &Path, modality: CondModality, mask_canvas: u32) -> DatasetResult<()> {
    if modality.is_annotation() {
        render_annotation_file_checked(path, mask_canvas, color_map())?;
    } else {
        image::open(path).map_err(|e| DatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Return the subset of `candidates` that probe cleanly, in order.
///
/// Failures are logged and recorded in the summary, never returned as errors.
/// `candidates` itself is left untouched.
pub fn filter_loadable(candidates: &[PathBuf], opts: &ProbeOptions) -> (Vec<PathBuf>, ProbeSummary) {
    let pb = progress_bar(candidates.len(), opts.progress);
    let mut kept = Vec::with_capacity(candidates.len());
    let mut summary = ProbeSummary {
        total: candidates.len(),
        ..Default::default()
    };

    for path in candidates {
        pb.inc(1);
        if let Some(limit) = opts.size_limit {
            match fs::metadata(path) {
                Ok(meta) if meta.len() >= limit => {
                    kept.push(path.clone());
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("dropping {}: {e}", path.display());
                    summary.dropped.push(path.clone());
                    continue;
                }
            }
        }
        summary.probed += 1;
        match probe_condition(path, opts.modality, opts.mask_canvas) {
            Ok(()) => kept.push(path.clone()),
            Err(e) => {
                warn!("dropping {}: {e}", path.display());
                summary.dropped.push(path.clone());
            }
        }
    }
    pb.finish_and_clear();

    summary.kept = kept.len();
    debug!(
        "probe: {} candidates, {} probed, {} kept, {} dropped",
        summary.total,
        summary.probed,
        summary.kept,
        summary.dropped.len()
    );
    (kept, summary)
}

/// Re-probe every path of an existing index and report the failures.
pub fn verify_paths(paths: &[PathBuf], modality: CondModality, mask_canvas: u32, progress: bool) -> ProbeSummary {
    let opts = ProbeOptions {
        modality,
        mask_canvas,
        size_limit: None,
        progress,
    };
    filter_loadable(paths, &opts).1
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn opts(size_limit: Option<u64>) -> ProbeOptions {
        ProbeOptions {
            modality: CondModality::Depth,
            mask_canvas: 512,
            size_limit,
            progress: false,
        }
    }

    #[test]
    fn corrupt_files_are_dropped_not_fatal() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let good = tmp.path().join("a.jpeg");
        let bad = tmp.path().join("b.jpeg");
        let good2 = tmp.path().join("c.jpeg");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(&good)?;
        fs::write(&bad, b"not a jpeg")?;
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&good2)?;

        // Adjacent good files on both sides of the bad one must survive.
        let candidates = vec![good.clone(), bad.clone(), good2.clone()];
        let (kept, summary) = filter_loadable(&candidates, &opts(None));
        assert_eq!(kept, vec![good, good2]);
        assert_eq!(summary.dropped, vec![bad]);
        assert_eq!(summary.probed, 3);
        assert_eq!(candidates.len(), 3);
        Ok(())
    }

    #[test]
    fn size_limit_skips_large_files() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let big_garbage = tmp.path().join("big.jpeg");
        fs::write(&big_garbage, vec![7u8; 4096])?;
        let small_garbage = tmp.path().join("small.jpeg");
        fs::write(&small_garbage, b"tiny")?;

        let candidates = vec![big_garbage.clone(), small_garbage.clone()];
        let (kept, summary) = filter_loadable(&candidates, &opts(Some(1000)));
        assert_eq!(kept, vec![big_garbage]);
        assert_eq!(summary.probed, 1);
        assert_eq!(summary.dropped, vec![small_garbage]);
        Ok(())
    }

    #[test]
    fn without_dropped_keeps_order() {
        let summary = ProbeSummary {
            total: 4,
            probed: 4,
            kept: 2,
            dropped: vec![PathBuf::from("b"), PathBuf::from("d")],
        };
        let paths = ["a", "b", "c", "d"].map(PathBuf::from).to_vec();
        assert_eq!(
            summary.without_dropped(paths),
            vec![PathBuf::from("a"), PathBuf::from("c")]
        );
    }

    #[test]
    fn missing_file_fails_verification() {
        let summary = verify_paths(&[PathBuf::from("/no/such/file.jpeg")], CondModality::Depth, 512, false);
        assert!(!summary.is_clean());
        assert_eq!(summary.kept, 0);
    }

    #[test]
    fn mask_probe_parses_annotations() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let ok = tmp.path().join("ok.json");
        fs::write(&ok, "[]")?;
        let broken = tmp.path().join("broken.json");
        fs::write(&broken, "[{\"area\": 10}]")?;
        assert!(probe_condition(&ok, CondModality::Mask, 512).is_ok());
        assert!(matches!(
            probe_condition(&broken, CondModality::Mask, 512),
            Err(DatasetError::Json { .. })
        ));
        Ok(())
    }
}
