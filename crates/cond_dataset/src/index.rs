//! Condition path index: discovery, probing, and the sidecar JSON cache.
//!
//! The sidecar `root/{split}_cond_info_{modality}.json` holds
//! `{"<modality>": [path, ...]}`. Whether it is used or rebuilt is an explicit
//! [`CacheState`] decision made by [`inspect_cache`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::validation::{filter_loadable, ProbeOptions, ProbeSummary};
use crate::types::{CondModality, DatasetError, DatasetResult, Split};

pub fn sidecar_path(root: &Path, split: Split, modality: CondModality) -> PathBuf {
    root.join(format!("{split}_cond_info_{modality}.json"))
}

/// `root/{split}_{modality}`, the tree holding condition files.
pub fn condition_dir(root: &Path, split: Split, modality: CondModality) -> PathBuf {
    root.join(format!("{split}_{modality}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Absent,
    Unreadable(String),
    MissingKey,
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// Sidecar is present and readable; its paths are trusted as-is.
    Fresh(Vec<PathBuf>),
    /// Sidecar must be rebuilt from the condition tree.
    Stale(StaleReason),
}

pub fn inspect_cache(sidecar: &Path, modality: CondModality, force_rebuild: bool) -> CacheState {
    if force_rebuild {
        return CacheState::Stale(StaleReason::Forced);
    }
    if !sidecar.exists() {
        return CacheState::Stale(StaleReason::Absent);
    }
    match read_sidecar(sidecar) {
        Ok(mut entries) => match entries.remove(modality.as_str()) {
            Some(paths) => CacheState::Fresh(paths),
            None => CacheState::Stale(StaleReason::MissingKey),
        },
        Err(e) => CacheState::Stale(StaleReason::Unreadable(e.to_string())),
    }
}

pub fn read_sidecar(path: &Path) -> DatasetResult<BTreeMap<String, Vec<PathBuf>>> {
    let raw = fs::read(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn write_sidecar(path: &Path, modality: CondModality, paths: &[PathBuf]) -> DatasetResult<()> {
    let mut entries = BTreeMap::new();
    entries.insert(modality.as_str(), paths);
    let json = serde_json::to_vec(&entries).map_err(|e| DatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, json).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Every `{split}_{modality}/<class>/<file>.<ext>` under `root`, sorted.
pub fn discover_condition_paths(
    root: &Path,
    split: Split,
    modality: CondModality,
) -> DatasetResult<Vec<PathBuf>> {
    let dir = condition_dir(root, split, modality);
    if !dir.is_dir() {
        return Err(DatasetError::Io {
            path: dir,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "condition directory missing"),
        });
    }
    let ext = modality.file_extension();
    let mut paths: Vec<PathBuf> = WalkDir::new(&dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(ext))
        .collect();
    paths.sort();
    Ok(paths)
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub modality: CondModality,
    pub mask_canvas: u32,
    pub probe_size_limit: Option<u64>,
    pub force_rebuild: bool,
    pub progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    Cache,
    Rebuilt {
        reason: StaleReason,
        summary: ProbeSummary,
    },
}

#[derive(Debug, Clone)]
pub struct PathIndex {
    pub modality: CondModality,
    pub sidecar: PathBuf,
    pub paths: Vec<PathBuf>,
    pub source: IndexSource,
}

/// Load the index from its sidecar when fresh, otherwise discover, probe,
/// and persist it.
pub fn load_or_build(root: &Path, split: Split, opts: &IndexOptions) -> DatasetResult<PathIndex> {
    let sidecar = sidecar_path(root, split, opts.modality);
    match inspect_cache(&sidecar, opts.modality, opts.force_rebuild) {
        CacheState::Fresh(paths) => {
            info!(
                "loaded {} {} paths from {}",
                paths.len(),
                opts.modality,
                sidecar.display()
            );
            Ok(PathIndex {
                modality: opts.modality,
                sidecar,
                paths,
                source: IndexSource::Cache,
            })
        }
        CacheState::Stale(reason) => {
            if let StaleReason::Unreadable(msg) = &reason {
                warn!("ignoring unreadable sidecar {}: {msg}", sidecar.display());
            }
            info!("building {split} {} index from {}", opts.modality, root.display());
            let (paths, summary) = rebuild(root, split, opts)?;
            write_sidecar(&sidecar, opts.modality, &paths)?;
            info!(
                "wrote {} paths to {} ({} dropped)",
                paths.len(),
                sidecar.display(),
                summary.dropped.len()
            );
            Ok(PathIndex {
                modality: opts.modality,
                sidecar,
                paths,
                source: IndexSource::Rebuilt { reason, summary },
            })
        }
    }
}

fn rebuild(root: &Path, split: Split, opts: &IndexOptions) -> DatasetResult<(Vec<PathBuf>, ProbeSummary)> {
    let candidates = discover_condition_paths(root, split, opts.modality)?;
    let probe = ProbeOptions {
        modality: opts.modality,
        mask_canvas: opts.mask_canvas,
        size_limit: opts.probe_size_limit,
        progress: opts.progress,
    };
    Ok(filter_loadable(&candidates, &probe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn opts() -> IndexOptions {
        IndexOptions {
            modality: CondModality::Depth,
            mask_canvas: 512,
            probe_size_limit: None,
            force_rebuild: false,
            progress: false,
        }
    }

    fn write_depth(root: &Path, class: &str, name: &str) -> anyhow::Result<PathBuf> {
        let dir = root.join("train_depth").join(class);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        RgbImage::from_pixel(6, 6, Rgb([40, 40, 40])).save_with_format(&path, image::ImageFormat::Jpeg)?;
        Ok(path)
    }

    #[test]
    fn sidecar_name_follows_split_and_modality() {
        let p = sidecar_path(Path::new("/data"), Split::Val, CondModality::Depth);
        assert_eq!(p, PathBuf::from("/data/val_cond_info_depth.json"));
        let d = condition_dir(Path::new("/data"), Split::Train, CondModality::Mask);
        assert_eq!(d, PathBuf::from("/data/train_mask"));
    }

    #[test]
    fn cache_states_are_explicit() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let sidecar = tmp.path().join("train_cond_info_depth.json");
        assert_eq!(
            inspect_cache(&sidecar, CondModality::Depth, false),
            CacheState::Stale(StaleReason::Absent)
        );

        fs::write(&sidecar, "{not json")?;
        assert!(matches!(
            inspect_cache(&sidecar, CondModality::Depth, false),
            CacheState::Stale(StaleReason::Unreadable(_))
        ));

        fs::write(&sidecar, r#"{"mask": []}"#)?;
        assert_eq!(
            inspect_cache(&sidecar, CondModality::Depth, false),
            CacheState::Stale(StaleReason::MissingKey)
        );

        fs::write(&sidecar, r#"{"depth": ["a.jpeg", "b.jpeg"]}"#)?;
        assert_eq!(
            inspect_cache(&sidecar, CondModality::Depth, false),
            CacheState::Fresh(vec![PathBuf::from("a.jpeg"), PathBuf::from("b.jpeg")])
        );
        assert_eq!(
            inspect_cache(&sidecar, CondModality::Depth, true),
            CacheState::Stale(StaleReason::Forced)
        );
        Ok(())
    }

    #[test]
    fn discovery_matches_two_levels_and_extension() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path();
        let b = write_depth(root, "n02", "x.jpeg")?;
        let a = write_depth(root, "n01", "y.jpeg")?;
        fs::write(root.join("train_depth/n01/notes.txt"), "skip")?;
        fs::write(root.join("train_depth/top.jpeg"), "wrong depth")?;
        fs::create_dir_all(root.join("train_depth/n01/nested"))?;
        fs::write(root.join("train_depth/n01/nested/deep.jpeg"), "too deep")?;

        let found = discover_condition_paths(root, Split::Train, CondModality::Depth)?;
        assert_eq!(found, vec![a, b]);
        Ok(())
    }

    #[test]
    fn build_persists_and_then_loads_from_cache() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path();
        let good = write_depth(root, "n01", "a.jpeg")?;
        let bad = root.join("train_depth/n01/b.jpeg");
        fs::write(&bad, b"truncated")?;

        let first = load_or_build(root, Split::Train, &opts())?;
        assert_eq!(first.paths, vec![good.clone()]);
        match &first.source {
            IndexSource::Rebuilt { reason, summary } => {
                assert_eq!(reason, &StaleReason::Absent);
                assert_eq!(summary.dropped, vec![bad]);
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
        let written = fs::read_to_string(&first.sidecar)?;

        let second = load_or_build(root, Split::Train, &opts())?;
        assert_eq!(second.source, IndexSource::Cache);
        assert_eq!(second.paths, first.paths);

        let forced = load_or_build(
            root,
            Split::Train,
            &IndexOptions {
                force_rebuild: true,
                ..opts()
            },
        )?;
        assert_eq!(forced.paths, first.paths);
        assert_eq!(fs::read_to_string(&forced.sidecar)?, written);
        Ok(())
    }

    #[test]
    fn missing_condition_tree_is_an_error() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let err = load_or_build(tmp.path(), Split::Val, &opts()).unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
        Ok(())
    }
}
