//! Indexed access to (image, condition, class, type) samples.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aug::PairedTransform;
use crate::classes::{find_classes, ClassMap};
use crate::colormap::color_map;
use crate::index::{load_or_build, IndexOptions, IndexSource, PathIndex};
use crate::render::{render_annotation_file, ANNOTATION_CANVAS};
use crate::types::{CondModality, DatasetError, DatasetResult, Sample, Split};

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Dataset root holding `{split}/` and `{split}_{modality}/` trees.
    pub root: PathBuf,
    pub split: Split,
    /// Modality served while training.
    pub train_modality: CondModality,
    /// Modality pinned during evaluation.
    pub val_modality: CondModality,
    /// Canvas mask annotations are rendered at before resizing.
    pub mask_canvas: u32,
    /// See [`crate::validation::ProbeOptions::size_limit`].
    pub probe_size_limit: Option<u64>,
    /// Ignore an existing sidecar and rebuild the index.
    pub rebuild_index: bool,
    pub show_progress: bool,
}

impl DatasetConfig {
    pub fn new(root: impl Into<PathBuf>, split: Split) -> Self {
        Self {
            root: root.into(),
            split,
            train_modality: CondModality::Depth,
            val_modality: CondModality::Depth,
            mask_canvas: ANNOTATION_CANVAS,
            probe_size_limit: None,
            rebuild_index: false,
            show_progress: false,
        }
    }

    /// The modality samples are drawn from for this split.
    pub fn active_modality(&self) -> CondModality {
        match self.split {
            Split::Train => self.train_modality,
            Split::Val => self.val_modality,
        }
    }

    pub(crate) fn index_options(&self) -> IndexOptions {
        IndexOptions {
            modality: self.active_modality(),
            mask_canvas: self.mask_canvas,
            probe_size_limit: self.probe_size_limit,
            force_rebuild: self.rebuild_index,
            progress: self.show_progress,
        }
    }
}

pub struct CondDataset {
    config: DatasetConfig,
    index: PathIndex,
    classes: ClassMap,
    transform: Option<Arc<dyn PairedTransform>>,
}

impl fmt::Debug for CondDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondDataset")
            .field("config", &self.config)
            .field("len", &self.index.paths.len())
            .field("classes", &self.classes.len())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl CondDataset {
    /// Discover classes under `root/{split}` and load or build the path index.
    pub fn new(config: DatasetConfig) -> DatasetResult<Self> {
        let classes = find_classes(&config.root.join(config.split.as_str()))?;
        let index = load_or_build(&config.root, config.split, &config.index_options())?;
        info!(
            "{} dataset: {} {} samples across {} classes",
            config.split,
            index.paths.len(),
            index.modality,
            classes.len()
        );
        if config.split == Split::Val {
            warn!("only {} conditions are used during evaluation", index.modality);
        }
        Ok(Self {
            config,
            index,
            classes,
            transform: None,
        })
    }

    pub fn with_transform<T: PairedTransform + 'static>(mut self, transform: T) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_shared_transform(mut self, transform: Arc<dyn PairedTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Number of indexed condition files. [`CondDataset::get`] accepts any
    /// index and wraps it onto this range.
    pub fn len(&self) -> usize {
        self.index.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.paths.is_empty()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn modality(&self) -> CondModality {
        self.index.modality
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.index.paths
    }

    pub fn index_source(&self) -> &IndexSource {
        &self.index.source
    }

    /// Load sample `index % len()`.
    pub fn get(&self, index: usize) -> DatasetResult<Sample> {
        if self.index.paths.is_empty() {
            return Err(DatasetError::EmptyIndex {
                split: self.config.split,
                modality: self.index.modality,
            });
        }
        let wrapped = index % self.index.paths.len();
        let cond_path = &self.index.paths[wrapped];
        let modality = self.index.modality;
        let image_path = image_path_for(cond_path, self.config.split, modality)?;
        let cls = self.class_of(&image_path)?;

        let image = open_rgb(&image_path)?;
        let condition = if modality.is_annotation() {
            render_annotation_file(cond_path, self.config.mask_canvas, color_map())?
        } else {
            open_rgb(cond_path)?
        };
        let condition = if condition.dimensions() == image.dimensions() {
            condition
        } else {
            image::imageops::resize(&condition, image.width(), image.height(), FilterType::Nearest)
        };

        let (image, condition) = match &self.transform {
            Some(t) => t.apply(image, condition, wrapped)?,
            None => (image, condition),
        };

        Ok(Sample {
            image,
            condition,
            cls,
            cond_type: modality,
            image_path,
            cond_path: cond_path.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = DatasetResult<Sample>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Per-class sample counts over the index.
    pub fn summary(&self) -> DatasetSummary {
        let mut per_class: BTreeMap<String, usize> = BTreeMap::new();
        let mut unclassified = 0usize;
        for path in &self.index.paths {
            match parent_name(path).filter(|c| self.classes.index_of(c).is_some()) {
                Some(class) => *per_class.entry(class.to_string()).or_default() += 1,
                None => unclassified += 1,
            }
        }
        DatasetSummary {
            split: self.config.split,
            modality: self.index.modality,
            total: self.index.paths.len(),
            num_classes: self.classes.len(),
            per_class,
            unclassified,
        }
    }

    fn class_of(&self, image_path: &Path) -> DatasetResult<usize> {
        let class = parent_name(image_path).unwrap_or_default();
        self.classes
            .index_of(class)
            .ok_or_else(|| DatasetError::UnknownClass {
                class: class.to_string(),
                path: image_path.to_path_buf(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub split: Split,
    pub modality: CondModality,
    pub total: usize,
    pub num_classes: usize,
    pub per_class: BTreeMap<String, usize>,
    /// Indexed paths whose folder is not a known class.
    pub unclassified: usize,
}

/// Map `root/{split}_{modality}/<class>/<name>.<ext>` to
/// `root/{split}/<class>/<name>.JPEG`.
///
/// The last path segment equal to `{split}_{modality}` is replaced.
pub fn image_path_for(cond_path: &Path, split: Split, modality: CondModality) -> DatasetResult<PathBuf> {
    let segment = format!("{split}_{modality}");
    let components: Vec<Component<'_>> = cond_path.components().collect();
    let Some(pos) = components
        .iter()
        .rposition(|c| c.as_os_str() == segment.as_str())
    else {
        return Err(DatasetError::ConditionPath {
            path: cond_path.to_path_buf(),
            segment,
        });
    };
    let mut out = PathBuf::new();
    for (i, c) in components.iter().enumerate() {
        if i == pos {
            out.push(split.as_str());
        } else {
            out.push(c.as_os_str());
        }
    }
    let stem: OsString = out.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut name = stem;
    name.push(".JPEG");
    out.set_file_name(name);
    Ok(out)
}

fn parent_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}

fn open_rgb(path: &Path) -> DatasetResult<image::RgbImage> {
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_swaps_tree_and_extension() {
        let p = image_path_for(
            Path::new("/data/imagenet/train_depth/n01440764/n01440764_10026.jpeg"),
            Split::Train,
            CondModality::Depth,
        )
        .unwrap();
        assert_eq!(p, PathBuf::from("/data/imagenet/train/n01440764/n01440764_10026.JPEG"));

        let p = image_path_for(
            Path::new("rel/val_mask/n02/img.json"),
            Split::Val,
            CondModality::Mask,
        )
        .unwrap();
        assert_eq!(p, PathBuf::from("rel/val/n02/img.JPEG"));
    }

    #[test]
    fn image_path_only_touches_the_condition_segment() {
        let p = image_path_for(
            Path::new("/train_depth_backup/train_depth/cls/a.jpeg"),
            Split::Train,
            CondModality::Depth,
        )
        .unwrap();
        assert_eq!(p, PathBuf::from("/train_depth_backup/train/cls/a.JPEG"));
    }

    #[test]
    fn image_path_requires_condition_segment() {
        let err = image_path_for(Path::new("/data/val/cls/a.jpeg"), Split::Val, CondModality::Depth)
            .unwrap_err();
        assert!(matches!(err, DatasetError::ConditionPath { .. }));
    }

    #[test]
    fn val_split_pins_val_modality() {
        let mut cfg = DatasetConfig::new("/data", Split::Val);
        cfg.train_modality = CondModality::Mask;
        assert_eq!(cfg.active_modality(), CondModality::Depth);
        cfg.split = Split::Train;
        assert_eq!(cfg.active_modality(), CondModality::Mask);
    }
}
