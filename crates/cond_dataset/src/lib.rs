//! Conditional ImageNet dataset loading.
//!
//! This crate provides utilities for:
//! - Discovering class folders and condition files (depth today; mask, canny, normal reserved)
//! - Probing condition files and caching the path index in a sidecar JSON
//! - Rendering run-length segmentation annotations into palette masks
//! - Paired image/condition augmentation
//! - Indexed, wrap-around sample access

pub mod aug;
pub mod classes;
pub mod colormap;
pub mod dataset;
pub mod index;
pub mod render;
pub mod rle;
pub mod types;
pub mod validation;

pub use aug::{PairedPipeline, PairedPipelineBuilder, PairedTransform, ResizeMode};
pub use classes::{find_classes, ClassMap};
pub use colormap::{color_map, create_color_map, PALETTE_LEN};
pub use dataset::{image_path_for, CondDataset, DatasetConfig, DatasetSummary};
pub use index::{
    discover_condition_paths, inspect_cache, load_or_build, sidecar_path, CacheState, IndexOptions,
    IndexSource, PathIndex, StaleReason,
};
pub use render::{load_annotations, render_annotation_file, render_annotations, ANNOTATION_CANVAS};
pub use rle::{BinaryMask, RleCounts, RleMask};
pub use types::*;
pub use validation::{filter_loadable, probe_condition, verify_paths, ProbeOptions, ProbeSummary};
