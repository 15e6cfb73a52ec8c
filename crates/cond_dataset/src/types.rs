//! Core types, error definitions, and data structures for cond_dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::rle::RleMask;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("run-length mask error: {msg}")]
    Rle { msg: String },
    #[error("couldn't find any class folder in {path}")]
    NoClassFolders { path: PathBuf },
    #[error("no class id for folder {class:?} (image {path})")]
    UnknownClass { class: String, path: PathBuf },
    #[error("path index for {split}/{modality} is empty")]
    EmptyIndex { split: Split, modality: CondModality },
    #[error("condition path {path} has no {segment} segment")]
    ConditionPath { path: PathBuf, segment: String },
    #[error("mask is {mask_w}x{mask_h} but the canvas is {canvas}x{canvas}")]
    ShapeMismatch { mask_w: u32, mask_h: u32, canvas: u32 },
    #[error("centroid bucket product {x_bucket}*{y_bucket} exceeds the palette bound")]
    BucketOverflow { x_bucket: usize, y_bucket: usize },
    #[error("{0}")]
    Other(String),
}

/// Dataset split. Names match the top-level folders under the dataset root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            other => Err(format!("unknown split {other:?} (expected train or val)")),
        }
    }
}

/// Conditioning modality paired with each image.
///
/// Only `Depth` corpora exist today. The other variants are wired through
/// indexing and loading so a `{split}_mask`, `{split}_canny` or
/// `{split}_normal` tree can be enabled by configuration alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CondModality {
    /// Run-length segmentation annotations, rendered to a color mask.
    Mask,
    Canny,
    Normal,
    Depth,
}

impl CondModality {
    pub const ALL: [CondModality; 4] = [
        CondModality::Mask,
        CondModality::Canny,
        CondModality::Normal,
        CondModality::Depth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CondModality::Mask => "mask",
            CondModality::Canny => "canny",
            CondModality::Normal => "normal",
            CondModality::Depth => "depth",
        }
    }

    /// Integer code carried in the sample's `type` field.
    pub fn type_code(&self) -> u8 {
        match self {
            CondModality::Mask => 0,
            CondModality::Canny => 1,
            CondModality::Depth => 2,
            CondModality::Normal => 3,
        }
    }

    /// File extension of condition files in the `{split}_{modality}` tree.
    pub fn file_extension(&self) -> &'static str {
        match self {
            CondModality::Mask => "json",
            _ => "jpeg",
        }
    }

    pub fn is_annotation(&self) -> bool {
        matches!(self, CondModality::Mask)
    }
}

impl fmt::Display for CondModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CondModality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CondModality::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown modality {s:?} (expected mask, canny, normal or depth)"))
    }
}

/// One training sample: an image, its condition, and labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: image::RgbImage,
    /// Rendered mask or decoded condition image, resized to `image`'s dimensions.
    pub condition: image::RgbImage,
    pub cls: usize,
    pub cond_type: CondModality,
    pub image_path: PathBuf,
    pub cond_path: PathBuf,
}

impl Sample {
    pub fn type_code(&self) -> u8 {
        self.cond_type.type_code()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Image in CHW layout, normalized to [0, 1].
    pub fn image_chw(&self) -> Vec<f32> {
        rgb_to_chw(&self.image)
    }

    /// Condition in CHW layout, normalized to [0, 1].
    pub fn condition_chw(&self) -> Vec<f32> {
        rgb_to_chw(&self.condition)
    }
}

pub(crate) fn rgb_to_chw(img: &image::RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        chw[base] = pixel[0] as f32 / 255.0;
        chw[plane + base] = pixel[1] as f32 / 255.0;
        chw[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    chw
}

/// One record of a mask annotation file. Extra keys in the file are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub segmentation: RleMask,
    pub area: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_carries_type_code_two() {
        assert_eq!(CondModality::Depth.type_code(), 2);
        assert_eq!(CondModality::Depth.file_extension(), "jpeg");
        assert_eq!(CondModality::Mask.file_extension(), "json");
    }

    #[test]
    fn modality_and_split_parse_from_folder_names() {
        for m in CondModality::ALL {
            assert_eq!(m.as_str().parse::<CondModality>(), Ok(m));
        }
        assert_eq!("val".parse::<Split>(), Ok(Split::Val));
        assert!("test".parse::<Split>().is_err());
    }

    #[test]
    fn chw_splits_channels_into_planes() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 0, 255]));
        let chw = rgb_to_chw(&img);
        assert_eq!(chw, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
