//! Rendering segmentation annotations into a dense color mask.

use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::colormap::PALETTE_LEN;
use crate::types::{Annotation, DatasetError, DatasetResult};

/// Annotations with a smaller `area` are treated as noise.
pub const MIN_ANNOTATION_AREA: f64 = 5000.0;

/// Buckets per axis when quantizing a region's centroid.
pub const CENTROID_BUCKETS: u32 = 11;

/// Canvas size the mask annotations were produced at.
pub const ANNOTATION_CANVAS: u32 = 512;

/// Render `anns` onto a black `canvas x canvas` image.
///
/// Each qualifying region is painted with `palette[(xb * yb) % palette.len()]`,
/// where `(xb, yb)` is its centroid's bucket on an 11x11 grid. Regions are
/// painted in list order, so later ones win on overlap.
///
/// # Panics
///
/// Panics when a centroid lands on a bucket pair with `xb * yb >= 124`. That
/// means the annotations do not fit the sizing the palette was built for, and
/// rendering must stop rather than produce a wrong mask.
pub fn render_annotations(
    anns: &[Annotation],
    canvas: u32,
    palette: &[[u8; 3]],
) -> DatasetResult<RgbImage> {
    match render_checked(anns, canvas, palette) {
        Err(DatasetError::BucketOverflow { x_bucket, y_bucket }) => {
            panic!("centroid bucket product {x_bucket}*{y_bucket} must be < {PALETTE_LEN}")
        }
        other => other,
    }
}

/// Like [`render_annotations`] but reports a bucket overflow as an error.
pub(crate) fn render_checked(
    anns: &[Annotation],
    canvas: u32,
    palette: &[[u8; 3]],
) -> DatasetResult<RgbImage> {
    if palette.is_empty() {
        return Err(DatasetError::Other("empty palette".to_string()));
    }
    let mut out = RgbImage::new(canvas, canvas);
    for (i, ann) in anns.iter().enumerate() {
        if ann.area < MIN_ANNOTATION_AREA {
            continue;
        }
        let (mask_w, mask_h) = (ann.segmentation.width(), ann.segmentation.height());
        if mask_w != canvas || mask_h != canvas {
            return Err(DatasetError::ShapeMismatch {
                mask_w,
                mask_h,
                canvas,
            });
        }
        let mask = ann.segmentation.decode()?;
        let Some((mean_x, mean_y)) = mask.centroid() else {
            debug!("annotation {i} has area {} but no pixels; skipped", ann.area);
            continue;
        };
        let x_bucket = bucket(mean_x, mask.width());
        let y_bucket = bucket(mean_y, mask.height());
        if x_bucket * y_bucket >= PALETTE_LEN {
            return Err(DatasetError::BucketOverflow { x_bucket, y_bucket });
        }
        let color = Rgb(palette[(x_bucket * y_bucket) % palette.len()]);
        for (x, y) in mask.on_pixels() {
            out.put_pixel(x, y, color);
        }
    }
    Ok(out)
}

fn bucket(mean: f64, extent: u32) -> usize {
    (mean / (extent as f64 / CENTROID_BUCKETS as f64)).floor() as usize
}

pub fn load_annotations(path: &Path) -> DatasetResult<Vec<Annotation>> {
    let raw = fs::read(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load an annotation file and render it (see [`render_annotations`]).
pub fn render_annotation_file(
    path: &Path,
    canvas: u32,
    palette: &[[u8; 3]],
) -> DatasetResult<RgbImage> {
    let anns = load_annotations(path)?;
    render_annotations(&anns, canvas, palette)
}

pub(crate) fn render_annotation_file_checked(
    path: &Path,
    canvas: u32,
    palette: &[[u8; 3]],
) -> DatasetResult<RgbImage> {
    let anns = load_annotations(path)?;
    render_checked(&anns, canvas, palette)
}
