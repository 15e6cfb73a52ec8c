//! Paired image/condition augmentation.
//!
//! Geometric steps (resize, crop, flip) are applied identically to the image
//! and its condition so pixels stay aligned; photometric steps touch the image
//! only.

use image::imageops::FilterType;
use image::RgbImage;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::{DatasetError, DatasetResult};

/// A transform applied jointly to an image and its condition.
///
/// `index` is the wrapped sample index; seeded implementations mix it into
/// their RNG so a given sample always augments the same way.
pub trait PairedTransform: Send + Sync {
    fn apply(
        &self,
        image: RgbImage,
        condition: RgbImage,
        index: usize,
    ) -> DatasetResult<(RgbImage, RgbImage)>;
}

impl<F> PairedTransform for F
where
    F: Fn(RgbImage, RgbImage, usize) -> DatasetResult<(RgbImage, RgbImage)> + Send + Sync,
{
    fn apply(
        &self,
        image: RgbImage,
        condition: RgbImage,
        index: usize,
    ) -> DatasetResult<(RgbImage, RgbImage)> {
        self(image, condition, index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Stretch to fill the target dimensions.
    Force,
    /// Preserve aspect ratio; pad to target with zeros.
    Letterbox,
}

#[derive(Debug, Clone)]
pub struct PairedPipeline {
    /// Resize both images to this (width, height) first.
    pub target_size: Option<(u32, u32)>,
    pub resize_mode: ResizeMode,
    /// Random crop of this (width, height), same window for both images.
    pub crop_size: Option<(u32, u32)>,
    pub flip_horizontal_prob: f32,
    pub color_jitter_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub color_jitter_strength: f32,
    /// Filter used when resizing the image.
    pub image_filter: FilterType,
    /// Filter used when resizing the condition; nearest keeps mask colors exact.
    pub condition_filter: FilterType,
    pub seed: Option<u64>,
}

impl Default for PairedPipeline {
    fn default() -> Self {
        Self {
            target_size: None,
            resize_mode: ResizeMode::Force,
            crop_size: None,
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.1,
            image_filter: FilterType::Triangle,
            condition_filter: FilterType::Nearest,
            seed: None,
        }
    }
}

impl PairedPipeline {
    pub fn describe(&self) -> String {
        let size = |s: Option<(u32, u32)>| {
            s.map(|(w, h)| format!("{}x{}", w, h))
                .unwrap_or_else(|| "none".to_string())
        };
        format!(
            "target_size={} resize={:?} crop={} flip_p={:.2} color_jitter_p={:.2} strength={:.2} seed={}",
            size(self.target_size),
            self.resize_mode,
            size(self.crop_size),
            self.flip_horizontal_prob,
            self.color_jitter_prob,
            self.color_jitter_strength,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

impl PairedTransform for PairedPipeline {
    fn apply(
        &self,
        mut image: RgbImage,
        mut condition: RgbImage,
        index: usize,
    ) -> DatasetResult<(RgbImage, RgbImage)> {
        // Seeded RNG is per-sample deterministic; otherwise thread-local.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.seed {
            seeded_rng = rand::rngs::StdRng::seed_from_u64(seed ^ index as u64);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        if let Some((w, h)) = self.target_size {
            if w == 0 || h == 0 {
                return Err(DatasetError::Other(format!("invalid target size {w}x{h}")));
            }
            match self.resize_mode {
                ResizeMode::Force => {
                    image = image::imageops::resize(&image, w, h, self.image_filter);
                    condition = image::imageops::resize(&condition, w, h, self.condition_filter);
                }
                ResizeMode::Letterbox => {
                    image = letterbox_resize(&image, w, h, self.image_filter);
                    condition = letterbox_resize(&condition, w, h, self.condition_filter);
                }
            }
        }
        if let Some((w, h)) = self.crop_size {
            random_crop_pair(&mut image, &mut condition, w, h, rng);
        }
        maybe_hflip_pair(&mut image, &mut condition, self.flip_horizontal_prob, rng);
        maybe_jitter(&mut image, self.color_jitter_prob, self.color_jitter_strength, rng);
        Ok((image, condition))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PairedPipelineBuilder {
    inner: PairedPipeline,
}

impl PairedPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn target_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.inner.target_size = size;
        self
    }
    pub fn resize_mode(mut self, mode: ResizeMode) -> Self {
        self.inner.resize_mode = mode;
        self
    }
    pub fn crop_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.inner.crop_size = size;
        self
    }
    pub fn flip_horizontal_prob(mut self, p: f32) -> Self {
        self.inner.flip_horizontal_prob = p;
        self
    }
    pub fn color_jitter(mut self, prob: f32, strength: f32) -> Self {
        self.inner.color_jitter_prob = prob;
        self.inner.color_jitter_strength = strength;
        self
    }
    pub fn filters(mut self, image: FilterType, condition: FilterType) -> Self {
        self.inner.image_filter = image;
        self.inner.condition_filter = condition;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.inner.seed = seed;
        self
    }
    pub fn build(self) -> PairedPipeline {
        self.inner
    }
}

fn letterbox_resize(img: &RgbImage, target_w: u32, target_h: u32, filter: FilterType) -> RgbImage {
    let (w, h) = img.dimensions();
    let scale = f32::min(target_w as f32 / w as f32, target_h as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, target_h);
    let resized = image::imageops::resize(img, new_w, new_h, filter);

    let pad_w = (target_w - new_w) / 2;
    let pad_h = (target_h - new_h) / 2;

    let mut canvas = RgbImage::new(target_w, target_h);
    image::imageops::replace(&mut canvas, &resized, pad_w.into(), pad_h.into());
    canvas
}

/// Crop the same window from both images. Windows larger than the image are
/// clamped to the image size.
pub(crate) fn random_crop_pair(
    image: &mut RgbImage,
    condition: &mut RgbImage,
    crop_w: u32,
    crop_h: u32,
    rng: &mut dyn rand::RngCore,
) {
    let (w, h) = image.dimensions();
    let crop_w = crop_w.min(w);
    let crop_h = crop_h.min(h);
    if crop_w == 0 || crop_h == 0 || (crop_w == w && crop_h == h) {
        return;
    }
    let x0 = rng.random_range(0..=w - crop_w);
    let y0 = rng.random_range(0..=h - crop_h);
    *image = image::imageops::crop_imm(image, x0, y0, crop_w, crop_h).to_image();
    *condition = image::imageops::crop_imm(condition, x0, y0, crop_w, crop_h).to_image();
}

pub(crate) fn maybe_hflip_pair(
    image: &mut RgbImage,
    condition: &mut RgbImage,
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(image);
        image::imageops::flip_horizontal_in_place(condition);
    }
}

pub(crate) fn maybe_jitter(img: &mut RgbImage, prob: f32, strength: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let mut v = (v - 0.5) * contrast + 0.5;
            v *= bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod aug_tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 0]))
    }

    #[test]
    fn flip_moves_both_images() {
        let mut img = gradient(4, 2);
        let mut cond = gradient(4, 2);
        let mut rng = rand::rng();
        maybe_hflip_pair(&mut img, &mut cond, 1.0, &mut rng);
        assert_eq!(img.get_pixel(0, 0).0, [30, 0, 0]);
        assert_eq!(img, cond);
    }

    #[test]
    fn crop_uses_one_window_for_both() {
        let mut img = gradient(20, 16);
        let mut cond = gradient(20, 16);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        random_crop_pair(&mut img, &mut cond, 8, 5, &mut rng);
        assert_eq!(img.dimensions(), (8, 5));
        assert_eq!(img, cond);
    }

    #[test]
    fn jitter_leaves_condition_alone() -> anyhow::Result<()> {
        let pipeline = PairedPipelineBuilder::new()
            .color_jitter(1.0, 0.5)
            .seed(Some(3))
            .build();
        let img = RgbImage::from_pixel(4, 4, Rgb([120, 120, 120]));
        let cond = RgbImage::from_pixel(4, 4, Rgb([7, 8, 9]));
        let (_, cond_out) = pipeline.apply(img, cond.clone(), 0)?;
        assert_eq!(cond_out, cond);
        Ok(())
    }

    #[test]
    fn seeded_pipeline_is_deterministic_per_index() -> anyhow::Result<()> {
        let pipeline = PairedPipelineBuilder::new()
            .target_size(Some((12, 12)))
            .crop_size(Some((6, 6)))
            .flip_horizontal_prob(0.5)
            .seed(Some(99))
            .build();
        let a = pipeline.apply(gradient(20, 10), gradient(20, 10), 5)?;
        let b = pipeline.apply(gradient(20, 10), gradient(20, 10), 5)?;
        assert_eq!(a, b);
        assert_eq!(a.0.dimensions(), (6, 6));
        Ok(())
    }

    #[test]
    fn letterbox_pads_to_target() {
        let out = letterbox_resize(&RgbImage::from_pixel(20, 10, Rgb([255, 0, 0])), 16, 16, FilterType::Nearest);
        assert_eq!(out.dimensions(), (16, 16));
        assert_eq!(out.get_pixel(8, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(8, 8).0, [255, 0, 0]);
    }

    #[test]
    fn zero_target_size_is_an_error() {
        for mode in [ResizeMode::Letterbox, ResizeMode::Force] {
            let pipeline = PairedPipelineBuilder::new()
                .target_size(Some((0, 16)))
                .resize_mode(mode)
                .build();
            let err = pipeline.apply(gradient(8, 8), gradient(8, 8), 0).unwrap_err();
            assert!(matches!(err, DatasetError::Other(_)));
        }
    }

    #[test]
    fn closures_are_paired_transforms() -> anyhow::Result<()> {
        let swap = |a: RgbImage, b: RgbImage, _i: usize| -> DatasetResult<(RgbImage, RgbImage)> { Ok((b, a)) };
        let (x, y) = swap.apply(gradient(2, 2), RgbImage::new(2, 2), 0)?;
        assert_eq!(x, RgbImage::new(2, 2));
        assert_eq!(y, gradient(2, 2));
        Ok(())
    }
}
