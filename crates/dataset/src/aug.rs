//! Box-aware image augmentation pipeline.
//!
//! Pixel kernels are delegated to `image`/`imageproc` (resize, flip, blur,
//! median filter, noise, projective warp); this module only does bounding-box
//! bookkeeping and orchestration. Ops run in a fixed order: random crop,
//! horizontal flip, vertical flip, brightness/contrast, shift/scale/rotate,
//! then one of the blur/noise group.

use data_contracts::Annotation;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use rand::{Rng, SeedableRng};

/// Border fill for pixels exposed by geometric ops.
const BORDER_FILL: Rgb<u8> = Rgb([114, 114, 114]);

#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Crop every image to this (width, height). If None, no crop is applied.
    pub crop_size: Option<(u32, u32)>,
    /// Probability of the random crop when crop_size is set.
    pub crop_prob: f32,
    /// Probability of a horizontal flip.
    pub flip_horizontal_prob: f32,
    /// Probability of a vertical flip.
    pub flip_vertical_prob: f32,
    /// Probability of a brightness/contrast jitter.
    pub brightness_contrast_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub brightness_contrast_strength: f32,
    /// Probability of a combined shift/scale/rotate.
    pub shift_scale_rotate_prob: f32,
    /// Max shift as a fraction of the image side.
    pub shift_limit: f32,
    /// Max relative scale change (scale drawn from [1-s, 1+s]).
    pub scale_limit: f32,
    /// Max rotation in degrees (either direction).
    pub rotate_limit_deg: f32,
    /// Probability of applying one op from the blur/noise group.
    pub distortion_prob: f32,
    /// Max sigma for gaussian blur.
    pub blur_sigma_max: f32,
    /// Radius for the median filter.
    pub median_blur_radius: u32,
    /// Max stddev for additive gaussian noise, on the 0-255 scale.
    pub noise_stddev_max: f32,
    /// Max kernel length for horizontal motion blur (odd, >= 3).
    pub motion_blur_kernel_max: u32,
    /// Boxes keeping less than this fraction of their area are dropped.
    pub min_visibility: f32,
    /// Seed for reproducible runs; mixed per-sample so iteration order of
    /// other samples never perturbs a sample's draws.
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            crop_size: Some((640, 640)),
            crop_prob: 1.0,
            flip_horizontal_prob: 0.5,
            flip_vertical_prob: 0.5,
            brightness_contrast_prob: 0.5,
            brightness_contrast_strength: 0.2,
            shift_scale_rotate_prob: 0.5,
            shift_limit: 0.0625,
            scale_limit: 0.1,
            rotate_limit_deg: 15.0,
            distortion_prob: 0.5,
            blur_sigma_max: 1.5,
            median_blur_radius: 1,
            noise_stddev_max: 12.0,
            motion_blur_kernel_max: 7,
            min_visibility: 0.1,
            seed: None,
        }
    }
}

/// The result of running the pipeline on one sample.
#[derive(Debug, Clone)]
pub struct AugmentedSample {
    pub image: RgbImage,
    pub annotations: Vec<Annotation>,
    /// Boxes removed by the visibility rule during geometric ops.
    pub dropped_boxes: usize,
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    cfg: AugmentConfig,
}

impl TransformPipeline {
    pub fn from_config(cfg: AugmentConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.cfg
    }

    pub fn describe(&self) -> String {
        let crop = self
            .cfg
            .crop_size
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "crop={} p={:.2} hflip_p={:.2} vflip_p={:.2} bc_p={:.2} strength={:.2} ssr_p={:.2} shift={:.3} scale={:.2} rotate={:.1}deg distort_p={:.2} min_vis={:.2} seed={}",
            crop,
            self.cfg.crop_prob,
            self.cfg.flip_horizontal_prob,
            self.cfg.flip_vertical_prob,
            self.cfg.brightness_contrast_prob,
            self.cfg.brightness_contrast_strength,
            self.cfg.shift_scale_rotate_prob,
            self.cfg.shift_limit,
            self.cfg.scale_limit,
            self.cfg.rotate_limit_deg,
            self.cfg.distortion_prob,
            self.cfg.min_visibility,
            self.cfg
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    /// Run the full pipeline on one sample. `sample_id` feeds the per-sample
    /// RNG derivation when a seed is configured.
    pub fn apply(
        &self,
        img: RgbImage,
        annotations: &[Annotation],
        sample_id: u64,
    ) -> AugmentedSample {
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.cfg.seed {
            seeded_rng = rand::rngs::StdRng::seed_from_u64(seed ^ sample_id);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        let mut img = img;
        let mut annotations = annotations.to_vec();
        let before = annotations.len();

        if let Some(crop_size) = self.cfg.crop_size {
            maybe_random_crop(
                &mut img,
                &mut annotations,
                self.cfg.crop_prob,
                crop_size,
                self.cfg.min_visibility,
                rng,
            );
        }
        maybe_hflip(&mut img, &mut annotations, self.cfg.flip_horizontal_prob, rng);
        maybe_vflip(&mut img, &mut annotations, self.cfg.flip_vertical_prob, rng);
        maybe_brightness_contrast(
            &mut img,
            self.cfg.brightness_contrast_prob,
            self.cfg.brightness_contrast_strength,
            rng,
        );
        maybe_shift_scale_rotate(
            &mut img,
            &mut annotations,
            self.cfg.shift_scale_rotate_prob,
            self.cfg.shift_limit,
            self.cfg.scale_limit,
            self.cfg.rotate_limit_deg,
            self.cfg.min_visibility,
            rng,
        );
        maybe_distortion(
            &mut img,
            self.cfg.distortion_prob,
            self.cfg.blur_sigma_max,
            self.cfg.median_blur_radius,
            self.cfg.noise_stddev_max,
            self.cfg.motion_blur_kernel_max,
            rng,
        );

        let dropped_boxes = before - annotations.len();
        AugmentedSample {
            image: img,
            annotations,
            dropped_boxes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipelineBuilder {
    cfg: AugmentConfig,
}

impl Default for TransformPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformPipelineBuilder {
    pub fn new() -> Self {
        Self {
            cfg: AugmentConfig::default(),
        }
    }
    pub fn crop(mut self, size: Option<(u32, u32)>, prob: f32) -> Self {
        self.cfg.crop_size = size;
        self.cfg.crop_prob = prob;
        self
    }
    pub fn flips(mut self, horizontal_prob: f32, vertical_prob: f32) -> Self {
        self.cfg.flip_horizontal_prob = horizontal_prob;
        self.cfg.flip_vertical_prob = vertical_prob;
        self
    }
    pub fn brightness_contrast(mut self, prob: f32, strength: f32) -> Self {
        self.cfg.brightness_contrast_prob = prob;
        self.cfg.brightness_contrast_strength = strength;
        self
    }
    pub fn shift_scale_rotate(mut self, prob: f32, shift: f32, scale: f32, rotate_deg: f32) -> Self {
        self.cfg.shift_scale_rotate_prob = prob;
        self.cfg.shift_limit = shift;
        self.cfg.scale_limit = scale;
        self.cfg.rotate_limit_deg = rotate_deg;
        self
    }
    pub fn distortion(mut self, prob: f32) -> Self {
        self.cfg.distortion_prob = prob;
        self
    }
    pub fn min_visibility(mut self, min_visibility: f32) -> Self {
        self.cfg.min_visibility = min_visibility;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.cfg.seed = seed;
        self
    }
    pub fn build(self) -> TransformPipeline {
        TransformPipeline::from_config(self.cfg)
    }
}

/// Resize preserving aspect ratio and pad to a square `target` canvas,
/// remapping normalized corner boxes through the same transform.
pub fn letterbox(
    img: &RgbImage,
    target: u32,
    annotations: &[Annotation],
) -> (RgbImage, Vec<Annotation>) {
    let (w, h) = img.dimensions();
    let scale = f32::min(target as f32 / w as f32, target as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);

    let pad_w = (target - new_w) / 2;
    let pad_h = (target - new_h) / 2;
    let mut canvas = RgbImage::new(target, target);
    image::imageops::replace(&mut canvas, &resized, pad_w.into(), pad_h.into());

    let remapped = annotations
        .iter()
        .map(|annotation| {
            let px = [
                annotation.bbox[0] * w as f32 * scale + pad_w as f32,
                annotation.bbox[1] * h as f32 * scale + pad_h as f32,
                annotation.bbox[2] * w as f32 * scale + pad_w as f32,
                annotation.bbox[3] * h as f32 * scale + pad_h as f32,
            ];
            Annotation::new(
                annotation.class_id,
                data_contracts::clamp_corner([
                    px[0] / target as f32,
                    px[1] / target as f32,
                    px[2] / target as f32,
                    px[3] / target as f32,
                ]),
            )
        })
        .collect();
    (canvas, remapped)
}

/// Crop a random `crop_size` window. Images smaller than the window are
/// upscaled first; normalized boxes are invariant under that resize.
pub(crate) fn maybe_random_crop(
    img: &mut RgbImage,
    annotations: &mut Vec<Annotation>,
    prob: f32,
    (crop_w, crop_h): (u32, u32),
    min_visibility: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || crop_w == 0 || crop_h == 0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }

    let (w, h) = img.dimensions();
    if w < crop_w || h < crop_h {
        let scale = f32::max(crop_w as f32 / w as f32, crop_h as f32 / h as f32);
        let new_w = (w as f32 * scale).ceil() as u32;
        let new_h = (h as f32 * scale).ceil() as u32;
        *img = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
    }
    let (w, h) = img.dimensions();

    let x0 = if w > crop_w {
        rng.random_range(0..=(w - crop_w))
    } else {
        0
    };
    let y0 = if h > crop_h {
        rng.random_range(0..=(h - crop_h))
    } else {
        0
    };
    *img = image::imageops::crop_imm(img, x0, y0, crop_w, crop_h).to_image();

    let window = [
        x0 as f32,
        y0 as f32,
        (x0 + crop_w) as f32,
        (y0 + crop_h) as f32,
    ];
    annotations.retain_mut(|annotation| {
        let px = [
            annotation.bbox[0] * w as f32,
            annotation.bbox[1] * h as f32,
            annotation.bbox[2] * w as f32,
            annotation.bbox[3] * h as f32,
        ];
        let original_area = (px[2] - px[0]).max(0.0) * (px[3] - px[1]).max(0.0);

        let ix0 = px[0].max(window[0]);
        let iy0 = px[1].max(window[1]);
        let ix1 = px[2].min(window[2]);
        let iy1 = px[3].min(window[3]);
        let visible_w = ix1 - ix0;
        let visible_h = iy1 - iy0;
        if visible_w < 1.0 || visible_h < 1.0 || original_area <= 0.0 {
            return false;
        }
        if (visible_w * visible_h) / original_area < min_visibility {
            return false;
        }
        annotation.bbox = [
            (ix0 - window[0]) / crop_w as f32,
            (iy0 - window[1]) / crop_h as f32,
            (ix1 - window[0]) / crop_w as f32,
            (iy1 - window[1]) / crop_h as f32,
        ];
        annotation.bbox = data_contracts::clamp_corner(annotation.bbox);
        true
    });
}

pub(crate) fn maybe_hflip(
    img: &mut RgbImage,
    annotations: &mut [Annotation],
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
        for annotation in annotations.iter_mut() {
            let x0 = annotation.bbox[0];
            let x1 = annotation.bbox[2];
            annotation.bbox[0] = (1.0 - x1).clamp(0.0, 1.0);
            annotation.bbox[2] = (1.0 - x0).clamp(0.0, 1.0);
        }
    }
}

pub(crate) fn maybe_vflip(
    img: &mut RgbImage,
    annotations: &mut [Annotation],
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_vertical_in_place(img);
        for annotation in annotations.iter_mut() {
            let y0 = annotation.bbox[1];
            let y1 = annotation.bbox[3];
            annotation.bbox[1] = (1.0 - y1).clamp(0.0, 1.0);
            annotation.bbox[3] = (1.0 - y0).clamp(0.0, 1.0);
        }
    }
}

pub(crate) fn maybe_brightness_contrast(
    img: &mut RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
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

/// Shift, scale and rotate in a single projective warp. Box corners go
/// through the same projection as the pixels; the axis-aligned hull is kept.
#[allow(clippy::too_many_arguments)]
pub(crate) fn maybe_shift_scale_rotate(
    img: &mut RgbImage,
    annotations: &mut Vec<Annotation>,
    prob: f32,
    shift_limit: f32,
    scale_limit: f32,
    rotate_limit_deg: f32,
    min_visibility: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }

    let (w, h) = img.dimensions();
    let (wf, hf) = (w as f32, h as f32);
    let shift_x = if shift_limit > 0.0 {
        rng.random_range(-shift_limit..shift_limit) * wf
    } else {
        0.0
    };
    let shift_y = if shift_limit > 0.0 {
        rng.random_range(-shift_limit..shift_limit) * hf
    } else {
        0.0
    };
    let scale = if scale_limit > 0.0 {
        1.0 + rng.random_range(-scale_limit..scale_limit)
    } else {
        1.0
    };
    let theta = if rotate_limit_deg > 0.0 {
        rng.random_range(-rotate_limit_deg..rotate_limit_deg).to_radians()
    } else {
        0.0
    };

    let (cx, cy) = (wf / 2.0, hf / 2.0);
    let projection = Projection::translate(cx + shift_x, cy + shift_y)
        * Projection::rotate(theta)
        * Projection::scale(scale, scale)
        * Projection::translate(-cx, -cy);

    *img = warp(img, &projection, Interpolation::Bilinear, BORDER_FILL);

    annotations.retain_mut(|annotation| {
        let px = [
            annotation.bbox[0] * wf,
            annotation.bbox[1] * hf,
            annotation.bbox[2] * wf,
            annotation.bbox[3] * hf,
        ];
        let corners = [
            projection * (px[0], px[1]),
            projection * (px[2], px[1]),
            projection * (px[0], px[3]),
            projection * (px[2], px[3]),
        ];
        let mut x0 = f32::INFINITY;
        let mut y0 = f32::INFINITY;
        let mut x1 = f32::NEG_INFINITY;
        let mut y1 = f32::NEG_INFINITY;
        for (x, y) in corners {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        let hull_area = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
        let cx0 = x0.clamp(0.0, wf);
        let cy0 = y0.clamp(0.0, hf);
        let cx1 = x1.clamp(cx0, wf);
        let cy1 = y1.clamp(cy0, hf);
        let visible_w = cx1 - cx0;
        let visible_h = cy1 - cy0;
        if visible_w < 1.0 || visible_h < 1.0 || hull_area <= 0.0 {
            return false;
        }
        if (visible_w * visible_h) / hull_area < min_visibility {
            return false;
        }
        annotation.bbox =
            data_contracts::clamp_corner([cx0 / wf, cy0 / hf, cx1 / wf, cy1 / hf]);
        true
    });
}

/// Apply one uniformly chosen op from the blur/noise group. Photometric
/// only: boxes are untouched.
pub(crate) fn maybe_distortion(
    img: &mut RgbImage,
    prob: f32,
    blur_sigma_max: f32,
    median_blur_radius: u32,
    noise_stddev_max: f32,
    motion_blur_kernel_max: u32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    match rng.random_range(0..4u32) {
        0 => {
            if blur_sigma_max > 0.0 {
                let sigma = rng.random_range(0.3..blur_sigma_max.max(0.31));
                *img = image::imageops::blur(img, sigma);
            }
        }
        1 => {
            if median_blur_radius > 0 {
                *img = imageproc::filter::median_filter(
                    img,
                    median_blur_radius,
                    median_blur_radius,
                );
            }
        }
        2 => {
            if noise_stddev_max > 0.0 {
                let stddev = rng.random_range(2.0..noise_stddev_max.max(2.1)) as f64;
                *img = imageproc::noise::gaussian_noise(img, 0.0, stddev, rng.next_u64());
            }
        }
        _ => {
            if motion_blur_kernel_max >= 3 {
                let max_half = (motion_blur_kernel_max.max(3) - 1) / 2;
                let half = rng.random_range(1..=max_half.max(1));
                let len = (2 * half + 1) as usize;
                let kernel = vec![1.0f32 / len as f32; len];
                *img = imageproc::filter::horizontal_filter(img, &kernel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn boxed(bbox: [f32; 4]) -> Vec<Annotation> {
        vec![Annotation::new(0, bbox)]
    }

    #[test]
    fn hflip_mirrors_x_and_preserves_order() {
        let mut img = RgbImage::new(4, 4);
        let mut annotations = boxed([0.1, 0.2, 0.4, 0.8]);
        let mut rng = rng();
        maybe_hflip(&mut img, &mut annotations, 1.0, &mut rng);
        let bbox = annotations[0].bbox;
        assert!((bbox[0] - 0.6).abs() < 1e-6);
        assert!((bbox[2] - 0.9).abs() < 1e-6);
        assert!(bbox[0] < bbox[2]);
    }

    #[test]
    fn double_hflip_is_identity() {
        let mut img = RgbImage::new(4, 4);
        let original = [0.1, 0.2, 0.4, 0.8];
        let mut annotations = boxed(original);
        let mut rng = rng();
        maybe_hflip(&mut img, &mut annotations, 1.0, &mut rng);
        maybe_hflip(&mut img, &mut annotations, 1.0, &mut rng);
        for (a, b) in annotations[0].bbox.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn vflip_mirrors_y() {
        let mut img = RgbImage::new(4, 4);
        let mut annotations = boxed([0.1, 0.2, 0.4, 0.8]);
        let mut rng = rng();
        maybe_vflip(&mut img, &mut annotations, 1.0, &mut rng);
        let bbox = annotations[0].bbox;
        assert!((bbox[1] - 0.2).abs() < 1e-6);
        assert!((bbox[3] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn crop_yields_requested_dimensions() {
        let mut img = RgbImage::new(100, 80);
        let mut annotations = boxed([0.0, 0.0, 1.0, 1.0]);
        let mut rng = rng();
        maybe_random_crop(&mut img, &mut annotations, 1.0, (32, 32), 0.0, &mut rng);
        assert_eq!(img.dimensions(), (32, 32));
        assert_eq!(annotations.len(), 1);
        assert!(data_contracts::validate_corner(annotations[0].bbox).is_ok());
    }

    #[test]
    fn crop_upscales_small_images() {
        let mut img = RgbImage::new(10, 10);
        let mut annotations = boxed([0.2, 0.2, 0.8, 0.8]);
        let mut rng = rng();
        maybe_random_crop(&mut img, &mut annotations, 1.0, (32, 32), 0.1, &mut rng);
        assert_eq!(img.dimensions(), (32, 32));
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn crop_drops_boxes_outside_window() {
        // 200x100 image, box entirely in the right half; crop the left half.
        let mut img = RgbImage::new(200, 100);
        let mut annotations = boxed([0.8, 0.1, 0.95, 0.4]);
        let mut rng = rng();
        maybe_random_crop(&mut img, &mut annotations, 1.0, (100, 100), 0.1, &mut rng);
        // The box either survived clamped and valid, or was dropped entirely.
        for annotation in &annotations {
            assert!(data_contracts::validate_corner(annotation.bbox).is_ok());
        }
    }

    #[test]
    fn ssr_with_zero_limits_keeps_boxes() {
        let mut img = RgbImage::new(64, 64);
        let original = [0.25, 0.25, 0.75, 0.75];
        let mut annotations = boxed(original);
        let mut rng = rng();
        maybe_shift_scale_rotate(
            &mut img,
            &mut annotations,
            1.0,
            0.0,
            0.0,
            0.0,
            0.1,
            &mut rng,
        );
        assert_eq!(annotations.len(), 1);
        for (a, b) in annotations[0].bbox.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn ssr_rotation_grows_hull_but_stays_valid() {
        let mut img = RgbImage::new(64, 64);
        let mut annotations = boxed([0.4, 0.4, 0.6, 0.6]);
        let mut rng = rng();
        maybe_shift_scale_rotate(
            &mut img,
            &mut annotations,
            1.0,
            0.0,
            0.0,
            45.0,
            0.1,
            &mut rng,
        );
        assert_eq!(annotations.len(), 1);
        let bbox = annotations[0].bbox;
        assert!(data_contracts::validate_corner(bbox).is_ok());
        // Rotating a centered square grows its axis-aligned hull.
        assert!(bbox[2] - bbox[0] > 0.2 - 1e-4);
    }

    #[test]
    fn letterbox_centers_and_remaps_boxes() {
        // 100x50 source: scale 0.64 to 64x32, pad 16 rows top and bottom.
        let img = RgbImage::new(100, 50);
        let annotations = boxed([0.0, 0.0, 1.0, 1.0]);
        let (canvas, remapped) = letterbox(&img, 64, &annotations);
        assert_eq!(canvas.dimensions(), (64, 64));
        let bbox = remapped[0].bbox;
        assert!((bbox[0] - 0.0).abs() < 1e-3);
        assert!((bbox[1] - 0.25).abs() < 1e-2);
        assert!((bbox[2] - 1.0).abs() < 1e-3);
        assert!((bbox[3] - 0.75).abs() < 1e-2);
    }

    #[test]
    fn distortion_preserves_dimensions() {
        for _ in 0..8 {
            let mut img = RgbImage::new(16, 16);
            let mut rng = rand::rng();
            maybe_distortion(&mut img, 1.0, 1.5, 1, 12.0, 7, &mut rng);
            assert_eq!(img.dimensions(), (16, 16));
        }
    }

    #[test]
    fn seeded_pipeline_is_reproducible() {
        let pipeline = TransformPipelineBuilder::new()
            .crop(Some((32, 32)), 1.0)
            .seed(Some(42))
            .build();
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 0]));
        let annotations = boxed([0.1, 0.1, 0.9, 0.9]);

        let a = pipeline.apply(img.clone(), &annotations, 3);
        let b = pipeline.apply(img, &annotations, 3);
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.annotations.len(), b.annotations.len());
        for (x, y) in a.annotations.iter().zip(b.annotations.iter()) {
            assert_eq!(x.bbox, y.bbox);
        }
    }

    #[test]
    fn pipeline_reports_dropped_boxes() {
        let pipeline = TransformPipelineBuilder::new()
            .crop(Some((10, 10)), 1.0)
            .flips(0.0, 0.0)
            .brightness_contrast(0.0, 0.0)
            .shift_scale_rotate(0.0, 0.0, 0.0, 0.0)
            .distortion(0.0)
            .min_visibility(0.9)
            .seed(Some(1))
            .build();
        // A sliver box at the far edge of a wide image rarely survives a
        // 10x10 crop at 90% visibility.
        let img = RgbImage::new(1000, 10);
        let annotations = vec![
            Annotation::new(0, [0.999, 0.1, 1.0, 0.9]),
            Annotation::new(0, [0.0, 0.1, 0.001, 0.9]),
        ];
        let out = pipeline.apply(img, &annotations, 0);
        assert_eq!(out.annotations.len() + out.dropped_boxes, 2);
        assert!(out.dropped_boxes >= 1);
    }
}
