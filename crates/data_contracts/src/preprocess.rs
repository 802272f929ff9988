use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("pixel buffer length {len} does not match {width}x{height}x3")]
    BufferMismatch { len: usize, width: u32, height: u32 },
    #[error("image has zero area ({width}x{height})")]
    ZeroArea { width: u32, height: u32 },
}

/// Per-image statistics used as global model features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    /// Per-channel mean in [0, 1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation.
    pub std: [f32; 3],
    /// width / height.
    pub aspect: f32,
}

impl ImageStats {
    /// The 8-wide feature vector consumed by batch collation:
    /// mean RGB, std RGB, aspect ratio, box count.
    pub fn feature_vector(&self, box_count: f32) -> [f32; 8] {
        [
            self.mean[0],
            self.mean[1],
            self.mean[2],
            self.std[0],
            self.std[1],
            self.std[2],
            self.aspect,
            box_count,
        ]
    }
}

/// Statistics from an interleaved RGB u8 buffer (as `image::RgbImage::as_raw`).
pub fn stats_from_rgb_u8(width: u32, height: u32, raw: &[u8]) -> Result<ImageStats, PreprocessError> {
    let pixels = (width as usize) * (height as usize);
    if pixels == 0 {
        return Err(PreprocessError::ZeroArea { width, height });
    }
    if raw.len() != pixels * 3 {
        return Err(PreprocessError::BufferMismatch {
            len: raw.len(),
            width,
            height,
        });
    }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for px in raw.chunks_exact(3) {
        for c in 0..3 {
            let v = px[c] as f64 / 255.0;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    Ok(finish(sum, sum_sq, pixels, width, height))
}

/// Statistics from a planar CHW f32 buffer with values in [0, 1].
pub fn stats_from_chw_f32(
    width: usize,
    height: usize,
    data: &[f32],
) -> Result<ImageStats, PreprocessError> {
    let pixels = width * height;
    if pixels == 0 {
        return Err(PreprocessError::ZeroArea {
            width: width as u32,
            height: height as u32,
        });
    }
    if data.len() != pixels * 3 {
        return Err(PreprocessError::BufferMismatch {
            len: data.len(),
            width: width as u32,
            height: height as u32,
        });
    }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for c in 0..3 {
        for &v in &data[c * pixels..(c + 1) * pixels] {
            let v = v as f64;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    Ok(finish(sum, sum_sq, pixels, width as u32, height as u32))
}

fn finish(sum: [f64; 3], sum_sq: [f64; 3], pixels: usize, width: u32, height: u32) -> ImageStats {
    let n = pixels as f64;
    let mut mean = [0.0f32; 3];
    let mut std = [0.0f32; 3];
    for c in 0..3 {
        let m = sum[c] / n;
        mean[c] = m as f32;
        std[c] = (sum_sq[c] / n - m * m).max(0.0).sqrt() as f32;
    }
    ImageStats {
        mean,
        std,
        aspect: width as f32 / height as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_has_zero_std() {
        let raw = vec![128u8; 4 * 4 * 3];
        let stats = stats_from_rgb_u8(4, 4, &raw).unwrap();
        for c in 0..3 {
            assert!((stats.mean[c] - 128.0 / 255.0).abs() < 1e-6);
            assert!(stats.std[c] < 1e-6);
        }
        assert!((stats.aspect - 1.0).abs() < 1e-6);
    }

    #[test]
    fn chw_and_interleaved_agree() {
        // 2x1 image: black pixel then white pixel.
        let raw = [0u8, 0, 0, 255, 255, 255];
        let chw = [0.0f32, 1.0, 0.0, 1.0, 0.0, 1.0];
        let a = stats_from_rgb_u8(2, 1, &raw).unwrap();
        let b = stats_from_chw_f32(2, 1, &chw).unwrap();
        for c in 0..3 {
            assert!((a.mean[c] - b.mean[c]).abs() < 1e-6);
            assert!((a.std[c] - b.std[c]).abs() < 1e-6);
        }
    }

    #[test]
    fn buffer_mismatch_is_reported() {
        assert!(matches!(
            stats_from_rgb_u8(4, 4, &[0u8; 5]),
            Err(PreprocessError::BufferMismatch { .. })
        ));
    }

    #[test]
    fn feature_vector_layout() {
        let stats = ImageStats {
            mean: [0.1, 0.2, 0.3],
            std: [0.4, 0.5, 0.6],
            aspect: 1.5,
        };
        let features = stats.feature_vector(2.0);
        assert_eq!(features, [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 1.5, 2.0]);
    }
}
