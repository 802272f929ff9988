//! Turning dataset samples into Burn tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use data_contracts::stats_from_rgb_u8;
use detect_dataset::{letterbox, load_image, DatasetSample};

/// One collated batch. Boxes are normalized corner boxes on the letterboxed
/// canvas; `box_mask` marks populated slots; `classes` carries class ids for
/// populated slots (zero elsewhere).
#[derive(Debug, Clone)]
pub struct CollatedBatch<B: Backend> {
    /// `[batch, 3, imgsz, imgsz]`, CHW, values in [0, 1].
    pub images: Tensor<B, 4>,
    /// `[batch, max_boxes, 4]`.
    pub boxes: Tensor<B, 3>,
    /// `[batch, max_boxes]`.
    pub box_mask: Tensor<B, 2>,
    /// `[batch, max_boxes]`.
    pub classes: Tensor<B, 2, Int>,
    /// `[batch, 8]` image statistics feature vector.
    pub features: Tensor<B, 2>,
}

/// Load, letterbox, and pack a slice of samples.
pub fn collate<B: Backend>(
    samples: &[DatasetSample],
    imgsz: u32,
    max_boxes: usize,
    device: &B::Device,
) -> anyhow::Result<CollatedBatch<B>> {
    if samples.is_empty() {
        anyhow::bail!("cannot collate empty batch");
    }
    let max_boxes = max_boxes.max(1);
    let side = imgsz as usize;
    let num_pixels = side * side;

    let batch = samples.len();
    let mut image_buf: Vec<f32> = Vec::with_capacity(batch * num_pixels * 3);
    let mut boxes_buf = vec![0.0f32; batch * max_boxes * 4];
    let mut mask_buf = vec![0.0f32; batch * max_boxes];
    let mut class_buf = vec![0i64; batch * max_boxes];
    let mut features: Vec<f32> = Vec::with_capacity(batch * 8);

    for (b, sample) in samples.iter().enumerate() {
        let img = load_image(&sample.index.image_path)?;
        let (canvas, annotations) = letterbox(&img, imgsz, &sample.annotations);

        let stats = stats_from_rgb_u8(imgsz, imgsz, canvas.as_raw())
            .map_err(|e| anyhow::anyhow!("failed to compute image stats: {e}"))?;

        // Normalized pixel data in CHW order.
        for c in 0..3 {
            for y in 0..imgsz {
                for x in 0..imgsz {
                    let p = canvas.get_pixel(x, y);
                    image_buf.push(p[c] as f32 / 255.0);
                }
            }
        }

        let mut count = 0usize;
        for annotation in annotations.iter().take(max_boxes) {
            let base = (b * max_boxes + count) * 4;
            boxes_buf[base..base + 4].copy_from_slice(&annotation.bbox);
            mask_buf[b * max_boxes + count] = 1.0;
            class_buf[b * max_boxes + count] = annotation.class_id as i64;
            count += 1;
        }
        features.extend_from_slice(&stats.feature_vector(count as f32));
    }

    Ok(CollatedBatch {
        images: Tensor::from_data(
            TensorData::new(image_buf, [batch, 3, side, side]),
            device,
        ),
        boxes: Tensor::from_data(TensorData::new(boxes_buf, [batch, max_boxes, 4]), device),
        box_mask: Tensor::from_data(TensorData::new(mask_buf, [batch, max_boxes]), device),
        classes: Tensor::from_data(TensorData::new(class_buf, [batch, max_boxes]), device),
        features: Tensor::from_data(TensorData::new(features, [batch, 8]), device),
    })
}
