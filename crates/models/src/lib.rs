//! Burn modules for the multibox detector.
//!
//! `MultiboxDetector` maps a per-image feature vector to a fixed slate of
//! candidate boxes, objectness scores, and class logits. It is a pure Burn
//! Module; checkpoint IO and the training loop live in the `training` crate,
//! and weight extraction feeds the ONNX exporter.

use burn::module::Module;
use burn::nn;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct MultiboxDetectorConfig {
    pub hidden: usize,
    pub depth: usize,
    pub max_boxes: usize,
    pub num_classes: usize,
    /// Width of the per-image feature vector.
    pub input_dim: usize,
}

impl Default for MultiboxDetectorConfig {
    fn default() -> Self {
        Self {
            hidden: 128,
            depth: 2,
            max_boxes: 64,
            num_classes: 2,
            input_dim: 8,
        }
    }
}

#[derive(Debug, Module)]
pub struct MultiboxDetector<B: Backend> {
    stem: nn::Linear<B>,
    blocks: Vec<nn::Linear<B>>,
    box_head: nn::Linear<B>,
    score_head: nn::Linear<B>,
    class_head: nn::Linear<B>,
    max_boxes: usize,
    num_classes: usize,
}

impl<B: Backend> MultiboxDetector<B> {
    pub fn new(cfg: MultiboxDetectorConfig, device: &B::Device) -> Self {
        let max_boxes = cfg.max_boxes.max(1);
        let num_classes = cfg.num_classes.max(1);
        let stem = nn::LinearConfig::new(cfg.input_dim, cfg.hidden).init(device);
        let mut blocks = Vec::new();
        for _ in 0..cfg.depth {
            blocks.push(nn::LinearConfig::new(cfg.hidden, cfg.hidden).init(device));
        }
        let box_head = nn::LinearConfig::new(cfg.hidden, max_boxes * 4).init(device);
        let score_head = nn::LinearConfig::new(cfg.hidden, max_boxes).init(device);
        let class_head = nn::LinearConfig::new(cfg.hidden, max_boxes * num_classes).init(device);
        Self {
            stem,
            blocks,
            box_head,
            score_head,
            class_head,
            max_boxes,
            num_classes,
        }
    }

    pub fn max_boxes(&self) -> usize {
        self.max_boxes
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Full forward pass: boxes `[B, max_boxes, 4]` in the corner schema,
    /// objectness `[B, max_boxes]`, class logits `[B, max_boxes, classes]`.
    /// Boxes/scores pass through sigmoid; box corners are reordered
    /// arithmetically so x_min <= x_max and y_min <= y_max always hold.
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
    ) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 3>) {
        let mut x = relu(self.stem.forward(input));
        for block in &self.blocks {
            x = relu(block.forward(x));
        }
        let boxes_flat = sigmoid(self.box_head.forward(x.clone()));
        let scores = sigmoid(self.score_head.forward(x.clone()));
        let class_flat = self.class_head.forward(x);

        let batch = boxes_flat.dims()[0];
        let boxes = boxes_flat.reshape([batch, self.max_boxes, 4]);
        let class_logits = class_flat.reshape([batch, self.max_boxes, self.num_classes]);

        // Reorder to enforce x0 <= x1, y0 <= y1 within [0,1] using arithmetic.
        let x0 = boxes.clone().slice([0..batch, 0..self.max_boxes, 0..1]);
        let y0 = boxes.clone().slice([0..batch, 0..self.max_boxes, 1..2]);
        let x1 = boxes.clone().slice([0..batch, 0..self.max_boxes, 2..3]);
        let y1 = boxes.slice([0..batch, 0..self.max_boxes, 3..4]);

        let dx = x0.clone() - x1.clone();
        let dy = y0.clone() - y1.clone();
        let half = 0.5;

        let x_min = ((x0.clone() + x1.clone() - dx.clone().abs()) * half).clamp(0.0, 1.0);
        let x_max = ((x0 + x1 + dx.abs()) * half).clamp(0.0, 1.0);
        let y_min = ((y0.clone() + y1.clone() - dy.clone().abs()) * half).clamp(0.0, 1.0);
        let y_max = ((y0 + y1 + dy.abs()) * half).clamp(0.0, 1.0);

        let boxes_ordered = Tensor::cat(vec![x_min, y_min, x_max, y_max], 2);

        (boxes_ordered, scores, class_logits)
    }

    /// Copy every layer's parameters out for export.
    pub fn extract_weights(&self) -> Result<DetectorWeights, WeightExtractError> {
        Ok(DetectorWeights {
            stem: extract_linear(&self.stem, "stem")?,
            blocks: self
                .blocks
                .iter()
                .enumerate()
                .map(|(i, block)| extract_linear(block, &format!("block{i}")))
                .collect::<Result<Vec<_>, _>>()?,
            box_head: extract_linear(&self.box_head, "box_head")?,
            score_head: extract_linear(&self.score_head, "score_head")?,
            class_head: extract_linear(&self.class_head, "class_head")?,
            max_boxes: self.max_boxes,
            num_classes: self.num_classes,
        })
    }
}

#[derive(Debug, Error)]
pub enum WeightExtractError {
    #[error("failed to read parameter data for {layer}")]
    Read { layer: String },
}

/// One linear layer's parameters in row-major `[d_input, d_output]` order
/// (Burn's native layout, usable directly as ONNX Gemm B with transB = 0).
#[derive(Debug, Clone)]
pub struct LayerWeights {
    pub name: String,
    pub weight: Vec<f32>,
    pub d_input: usize,
    pub d_output: usize,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct DetectorWeights {
    pub stem: LayerWeights,
    pub blocks: Vec<LayerWeights>,
    pub box_head: LayerWeights,
    pub score_head: LayerWeights,
    pub class_head: LayerWeights,
    pub max_boxes: usize,
    pub num_classes: usize,
}

impl DetectorWeights {
    pub fn input_dim(&self) -> usize {
        self.stem.d_input
    }
}

fn extract_linear<B: Backend>(
    linear: &nn::Linear<B>,
    name: &str,
) -> Result<LayerWeights, WeightExtractError> {
    let dims = linear.weight.val().dims();
    let weight = linear
        .weight
        .val()
        .into_data()
        .to_vec::<f32>()
        .map_err(|_| WeightExtractError::Read {
            layer: name.to_string(),
        })?;
    let bias = match &linear.bias {
        Some(bias) => bias
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|_| WeightExtractError::Read {
                layer: format!("{name}.bias"),
            })?,
        None => vec![0.0; dims[1]],
    };
    Ok(LayerWeights {
        name: name.to_string(),
        weight,
        d_input: dims[0],
        d_output: dims[1],
        bias,
    })
}

pub mod prelude {
    pub use super::{DetectorWeights, LayerWeights, MultiboxDetector, MultiboxDetectorConfig};
}
