//! Building an ONNX graph out of extracted detector weights.
//!
//! The exported graph mirrors the detector's forward pass: a Gemm/Relu chain
//! over the feature vector, sigmoid box and objectness heads, a softmax class
//! head, and the arithmetic corner reordering expressed as Split/Min/Max/
//! Concat so exported boxes satisfy the same ordering the checkpoint does.

use crate::proto::{
    tensor_value_info, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    TensorProto,
};
use models::{DetectorWeights, LayerWeights};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Opset every exported model targets.
pub const ONNX_OPSET: i64 = 12;
pub const IR_VERSION: i64 = 7;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Weights(#[from] models::WeightExtractError),
    #[error("layer {layer} carries {actual} values, expected {expected}")]
    ShapeMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn gemm(name: &str, input: &str, layer: &LayerWeights, output: &str) -> NodeProto {
    NodeProto {
        input: vec![
            input.to_string(),
            format!("{}_w", layer.name),
            format!("{}_b", layer.name),
        ],
        output: vec![output.to_string()],
        name: Some(name.to_string()),
        op_type: Some("Gemm".to_string()),
        ..Default::default()
    }
}

fn unary(op: &str, name: &str, input: &str, output: &str) -> NodeProto {
    NodeProto {
        input: vec![input.to_string()],
        output: vec![output.to_string()],
        name: Some(name.to_string()),
        op_type: Some(op.to_string()),
        ..Default::default()
    }
}

fn binary(op: &str, name: &str, a: &str, b: &str, output: &str) -> NodeProto {
    NodeProto {
        input: vec![a.to_string(), b.to_string()],
        output: vec![output.to_string()],
        name: Some(name.to_string()),
        op_type: Some(op.to_string()),
        ..Default::default()
    }
}

fn push_layer_initializers(
    initializers: &mut Vec<TensorProto>,
    layer: &LayerWeights,
) -> Result<(), ExportError> {
    let expected = layer.d_input * layer.d_output;
    if layer.weight.len() != expected {
        return Err(ExportError::ShapeMismatch {
            layer: layer.name.clone(),
            expected,
            actual: layer.weight.len(),
        });
    }
    if layer.bias.len() != layer.d_output {
        return Err(ExportError::ShapeMismatch {
            layer: format!("{}.bias", layer.name),
            expected: layer.d_output,
            actual: layer.bias.len(),
        });
    }
    // Burn stores Linear weights as [d_input, d_output], which is exactly
    // ONNX Gemm's B operand with transB left at its default.
    initializers.push(TensorProto::floats(
        &format!("{}_w", layer.name),
        &[layer.d_input as i64, layer.d_output as i64],
        layer.weight.clone(),
    ));
    initializers.push(TensorProto::floats(
        &format!("{}_b", layer.name),
        &[layer.d_output as i64],
        layer.bias.clone(),
    ));
    Ok(())
}

/// Assemble the full ONNX model from extracted weights.
pub fn build_model_proto(weights: &DetectorWeights) -> Result<ModelProto, ExportError> {
    let max_boxes = weights.max_boxes as i64;
    let num_classes = weights.num_classes as i64;

    let mut nodes = Vec::new();
    let mut initializers = Vec::new();

    // Backbone: stem plus hidden blocks, ReLU between.
    push_layer_initializers(&mut initializers, &weights.stem)?;
    nodes.push(gemm("stem_gemm", "features", &weights.stem, "stem_out"));
    nodes.push(unary("Relu", "stem_relu", "stem_out", "stem_act"));
    let mut backbone_out = "stem_act".to_string();
    for (i, block) in weights.blocks.iter().enumerate() {
        push_layer_initializers(&mut initializers, block)?;
        let raw = format!("block{i}_out");
        let act = format!("block{i}_act");
        nodes.push(gemm(&format!("block{i}_gemm"), &backbone_out, block, &raw));
        nodes.push(unary("Relu", &format!("block{i}_relu"), &raw, &act));
        backbone_out = act;
    }

    // Box head: sigmoid, reshape, then corner reordering.
    push_layer_initializers(&mut initializers, &weights.box_head)?;
    nodes.push(gemm("box_gemm", &backbone_out, &weights.box_head, "box_raw"));
    nodes.push(unary("Sigmoid", "box_sigmoid", "box_raw", "box_act"));
    initializers.push(TensorProto::int64s(
        "box_shape",
        &[3],
        vec![-1, max_boxes, 4],
    ));
    nodes.push(binary(
        "Reshape",
        "box_reshape",
        "box_act",
        "box_shape",
        "box_grid",
    ));
    nodes.push(NodeProto {
        input: vec!["box_grid".to_string()],
        output: vec![
            "box_x0".to_string(),
            "box_y0".to_string(),
            "box_x1".to_string(),
            "box_y1".to_string(),
        ],
        name: Some("box_split".to_string()),
        op_type: Some("Split".to_string()),
        attribute: vec![
            AttributeProto::int("axis", 2),
            AttributeProto::ints("split", &[1, 1, 1, 1]),
        ],
        ..Default::default()
    });
    nodes.push(binary("Min", "box_xmin", "box_x0", "box_x1", "xmin"));
    nodes.push(binary("Max", "box_xmax", "box_x0", "box_x1", "xmax"));
    nodes.push(binary("Min", "box_ymin", "box_y0", "box_y1", "ymin"));
    nodes.push(binary("Max", "box_ymax", "box_y0", "box_y1", "ymax"));
    nodes.push(NodeProto {
        input: vec![
            "xmin".to_string(),
            "ymin".to_string(),
            "xmax".to_string(),
            "ymax".to_string(),
        ],
        output: vec!["boxes".to_string()],
        name: Some("box_concat".to_string()),
        op_type: Some("Concat".to_string()),
        attribute: vec![AttributeProto::int("axis", 2)],
        ..Default::default()
    });

    // Objectness head.
    push_layer_initializers(&mut initializers, &weights.score_head)?;
    nodes.push(gemm(
        "score_gemm",
        &backbone_out,
        &weights.score_head,
        "score_raw",
    ));
    nodes.push(unary("Sigmoid", "score_sigmoid", "score_raw", "scores"));

    // Class head: reshape then softmax over the class axis.
    push_layer_initializers(&mut initializers, &weights.class_head)?;
    nodes.push(gemm(
        "class_gemm",
        &backbone_out,
        &weights.class_head,
        "class_raw",
    ));
    initializers.push(TensorProto::int64s(
        "class_shape",
        &[3],
        vec![-1, max_boxes, num_classes],
    ));
    nodes.push(binary(
        "Reshape",
        "class_reshape",
        "class_raw",
        "class_shape",
        "class_grid",
    ));
    nodes.push(NodeProto {
        input: vec!["class_grid".to_string()],
        output: vec!["class_probs".to_string()],
        name: Some("class_softmax".to_string()),
        op_type: Some("Softmax".to_string()),
        attribute: vec![AttributeProto::int("axis", 2)],
        ..Default::default()
    });

    let graph = GraphProto {
        node: nodes,
        name: Some("multibox_detector".to_string()),
        initializer: initializers,
        input: vec![tensor_value_info(
            "features",
            &[None, Some(weights.input_dim() as i64)],
        )],
        output: vec![
            tensor_value_info("boxes", &[None, Some(max_boxes), Some(4)]),
            tensor_value_info("scores", &[None, Some(max_boxes)]),
            tensor_value_info("class_probs", &[None, Some(max_boxes), Some(num_classes)]),
        ],
        ..Default::default()
    };

    Ok(ModelProto {
        ir_version: Some(IR_VERSION),
        producer_name: Some(env!("CARGO_PKG_NAME").to_string()),
        producer_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        domain: None,
        model_version: Some(1),
        doc_string: Some("Multibox detector exported for inference".to_string()),
        graph: Some(graph),
        opset_import: vec![OperatorSetIdProto {
            domain: Some(String::new()),
            version: Some(ONNX_OPSET),
        }],
    })
}

/// Encode and write a model to disk.
pub fn write_onnx(model: &ModelProto, path: &Path) -> Result<(), ExportError> {
    use prost::Message;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, model.encode_to_vec()).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
