//! Export smoke tests: build a graph from real weights and decode it back.

use models::{MultiboxDetector, MultiboxDetectorConfig};
use onnx_export::proto::ModelProto;
use onnx_export::{build_model_proto, write_onnx, IR_VERSION, ONNX_OPSET};
use prost::Message;

type TestBackend = burn_ndarray::NdArray<f32>;

fn small_config() -> MultiboxDetectorConfig {
    MultiboxDetectorConfig {
        hidden: 8,
        depth: 1,
        max_boxes: 4,
        num_classes: 3,
        input_dim: 8,
    }
}

fn small_weights() -> models::DetectorWeights {
    let device = Default::default();
    let model = MultiboxDetector::<TestBackend>::new(small_config(), &device);
    model.extract_weights().unwrap()
}

#[test]
fn exported_graph_has_expected_structure() {
    let proto = build_model_proto(&small_weights()).unwrap();
    assert_eq!(proto.ir_version, Some(IR_VERSION));
    assert_eq!(proto.opset_import.len(), 1);
    assert_eq!(proto.opset_import[0].version, Some(ONNX_OPSET));

    let graph = proto.graph.as_ref().unwrap();
    assert_eq!(graph.input.len(), 1);
    assert_eq!(graph.input[0].name.as_deref(), Some("features"));
    let output_names: Vec<_> = graph
        .output
        .iter()
        .map(|o| o.name.as_deref().unwrap())
        .collect();
    assert_eq!(output_names, vec!["boxes", "scores", "class_probs"]);

    // stem + 1 block + 3 heads, weight and bias each, plus 2 reshape shapes.
    assert_eq!(graph.initializer.len(), 2 * 5 + 2);

    // Every float initializer's payload matches its declared dims.
    for init in &graph.initializer {
        let count = init.element_count();
        if !init.float_data.is_empty() {
            assert_eq!(init.float_data.len(), count, "{:?}", init.name);
        } else {
            assert_eq!(init.int64_data.len(), count, "{:?}", init.name);
        }
    }

    let ops: Vec<_> = graph
        .node
        .iter()
        .map(|n| n.op_type.as_deref().unwrap())
        .collect();
    for expected in [
        "Gemm", "Relu", "Sigmoid", "Reshape", "Split", "Min", "Max", "Concat", "Softmax",
    ] {
        assert!(ops.contains(&expected), "missing op {expected}");
    }

    // Every node input is either a graph input, an initializer, or an
    // earlier node's output.
    let mut known: Vec<String> = graph
        .input
        .iter()
        .filter_map(|i| i.name.clone())
        .chain(graph.initializer.iter().filter_map(|i| i.name.clone()))
        .collect();
    for node in &graph.node {
        for input in &node.input {
            assert!(known.contains(input), "dangling input {input}");
        }
        known.extend(node.output.iter().cloned());
    }
    for output in &graph.output {
        assert!(known.contains(output.name.as_ref().unwrap()));
    }
}

#[test]
fn written_model_decodes_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("exported/best.onnx");

    let proto = build_model_proto(&small_weights()).unwrap();
    write_onnx(&proto, &out).unwrap();

    let bytes = std::fs::read(&out).unwrap();
    let decoded = ModelProto::decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded.opset_import[0].version, Some(ONNX_OPSET));
    let graph = decoded.graph.unwrap();
    assert_eq!(graph.node.len(), proto.graph.unwrap().node.len());
}

#[test]
fn shape_mismatch_is_rejected() {
    let mut weights = small_weights();
    weights.stem.weight.pop();
    assert!(build_model_proto(&weights).is_err());
}
