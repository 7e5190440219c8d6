//! Adapters for legacy layer definitions embedded in exported models.
//!
//! Converted models may carry their original layer topology as JSON in the
//! ONNX metadata. Older exports use layer classes or config keys the current
//! toolchain no longer accepts; each shim recognises one such layer and
//! reports what the loader must honour for it. Shims are consulted in
//! registration order.
use serde_json::{Map, Value};

use crate::classification::domain::model_loader::LoadError;

/// ONNX metadata key holding the serialised layer topology.
pub const TOPOLOGY_METADATA_KEY: &str = "keras_model_config";

/// Layer classes accepted without adaptation.
const NATIVE_LAYERS: &[&str] = &[
    "Activation",
    "Add",
    "AveragePooling2D",
    "BatchNormalization",
    "Concatenate",
    "Conv2D",
    "Dense",
    "Dropout",
    "Flatten",
    "Functional",
    "GlobalAveragePooling2D",
    "InputLayer",
    "MaxPooling2D",
    "Model",
    "Multiply",
    "Normalization",
    "ReLU",
    "Rescaling",
    "Reshape",
    "Sequential",
    "Softmax",
    "ZeroPadding2D",
];

/// Side effect of an adaptation that the loader must honour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShimEffect {
    None,
    /// The model scales `[0, 255]` input to `[-1, 1]` itself.
    EmbeddedNormalization,
}

pub trait CompatShim: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, class_name: &str, config: &Map<String, Value>) -> bool;

    fn effect(&self, config: &Map<String, Value>) -> ShimEffect;
}

/// Legacy `TrueDivide` op: `x / 127.5 - 1` baked into the graph.
pub struct TrueDivideShim;

impl CompatShim for TrueDivideShim {
    fn name(&self) -> &'static str {
        "TrueDivide"
    }

    fn matches(&self, class_name: &str, config: &Map<String, Value>) -> bool {
        class_name == "TrueDivide"
            || (class_name == "TFOpLambda"
                && config.get("function").and_then(Value::as_str) == Some("math.truediv"))
    }

    fn effect(&self, _config: &Map<String, Value>) -> ShimEffect {
        ShimEffect::EmbeddedNormalization
    }
}

/// Depthwise convolutions, including exports carrying a stray `groups` key.
pub struct DepthwiseConvShim;

impl CompatShim for DepthwiseConvShim {
    fn name(&self) -> &'static str {
        "DepthwiseConv2D"
    }

    fn matches(&self, class_name: &str, _config: &Map<String, Value>) -> bool {
        matches!(class_name, "DepthwiseConv2D" | "CompatibleDepthwiseConv2D")
    }

    fn effect(&self, _config: &Map<String, Value>) -> ShimEffect {
        ShimEffect::None
    }
}

/// What walking a topology through the registry produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TopologyReport {
    pub layers: usize,
    /// `(layer name, shim name)` for every adapted layer.
    pub adapted: Vec<(String, &'static str)>,
    pub embedded_normalization: bool,
}

pub struct CompatShimRegistry {
    shims: Vec<Box<dyn CompatShim>>,
}

impl CompatShimRegistry {
    pub fn new(shims: Vec<Box<dyn CompatShim>>) -> Self {
        Self { shims }
    }

    /// Registry with every built-in shim, in priority order.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(TrueDivideShim), Box::new(DepthwiseConvShim)])
    }

    pub fn shim_names(&self) -> Vec<&'static str> {
        self.shims.iter().map(|s| s.name()).collect()
    }

    /// Walks every layer, nested models included. Fails on the first layer
    /// that is neither native nor handled by a shim.
    pub fn check_topology(&self, json: &str) -> Result<TopologyReport, LoadError> {
        let topology: Value =
            serde_json::from_str(json).map_err(|e| LoadError::Topology(e.to_string()))?;
        let mut report = TopologyReport {
            layers: 0,
            adapted: Vec::new(),
            embedded_normalization: false,
        };
        self.visit(&topology, &mut report)?;
        Ok(report)
    }

    fn visit(&self, layer: &Value, report: &mut TopologyReport) -> Result<(), LoadError> {
        let Some(obj) = layer.as_object() else {
            return Err(LoadError::Topology("layer is not an object".into()));
        };
        let class_name = obj
            .get("class_name")
            .and_then(Value::as_str)
            .ok_or_else(|| LoadError::Topology("layer without class_name".into()))?
            .to_string();
        let empty = Map::new();
        let config = match obj.get("config") {
            Some(Value::Object(config)) => config,
            _ => &empty,
        };
        let layer_name = config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&class_name)
            .to_string();
        report.layers += 1;

        if let Some(shim) = self.shims.iter().find(|s| s.matches(&class_name, config)) {
            log::debug!("Adapting layer {layer_name} with shim {}", shim.name());
            if shim.effect(config) == ShimEffect::EmbeddedNormalization {
                report.embedded_normalization = true;
            }
            report.adapted.push((layer_name, shim.name()));
        } else if !NATIVE_LAYERS.contains(&class_name.as_str()) {
            return Err(LoadError::UnknownLayer {
                class_name,
                layer: layer_name,
            });
        }

        if let Some(Value::Array(children)) = config.get("layers") {
            for child in children {
                self.visit(child, report)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_topology() -> String {
        json!({
            "class_name": "Functional",
            "config": {
                "name": "mask_model",
                "layers": [
                    {"class_name": "InputLayer", "config": {"name": "input_1"}},
                    {"class_name": "TrueDivide", "config": {"name": "tf.math.truediv"}},
                    {
                        "class_name": "Functional",
                        "config": {
                            "name": "mobilenetv2_1.00_224",
                            "layers": [
                                {"class_name": "Conv2D", "config": {"name": "Conv1"}},
                                {
                                    "class_name": "DepthwiseConv2D",
                                    "config": {"name": "expanded_conv_depthwise", "groups": 1}
                                }
                            ]
                        }
                    },
                    {"class_name": "GlobalAveragePooling2D", "config": {"name": "pool"}},
                    {"class_name": "Dropout", "config": {"name": "dropout"}},
                    {"class_name": "Dense", "config": {"name": "dense"}},
                    {"class_name": "Dense", "config": {"name": "dense_1"}}
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_legacy_topology_is_adapted() {
        let report = CompatShimRegistry::standard()
            .check_topology(&legacy_topology())
            .unwrap();
        assert_eq!(report.layers, 10);
        assert!(report.embedded_normalization);
        assert_eq!(
            report.adapted,
            vec![
                ("tf.math.truediv".to_string(), "TrueDivide"),
                ("expanded_conv_depthwise".to_string(), "DepthwiseConv2D"),
            ]
        );
    }

    #[test]
    fn test_depthwise_with_groups_keeps_convention() {
        let topology = json!({
            "class_name": "DepthwiseConv2D",
            "config": {"name": "expanded_conv_depthwise", "groups": 1}
        });
        let report = CompatShimRegistry::standard()
            .check_topology(&topology.to_string())
            .unwrap();
        assert_eq!(
            report.adapted,
            vec![("expanded_conv_depthwise".to_string(), "DepthwiseConv2D")]
        );
        assert!(!report.embedded_normalization);
    }

    #[test]
    fn test_tf_op_lambda_truediv_matches() {
        let topology = json!({
            "class_name": "TFOpLambda",
            "config": {"name": "tf.math.truediv", "function": "math.truediv"}
        });
        let report = CompatShimRegistry::standard()
            .check_topology(&topology.to_string())
            .unwrap();
        assert!(report.embedded_normalization);
    }

    #[test]
    fn test_unknown_layer_fails() {
        let topology = json!({
            "class_name": "Sequential",
            "config": {"name": "seq", "layers": [
                {"class_name": "CustomAttention", "config": {"name": "attn"}}
            ]}
        });
        let err = CompatShimRegistry::standard()
            .check_topology(&topology.to_string())
            .unwrap_err();
        match err {
            LoadError::UnknownLayer { class_name, layer } => {
                assert_eq!(class_name, "CustomAttention");
                assert_eq!(layer, "attn");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_registry_rejects_legacy_layers() {
        let err = CompatShimRegistry::new(Vec::new())
            .check_topology(&legacy_topology())
            .unwrap_err();
        assert!(matches!(err, LoadError::UnknownLayer { .. }));
    }

    #[test]
    fn test_plain_topology_needs_no_shims() {
        let topology = json!({"class_name": "Dense", "config": {"name": "d"}});
        let report = CompatShimRegistry::standard()
            .check_topology(&topology.to_string())
            .unwrap();
        assert!(report.adapted.is_empty());
        assert!(!report.embedded_normalization);
    }

    #[test]
    fn test_malformed_json() {
        let err = CompatShimRegistry::standard()
            .check_topology("{not json")
            .unwrap_err();
        assert!(matches!(err, LoadError::Topology(_)));
    }

    #[test]
    fn test_shim_names_in_priority_order() {
        assert_eq!(
            CompatShimRegistry::standard().shim_names(),
            vec!["TrueDivide", "DepthwiseConv2D"]
        );
    }
}
