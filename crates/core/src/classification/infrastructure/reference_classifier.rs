//! Reference architecture rebuilt from a weight store.
//!
//! Frozen feature backbone (global-pooled) → dropout (identity at
//! inference) → `dense` (128, relu) → `dense_1` (classes, softmax). Dense
//! weights are loaded by layer name; tensors whose shape disagrees with the
//! architecture are skipped and the parameter keeps its zero initialisation.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2, Array3, ArrayView4, Axis};

use crate::classification::domain::mask_classifier::{
    ClassifierError, MaskClassifier, TileConvention,
};
use crate::classification::domain::model_loader::{LoadError, LoadStrategy};
use crate::shared::config::PreprocessMode;

use super::onnx_classifier::open_plain;
use super::weight_store::WeightStore;

/// Width of the hidden dense layer.
pub const HIDDEN_UNITS: usize = 128;

/// Pooled feature width of the MobileNetV2 backbone.
pub const DEFAULT_FEATURE_DIM: usize = 1280;

/// Domain interface for the frozen feature extractor.
pub trait FeatureBackbone: Send + Sync {
    fn feature_dim(&self) -> usize;

    /// `(n, 224, 224, 3)` tiles → `(n, feature_dim)` pooled features.
    fn features(&self, tiles: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError>;
}

// ---------------------------------------------------------------------------
// Dense head
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct DenseLayer {
    /// `(inputs, units)`.
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    fn zeros(inputs: usize, units: usize) -> Self {
        Self {
            kernel: Array2::zeros((inputs, units)),
            bias: Array1::zeros(units),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.kernel) + &self.bias
    }
}

/// What [`DenseHead::load`] took from the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadLoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
}

impl HeadLoadReport {
    fn layer_loaded(&self, layer: &str) -> bool {
        let prefix = format!("{layer}/");
        self.loaded.iter().any(|name| name.starts_with(&prefix))
    }
}

#[derive(Clone, Debug)]
pub struct DenseHead {
    hidden: DenseLayer,
    output: DenseLayer,
}

impl DenseHead {
    pub fn new(feature_dim: usize, classes: usize) -> Self {
        Self {
            hidden: DenseLayer::zeros(feature_dim, HIDDEN_UNITS),
            output: DenseLayer::zeros(HIDDEN_UNITS, classes),
        }
    }

    pub fn classes(&self) -> usize {
        self.output.bias.len()
    }

    /// Copies matching `dense/*` and `dense_1/*` tensors into the head.
    /// Fails only when neither layer received any weights.
    pub fn load(&mut self, store: &WeightStore) -> Result<HeadLoadReport, LoadError> {
        let mut report = HeadLoadReport::default();
        for (layer_name, layer) in [("dense", &mut self.hidden), ("dense_1", &mut self.output)] {
            assign(store, layer_name, "kernel", &mut layer.kernel, &mut report);
            assign(store, layer_name, "bias", &mut layer.bias, &mut report);
        }
        if !report.layer_loaded("dense") && !report.layer_loaded("dense_1") {
            return Err(LoadError::NoMatchingWeights);
        }
        for layer in ["dense", "dense_1"] {
            if !report.layer_loaded(layer) {
                log::warn!("Layer {layer} has no usable weights; left zero-initialised");
            }
        }
        Ok(report)
    }

    /// `(n, feature_dim)` → `(n, classes)` probabilities.
    pub fn forward(&self, features: &Array2<f32>) -> Array2<f32> {
        let hidden = self.hidden.forward(features).mapv(|v| v.max(0.0));
        let mut logits = self.output.forward(&hidden);
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            if sum > 0.0 {
                row /= sum;
            }
        }
        logits
    }
}

fn assign<D: ndarray::Dimension>(
    store: &WeightStore,
    layer: &str,
    param: &str,
    target: &mut ndarray::Array<f32, D>,
    report: &mut HeadLoadReport,
) {
    let name = format!("{layer}/{param}");
    let Some(tensor) = store.get(layer, param) else {
        log::debug!("No weights for {name}");
        return;
    };
    if tensor.shape != target.shape() {
        log::warn!(
            "Skipping {name}: shape {:?} does not match {:?}",
            tensor.shape,
            target.shape()
        );
        report.skipped.push(name);
        return;
    }
    for (dst, src) in target.iter_mut().zip(&tensor.values) {
        *dst = *src;
    }
    report.loaded.push(name);
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct ReferenceClassifier {
    backbone: Arc<dyn FeatureBackbone>,
    head: DenseHead,
    convention: TileConvention,
}

impl ReferenceClassifier {
    pub fn new(backbone: Arc<dyn FeatureBackbone>, head: DenseHead, convention: TileConvention) -> Self {
        Self {
            backbone,
            head,
            convention,
        }
    }
}

impl MaskClassifier for ReferenceClassifier {
    fn name(&self) -> &str {
        "reference-reconstruction"
    }

    fn convention(&self) -> TileConvention {
        self.convention
    }

    fn predict(&self, tiles: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let batch = tiles.shape()[0];
        let features = self.backbone.features(tiles)?;
        if features.nrows() != batch || features.ncols() != self.backbone.feature_dim() {
            return Err(ClassifierError::OutputShape {
                shape: features.shape().to_vec(),
                batch,
            });
        }
        Ok(self.head.forward(&features))
    }
}

/// Pooled MobileNetV2 feature extractor run by ONNX Runtime.
pub struct OnnxBackbone {
    session: Mutex<ort::session::Session>,
    feature_dim: usize,
}

impl OnnxBackbone {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_plain(path)?;
        let feature_dim = session
            .outputs()
            .first()
            .and_then(|output| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = output.dtype() {
                    shape.last().filter(|&&d| d > 0).map(|&d| d as usize)
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_FEATURE_DIM);
        Ok(Self {
            session: Mutex::new(session),
            feature_dim,
        })
    }
}

impl FeatureBackbone for OnnxBackbone {
    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn features(&self, tiles: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let batch = tiles.shape()[0];
        if batch == 0 {
            return Ok(Array2::zeros((0, self.feature_dim)));
        }
        let inference = |e: ort::Error| ClassifierError::Inference(Box::new(e));
        let input_value = ort::value::Tensor::from_array(tiles.to_owned()).map_err(inference)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifierError::Poisoned(e.to_string()))?;
        let outputs = session.run(ort::inputs![input_value]).map_err(inference)?;
        if outputs.len() == 0 {
            return Err(ClassifierError::OutputShape {
                shape: Vec::new(),
                batch,
            });
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(inference)?;

        let shape = tensor.shape().to_vec();
        let values: Vec<f32> = tensor.iter().copied().collect();
        pool_features(&shape, values, batch)
    }
}

/// Averages `(n, ..., c)` backbone output over every axis between batch and
/// channels. Already-pooled `(n, c)` output passes through.
fn pool_features(shape: &[usize], values: Vec<f32>, batch: usize) -> Result<Array2<f32>, ClassifierError> {
    let bad_shape = || ClassifierError::OutputShape {
        shape: shape.to_vec(),
        batch,
    };
    let dim = shape.last().copied().unwrap_or(0);
    if dim == 0 || values.len() % (batch * dim) != 0 {
        return Err(bad_shape());
    }
    let spatial = values.len() / (batch * dim);
    let grid = Array3::from_shape_vec((batch, spatial, dim), values).map_err(|_| bad_shape())?;
    grid.mean_axis(Axis(1)).ok_or_else(bad_shape)
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

enum BackboneSource {
    OnnxFile(PathBuf),
    Provided(Arc<dyn FeatureBackbone>),
}

/// Strategy 3: rebuild the reference architecture and load weights by name.
pub struct ReferenceReconstructionStrategy {
    backbone: BackboneSource,
    mode: PreprocessMode,
}

impl ReferenceReconstructionStrategy {
    pub fn new(backbone_path: PathBuf, mode: PreprocessMode) -> Self {
        Self {
            backbone: BackboneSource::OnnxFile(backbone_path),
            mode,
        }
    }

    pub fn with_backbone(backbone: Arc<dyn FeatureBackbone>, mode: PreprocessMode) -> Self {
        Self {
            backbone: BackboneSource::Provided(backbone),
            mode,
        }
    }

    fn open_backbone(&self) -> Result<Arc<dyn FeatureBackbone>, LoadError> {
        match &self.backbone {
            BackboneSource::Provided(backbone) => Ok(backbone.clone()),
            BackboneSource::OnnxFile(path) => {
                log::info!("Opening reference backbone {}", path.display());
                let backbone = OnnxBackbone::open(path)
                    .map_err(|e| LoadError::Backbone(format!("{}: {e}", path.display())))?;
                Ok(Arc::new(backbone))
            }
        }
    }
}

impl LoadStrategy for ReferenceReconstructionStrategy {
    fn name(&self) -> &str {
        "reference-reconstruction"
    }

    fn load(&self, artifact: &Path) -> Result<Arc<dyn MaskClassifier>, LoadError> {
        let store_path =
            WeightStore::locate_for(artifact).map_err(|e| LoadError::WeightStore(e.to_string()))?;
        let store =
            WeightStore::open(&store_path).map_err(|e| LoadError::WeightStore(e.to_string()))?;
        let classes = store.class_count_or_default();

        let backbone = self.open_backbone()?;
        let mut head = DenseHead::new(backbone.feature_dim(), classes);
        let report = head.load(&store)?;
        log::info!(
            "Reference head: {classes} classes, loaded {:?}, skipped {:?}",
            report.loaded,
            report.skipped
        );

        Ok(Arc::new(ReferenceClassifier::new(
            backbone,
            head,
            self.mode.into(),
        )))
    }
}
