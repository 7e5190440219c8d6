//! Mask classifier backed by an ONNX Runtime session, and the two load
//! strategies that open one directly from the artifact.
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, ArrayView4};

use crate::classification::domain::mask_classifier::{
    into_probability_rows, ClassifierError, MaskClassifier, TileConvention,
};
use crate::classification::domain::model_loader::{LoadError, LoadStrategy};
use crate::shared::config::PreprocessMode;

use super::compat_shims::{CompatShimRegistry, TOPOLOGY_METADATA_KEY};

/// Memory order the model expects its input batch in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// `(n, 224, 224, 3)`, as exported from Keras.
    Nhwc,
    /// `(n, 3, 224, 224)`.
    Nchw,
}

impl TensorLayout {
    /// Reads the layout from a rank-4 input shape; dynamic dims are negative.
    pub fn from_input_shape(shape: &[i64]) -> Self {
        match shape {
            [_, 3, _, c] if *c != 3 => TensorLayout::Nchw,
            _ => TensorLayout::Nhwc,
        }
    }
}

pub struct OnnxMaskClassifier {
    // `Session::run` needs `&mut self`; inference calls are serialised.
    session: Mutex<ort::session::Session>,
    name: String,
    convention: TileConvention,
    layout: TensorLayout,
}

impl OnnxMaskClassifier {
    pub fn new(session: ort::session::Session, name: &str, convention: TileConvention) -> Self {
        let layout = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    let dims: Vec<i64> = shape.iter().copied().collect();
                    Some(TensorLayout::from_input_shape(&dims))
                } else {
                    None
                }
            })
            .unwrap_or(TensorLayout::Nhwc);
        log::debug!("{name}: input layout {layout:?}, tiles {convention:?}");

        Self {
            session: Mutex::new(session),
            name: name.to_string(),
            convention,
            layout,
        }
    }
}

impl MaskClassifier for OnnxMaskClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn convention(&self) -> TileConvention {
        self.convention
    }

    fn predict(&self, tiles: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let batch = tiles.shape()[0];
        if batch == 0 {
            return Ok(Array2::zeros((0, 0)));
        }

        let input = match self.layout {
            TensorLayout::Nhwc => tiles.to_owned(),
            TensorLayout::Nchw => tiles
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        };
        let input_value = ort::value::Tensor::from_array(input).map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifierError::Poisoned(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(inference_error)?;
        if outputs.len() == 0 {
            return Err(ClassifierError::OutputShape {
                shape: Vec::new(),
                batch,
            });
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;

        into_probability_rows(tensor.shape(), tensor.iter().copied().collect(), batch)
    }
}

fn inference_error(e: ort::Error) -> ClassifierError {
    ClassifierError::Inference(Box::new(e))
}

/// Return the preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU when the platform provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Strategy 1: accelerated session, with any embedded legacy topology
/// validated through the compatibility shims.
pub struct OnnxCompatStrategy {
    registry: CompatShimRegistry,
    mode: PreprocessMode,
}

impl OnnxCompatStrategy {
    pub fn new(registry: CompatShimRegistry, mode: PreprocessMode) -> Self {
        Self { registry, mode }
    }
}

impl LoadStrategy for OnnxCompatStrategy {
    fn name(&self) -> &str {
        "onnx-compat"
    }

    fn load(&self, artifact: &Path) -> Result<Arc<dyn MaskClassifier>, LoadError> {
        let session = open_accelerated(artifact).map_err(runtime_error)?;
        let topology = embedded_topology(&session).map_err(runtime_error)?;

        let convention = match topology {
            Some(json) => {
                let report = self.registry.check_topology(&json)?;
                log::info!(
                    "Embedded topology: {} layers, {} adapted",
                    report.layers,
                    report.adapted.len()
                );
                if report.embedded_normalization {
                    TileConvention::Raw
                } else {
                    self.mode.into()
                }
            }
            None => {
                log::debug!("No embedded topology in {}", artifact.display());
                self.mode.into()
            }
        };

        Ok(Arc::new(OnnxMaskClassifier::new(session, self.name(), convention)))
    }
}

/// Strategy 2: plain CPU session, no graph optimisation, no topology checks.
pub struct PlainOnnxStrategy {
    mode: PreprocessMode,
}

impl PlainOnnxStrategy {
    pub fn new(mode: PreprocessMode) -> Self {
        Self { mode }
    }
}

impl LoadStrategy for PlainOnnxStrategy {
    fn name(&self) -> &str {
        "onnx-plain"
    }

    fn load(&self, artifact: &Path) -> Result<Arc<dyn MaskClassifier>, LoadError> {
        let session = open_plain(artifact).map_err(runtime_error)?;
        Ok(Arc::new(OnnxMaskClassifier::new(
            session,
            self.name(),
            self.mode.into(),
        )))
    }
}

fn open_accelerated(path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(path)?;
    Ok(session)
}

pub(crate) fn open_plain(path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Disable)?
        .commit_from_file(path)?;
    Ok(session)
}

fn embedded_topology(
    session: &ort::session::Session,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let metadata = session.metadata()?;
    Ok(metadata.custom(TOPOLOGY_METADATA_KEY))
}

fn runtime_error(e: Box<dyn std::error::Error>) -> LoadError {
    LoadError::Runtime(e.to_string())
}
