//! Named weight tensors read from a `safetensors` file.
//!
//! Keras-style names (`model_weights/dense_1/dense_1/kernel:0`,
//! `dense_1.bias`) are normalised to `layer/param` so architectures can look
//! weights up by layer name.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use safetensors::{Dtype, SafeTensors};
use thiserror::Error;

pub const WEIGHT_STORE_EXTENSION: &str = "safetensors";

/// Class count assumed when the store has no usable dense layer.
pub const DEFAULT_CLASS_COUNT: usize = 2;

#[derive(Error, Debug)]
pub enum WeightStoreError {
    #[error("failed to read weight store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid weight store: {0}")]
    Parse(String),
    #[error("no weight store next to {0}")]
    Missing(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeightTensor {
    /// Name as written in the file.
    pub raw_name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// A tensor the store could not convert to `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedTensor {
    pub raw_name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct WeightStore {
    tensors: BTreeMap<String, WeightTensor>,
    skipped: Vec<SkippedTensor>,
}

impl WeightStore {
    pub fn open(path: &Path) -> Result<Self, WeightStoreError> {
        log::debug!("Reading weight store {}", path.display());
        let bytes = std::fs::read(path).map_err(|e| WeightStoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WeightStoreError> {
        let file =
            SafeTensors::deserialize(bytes).map_err(|e| WeightStoreError::Parse(e.to_string()))?;

        let mut store = WeightStore::default();
        for raw_name in file.names() {
            let view = file
                .tensor(raw_name)
                .map_err(|e| WeightStoreError::Parse(e.to_string()))?;
            let shape = view.shape().to_vec();

            let Some(values) = to_f32(view.dtype(), view.data()) else {
                log::warn!("Skipping tensor {raw_name}: unsupported dtype {:?}", view.dtype());
                store.skipped.push(SkippedTensor {
                    raw_name: raw_name.clone(),
                    dtype: format!("{:?}", view.dtype()),
                    shape,
                });
                continue;
            };

            let key = normalize_name(raw_name);
            if store.tensors.contains_key(&key) {
                log::debug!("Duplicate weight {key} from {raw_name}, keeping the first");
                continue;
            }
            store.tensors.insert(
                key,
                WeightTensor {
                    raw_name: raw_name.clone(),
                    shape,
                    values,
                },
            );
        }
        Ok(store)
    }

    /// The weight store for an artifact: the artifact itself when it is a
    /// `.safetensors` file, otherwise a sibling with that extension.
    pub fn locate_for(artifact: &Path) -> Result<PathBuf, WeightStoreError> {
        let is_store = artifact
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(WEIGHT_STORE_EXTENSION));
        if is_store && artifact.is_file() {
            return Ok(artifact.to_path_buf());
        }
        let sibling = artifact.with_extension(WEIGHT_STORE_EXTENSION);
        if sibling.is_file() {
            return Ok(sibling);
        }
        Err(WeightStoreError::Missing(artifact.to_path_buf()))
    }

    pub fn get(&self, layer: &str, param: &str) -> Option<&WeightTensor> {
        self.tensors.get(&format!("{layer}/{param}"))
    }

    /// Normalised names and tensors, sorted by name.
    pub fn tensors(&self) -> impl Iterator<Item = (&str, &WeightTensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn skipped(&self) -> &[SkippedTensor] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Output width of the classifier head.
    ///
    /// Final dense bias length, else final dense kernel last dimension, else
    /// the last dimension of the highest-numbered dense kernel.
    pub fn infer_class_count(&self) -> Option<usize> {
        if let Some(bias) = self.get("dense_1", "bias") {
            if let [classes] = bias.shape[..] {
                return Some(classes);
            }
        }
        if let Some(kernel) = self.get("dense_1", "kernel") {
            if let [_, classes] = kernel.shape[..] {
                return Some(classes);
            }
        }
        self.tensors
            .iter()
            .filter_map(|(name, t)| match t.shape[..] {
                [_, classes] => dense_index(name).map(|index| (index, classes)),
                _ => None,
            })
            .max_by_key(|&(index, _)| index)
            .map(|(_, classes)| classes)
    }

    pub fn class_count_or_default(&self) -> usize {
        match self.infer_class_count() {
            Some(classes) => {
                log::info!("Inferred {classes} classes from weights");
                classes
            }
            None => {
                log::warn!("Could not infer class count, assuming {DEFAULT_CLASS_COUNT}");
                DEFAULT_CLASS_COUNT
            }
        }
    }
}

/// `dense/kernel` → 0, `dense_12/kernel` → 12; anything else is not a
/// numbered dense kernel.
fn dense_index(name: &str) -> Option<u32> {
    let suffix = name.strip_suffix("/kernel")?.strip_prefix("dense")?;
    if suffix.is_empty() {
        return Some(0);
    }
    suffix.strip_prefix('_')?.parse().ok()
}

/// `model_weights/dense_1/dense_1/kernel:0` → `dense_1/kernel`.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = match raw.rsplit_once(':') {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_digit()) => head,
        _ => raw,
    };
    let parts: Vec<&str> = trimmed
        .split(['/', '.'])
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [.., layer, param] => format!("{layer}/{param}"),
        [single] => single.to_string(),
        [] => String::new(),
    }
}

fn to_f32(dtype: Dtype, data: &[u8]) -> Option<Vec<f32>> {
    match dtype {
        Dtype::F32 => Some(match bytemuck::try_cast_slice::<u8, f32>(data) {
            Ok(values) => values.to_vec(),
            Err(_) => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }),
        Dtype::F64 => Some(
            data.chunks_exact(8)
                .map(|b| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    f64::from_le_bytes(raw) as f32
                })
                .collect(),
        ),
        _ => None,
    }
}
