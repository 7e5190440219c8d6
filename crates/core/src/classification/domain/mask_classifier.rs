use ndarray::{Array2, ArrayView4};
use thiserror::Error;

use crate::shared::config::PreprocessMode;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("unexpected output shape {shape:?} for a batch of {batch}")]
    OutputShape { shape: Vec<usize>, batch: usize },
    #[error("classifier lock poisoned: {0}")]
    Poisoned(String),
}

/// Numeric convention a classifier expects its input tiles in.
///
/// Fixed when the classifier is loaded; never re-derived per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileConvention {
    /// Pixel values in [0, 255]. The model normalises internally.
    Raw,
    /// `x / 127.5 - 1`, in [-1, 1].
    MobileNetV2,
}

impl TileConvention {
    pub fn apply(self, value: f32) -> f32 {
        match self {
            TileConvention::Raw => value,
            TileConvention::MobileNetV2 => value / 127.5 - 1.0,
        }
    }
}

impl From<PreprocessMode> for TileConvention {
    fn from(mode: PreprocessMode) -> Self {
        match mode {
            PreprocessMode::None => TileConvention::Raw,
            PreprocessMode::MobileNetV2 => TileConvention::MobileNetV2,
        }
    }
}

/// Domain interface for the loaded mask-state classifier.
///
/// A single instance is shared read-only by every inference call, hence
/// `&self` and `Send + Sync`. Implementations that wrap a runtime without
/// reentrant inference serialise calls internally.
pub trait MaskClassifier: Send + Sync {
    /// Strategy or backend that produced this classifier, for logs.
    fn name(&self) -> &str;

    fn convention(&self) -> TileConvention;

    /// Runs a batch of NHWC tiles `(n, 224, 224, 3)` and returns one
    /// probability row per tile.
    fn predict(&self, tiles: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassifierError>;
}

/// Validates a runtime output as `(batch, classes)`.
pub(crate) fn into_probability_rows(
    shape: &[usize],
    data: Vec<f32>,
    batch: usize,
) -> Result<Array2<f32>, ClassifierError> {
    let bad_shape = || ClassifierError::OutputShape {
        shape: shape.to_vec(),
        batch,
    };
    let classes = match shape {
        [n, c] if *n == batch && *c > 0 => *c,
        [c] if batch == 1 && *c > 0 => *c,
        _ => return Err(bad_shape()),
    };
    Array2::from_shape_vec((batch, classes), data).map_err(|_| bad_shape())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_convention_scaling() {
        assert_relative_eq!(TileConvention::Raw.apply(200.0), 200.0);
        assert_relative_eq!(TileConvention::MobileNetV2.apply(0.0), -1.0);
        assert_relative_eq!(TileConvention::MobileNetV2.apply(255.0), 1.0);
        assert_relative_eq!(TileConvention::MobileNetV2.apply(127.5), 0.0);
    }

    #[test]
    fn test_convention_from_mode() {
        assert_eq!(TileConvention::from(PreprocessMode::None), TileConvention::Raw);
        assert_eq!(
            TileConvention::from(PreprocessMode::MobileNetV2),
            TileConvention::MobileNetV2
        );
    }

    #[test]
    fn test_rows_from_batch_output() {
        let rows = into_probability_rows(&[2, 3], vec![0.1, 0.2, 0.7, 0.3, 0.3, 0.4], 2).unwrap();
        assert_eq!(rows.dim(), (2, 3));
        assert_relative_eq!(rows[[1, 2]], 0.4);
    }

    #[test]
    fn test_rows_from_flat_single_output() {
        let rows = into_probability_rows(&[2], vec![0.9, 0.1], 1).unwrap();
        assert_eq!(rows.dim(), (1, 2));
    }

    #[test]
    fn test_rows_reject_batch_mismatch() {
        let err = into_probability_rows(&[1, 2], vec![0.5, 0.5], 3).unwrap_err();
        assert!(matches!(err, ClassifierError::OutputShape { batch: 3, .. }));
    }
}
