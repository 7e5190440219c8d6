use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use super::constants::*;

pub const DEFAULT_MASK_THRESHOLD: f32 = 0.80;
pub const DEFAULT_NO_MASK_THRESHOLD: f32 = 0.80;
pub const DEFAULT_IMPROPER_THRESHOLD: f32 = 0.65;
pub const DEFAULT_DELTA_THRESHOLD: f32 = 0.20;
pub const DEFAULT_FACE_CROP_MARGIN: f64 = 0.15;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a number")]
    NotANumber { key: &'static str, value: String },
    #[error("{key}={value} must lie in [0, 1]")]
    OutOfRange { key: &'static str, value: f64 },
    #[error("{key}={value:?} is not one of: {expected}")]
    UnknownVariant {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Index meaning of a 2- or 3-class probability vector.
///
/// The third class, when present, is always "improper".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClassOrder {
    #[default]
    MaskFirst,
    NoMaskFirst,
}

impl FromStr for ClassOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mask_first" => Ok(Self::MaskFirst),
            "no_mask_first" => Ok(Self::NoMaskFirst),
            _ => Err(()),
        }
    }
}

/// Numeric convention of classifier input tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PreprocessMode {
    /// Raw pixel values in [0, 255]; the classifier normalizes internally.
    None,
    /// MobileNetV2 scaling, `x / 127.5 - 1`, into [-1, 1].
    #[default]
    MobileNetV2,
}

impl FromStr for PreprocessMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "mobilenet_v2" | "mv2" => Ok(Self::MobileNetV2),
            _ => Err(()),
        }
    }
}

/// Decision-engine thresholds. All values lie in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub mask: f32,
    pub no_mask: f32,
    pub improper: f32,
    /// Minimum gap between the top two probabilities for a confident decision.
    pub delta: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mask: DEFAULT_MASK_THRESHOLD,
            no_mask: DEFAULT_NO_MASK_THRESHOLD,
            improper: DEFAULT_IMPROPER_THRESHOLD,
            delta: DEFAULT_DELTA_THRESHOLD,
        }
    }
}

/// Process-wide settings, read once at startup and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskConfig {
    pub thresholds: Thresholds,
    pub class_order: ClassOrder,
    pub force_argmax: bool,
    pub debug_predictions: bool,
    pub preprocess_mode: PreprocessMode,
    pub face_crop_margin: f64,
    pub model_override: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
    pub backbone_path: Option<PathBuf>,
    pub detector_path: Option<PathBuf>,
    pub label_font: Option<PathBuf>,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            class_order: ClassOrder::default(),
            force_argmax: false,
            debug_predictions: false,
            preprocess_mode: PreprocessMode::default(),
            face_crop_margin: DEFAULT_FACE_CROP_MARGIN,
            model_override: None,
            models_dir: None,
            backbone_path: None,
            detector_path: None,
            label_font: None,
        }
    }
}

impl MaskConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset or blank keys
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let path = |key: &str| get(key).map(PathBuf::from);

        let class_order = match get(ENV_CLASS_ORDER) {
            Some(v) => v.parse().map_err(|_| ConfigError::UnknownVariant {
                key: ENV_CLASS_ORDER,
                value: v,
                expected: "mask_first, no_mask_first",
            })?,
            None => ClassOrder::default(),
        };

        let preprocess_mode = match get(ENV_PREPROCESS_MODE) {
            Some(v) => v.parse().map_err(|_| ConfigError::UnknownVariant {
                key: ENV_PREPROCESS_MODE,
                value: v,
                expected: "none, mobilenet_v2",
            })?,
            None => PreprocessMode::default(),
        };

        let thresholds = Thresholds {
            mask: unit_float(&get, ENV_MASK_THRESHOLD, DEFAULT_MASK_THRESHOLD as f64)? as f32,
            no_mask: unit_float(&get, ENV_NO_MASK_THRESHOLD, DEFAULT_NO_MASK_THRESHOLD as f64)?
                as f32,
            improper: unit_float(&get, ENV_IMPROPER_THRESHOLD, DEFAULT_IMPROPER_THRESHOLD as f64)?
                as f32,
            delta: unit_float(&get, ENV_DELTA_THRESHOLD, DEFAULT_DELTA_THRESHOLD as f64)? as f32,
        };

        Ok(Self {
            thresholds,
            class_order,
            force_argmax: flag(&get, ENV_FORCE_ARGMAX),
            debug_predictions: flag(&get, ENV_DEBUG_PRED),
            preprocess_mode,
            face_crop_margin: unit_float(&get, ENV_FACE_CROP_MARGIN, DEFAULT_FACE_CROP_MARGIN)?,
            model_override: path(ENV_MODEL_PATH),
            models_dir: path(ENV_MODELS_DIR),
            backbone_path: path(ENV_BACKBONE_PATH),
            detector_path: path(ENV_DETECTOR_PATH),
            label_font: path(ENV_LABEL_FONT),
        })
    }

    /// Directory holding the classifier, backbone and detector models.
    ///
    /// `./models` when it exists, otherwise the platform data directory.
    pub fn resolved_models_dir(&self) -> PathBuf {
        if let Some(dir) = &self.models_dir {
            return dir.clone();
        }
        let local = PathBuf::from(MODELS_DIR_NAME);
        if local.is_dir() {
            return local;
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join(MODELS_DIR_NAME))
            .unwrap_or(local)
    }

    pub fn default_model_path(&self) -> PathBuf {
        self.resolved_models_dir().join(DEFAULT_MODEL_NAME)
    }

    pub fn backbone_model_path(&self) -> PathBuf {
        self.backbone_path
            .clone()
            .unwrap_or_else(|| self.resolved_models_dir().join(BACKBONE_MODEL_NAME))
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.detector_path
            .clone()
            .unwrap_or_else(|| self.resolved_models_dir().join(DETECTOR_MODEL_NAME))
    }
}

fn unit_float<G>(get: &G, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let value: f64 = raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        key,
        value: raw.clone(),
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { key, value });
    }
    Ok(value)
}

fn flag<G>(get: &G, key: &str) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    get(key).is_some_and(|v| v.trim() == "1")
}
