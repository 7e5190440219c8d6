/// Conventional classifier artifact names searched in the models directory,
/// after any caller-supplied candidates.
pub const DEFAULT_MODEL_CANDIDATES: &[&str] = &[
    "mask_mobilenet_v2_compat.onnx",
    "mask_mobilenet.onnx",
    "mask_detector.onnx",
    "mask_model.onnx",
    "mask_mobilenet_v2_compat.safetensors",
    "mask_mobilenet.safetensors",
];

/// Configured default artifact, relative to the models directory.
pub const DEFAULT_MODEL_NAME: &str = "mask_mobilenet.onnx";

/// Frozen feature extractor used to rebuild the reference architecture.
pub const BACKBONE_MODEL_NAME: &str = "mobilenet_v2_backbone.onnx";

/// SeetaFace funnel-cascade model consumed by the face locator.
pub const DETECTOR_MODEL_NAME: &str = "seeta_fd_frontal_v1.0.bin";

pub const MODELS_DIR_NAME: &str = "models";
pub const APP_DIR_NAME: &str = "MaskWatch";

/// Classifier input tile edge, in pixels.
pub const TILE_SIZE: usize = 224;
pub const TILE_CHANNELS: usize = 3;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub const ENV_MODEL_PATH: &str = "MASK_MODEL_PATH";
pub const ENV_MODELS_DIR: &str = "MASK_MODELS_DIR";
pub const ENV_BACKBONE_PATH: &str = "MASK_BACKBONE_PATH";
pub const ENV_DETECTOR_PATH: &str = "FACE_DETECTOR_PATH";
pub const ENV_LABEL_FONT: &str = "MASK_LABEL_FONT";
pub const ENV_CLASS_ORDER: &str = "MASK_CLASS_ORDER";
pub const ENV_MASK_THRESHOLD: &str = "MASK_CONF_THRESHOLD";
pub const ENV_NO_MASK_THRESHOLD: &str = "NO_MASK_CONF_THRESHOLD";
pub const ENV_IMPROPER_THRESHOLD: &str = "IMPROPER_CONF_THRESHOLD";
pub const ENV_DELTA_THRESHOLD: &str = "CONF_DELTA_THRESHOLD";
pub const ENV_FORCE_ARGMAX: &str = "FORCE_ARGMAX";
pub const ENV_DEBUG_PRED: &str = "DEBUG_PRED";
pub const ENV_PREPROCESS_MODE: &str = "PREPROCESS_MODE";
pub const ENV_FACE_CROP_MARGIN: &str = "FACE_CROP_MARGIN";
