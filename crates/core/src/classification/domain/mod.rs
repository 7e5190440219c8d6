pub mod decision;
pub mod decision_engine;
pub mod face_normalizer;
pub mod mask_classifier;
pub mod model_loader;
