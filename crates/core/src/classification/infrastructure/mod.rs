pub mod compat_shims;
pub mod loader_factory;
pub mod model_resolver;
pub mod onnx_classifier;
pub mod reference_classifier;
pub mod weight_store;
