use std::sync::Arc;

use crate::classification::domain::mask_classifier::MaskClassifier;
use crate::classification::domain::model_loader::ModelLoader;
use crate::shared::config::MaskConfig;

use super::compat_shims::CompatShimRegistry;
use super::model_resolver;
use super::onnx_classifier::{OnnxCompatStrategy, PlainOnnxStrategy};
use super::reference_classifier::ReferenceReconstructionStrategy;

/// The three load strategies, in priority order.
pub fn standard_loader(config: &MaskConfig) -> ModelLoader {
    ModelLoader::new(vec![
        Box::new(OnnxCompatStrategy::new(
            CompatShimRegistry::standard(),
            config.preprocess_mode,
        )),
        Box::new(PlainOnnxStrategy::new(config.preprocess_mode)),
        Box::new(ReferenceReconstructionStrategy::new(
            config.backbone_model_path(),
            config.preprocess_mode,
        )),
    ])
}

/// Resolves and loads the classifier once, at startup.
///
/// Returns `None` when no artifact exists or every strategy fails; the
/// pipeline then annotates faces without a mask decision.
pub fn load_classifier(
    config: &MaskConfig,
    candidates: &[&str],
) -> Option<Arc<dyn MaskClassifier>> {
    let resolved = match model_resolver::resolve_from_config(config, candidates) {
        Ok(resolved) => resolved,
        Err(e) => {
            log::warn!("Classifier unavailable: {e}");
            return None;
        }
    };
    log::info!(
        "Using classifier artifact {} ({})",
        resolved.path.display(),
        resolved.from
    );
    standard_loader(config).load(&resolved.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_standard_loader_order() {
        let loader = standard_loader(&MaskConfig::default());
        assert_eq!(
            loader.strategy_names(),
            vec!["onnx-compat", "onnx-plain", "reference-reconstruction"]
        );
    }

    #[test]
    fn test_missing_artifact_is_absent() {
        let tmp = TempDir::new().unwrap();
        let config = MaskConfig {
            models_dir: Some(tmp.path().to_path_buf()),
            ..MaskConfig::default()
        };
        assert!(load_classifier(&config, &[]).is_none());
    }

    #[test]
    fn test_unloadable_artifact_is_absent() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("mask_mobilenet.onnx"), b"corrupt").unwrap();
        let config = MaskConfig {
            models_dir: Some(tmp.path().to_path_buf()),
            ..MaskConfig::default()
        };
        assert!(load_classifier(&config, &[]).is_none());
    }
}
