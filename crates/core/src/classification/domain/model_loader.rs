use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::mask_classifier::MaskClassifier;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("runtime rejected the model: {0}")]
    Runtime(String),
    #[error("embedded topology is unreadable: {0}")]
    Topology(String),
    #[error("unknown layer {class_name} ({layer}) and no compatibility shim")]
    UnknownLayer { class_name: String, layer: String },
    #[error("weight store: {0}")]
    WeightStore(String),
    #[error("no weights matched the reference architecture")]
    NoMatchingWeights,
    #[error("backbone unavailable: {0}")]
    Backbone(String),
}

/// One way of turning an artifact into an invocable classifier.
pub trait LoadStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, artifact: &Path) -> Result<Arc<dyn MaskClassifier>, LoadError>;
}

/// Tries each strategy in order and keeps the first classifier produced.
///
/// Never fails: when every strategy errors, the result is `None` and the
/// pipeline degrades to detection-only output.
pub struct ModelLoader {
    strategies: Vec<Box<dyn LoadStrategy>>,
}

impl ModelLoader {
    pub fn new(strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn load(&self, artifact: &Path) -> Option<Arc<dyn MaskClassifier>> {
        for (i, strategy) in self.strategies.iter().enumerate() {
            log::info!(
                "Loading {} with strategy {}/{}: {}",
                artifact.display(),
                i + 1,
                self.strategies.len(),
                strategy.name()
            );
            match strategy.load(artifact) {
                Ok(classifier) => {
                    log::info!(
                        "Classifier ready via {} (tiles: {:?})",
                        strategy.name(),
                        classifier.convention()
                    );
                    return Some(classifier);
                }
                Err(e) => log::warn!("Strategy {} failed: {e}", strategy.name()),
            }
        }
        log::error!(
            "All load strategies failed for {}; continuing without a classifier",
            artifact.display()
        );
        None
    }
}
