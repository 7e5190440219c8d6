use std::sync::Arc;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::classification::domain::decision_engine::DecisionEngine;
use crate::classification::domain::face_normalizer::FaceNormalizer;
use crate::classification::domain::mask_classifier::MaskClassifier;
use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::config::MaskConfig;

/// Everything a pipeline call needs, built once at startup and shared
/// read-only afterwards.
///
/// `classifier` is `None` when no artifact could be loaded; the pipeline
/// then draws faces without a mask decision.
pub struct InferenceContext {
    config: MaskConfig,
    locator: Arc<dyn FaceLocator>,
    classifier: Option<Arc<dyn MaskClassifier>>,
    annotator: Arc<dyn FrameAnnotator>,
    normalizer: FaceNormalizer,
    engine: DecisionEngine,
}

impl InferenceContext {
    pub fn new(
        config: MaskConfig,
        locator: Arc<dyn FaceLocator>,
        classifier: Option<Arc<dyn MaskClassifier>>,
        annotator: Arc<dyn FrameAnnotator>,
    ) -> Self {
        let normalizer = FaceNormalizer::from_config(&config);
        let engine = DecisionEngine::from_config(&config);
        match &classifier {
            Some(c) => log::info!(
                "Classifier ready: {} ({:?} tiles)",
                c.name(),
                c.convention()
            ),
            None => log::warn!("No classifier loaded; faces will be annotated without a mask decision"),
        }
        Self {
            config,
            locator,
            classifier,
            annotator,
            normalizer,
            engine,
        }
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    pub fn locator(&self) -> &dyn FaceLocator {
        self.locator.as_ref()
    }

    pub fn classifier(&self) -> Option<&dyn MaskClassifier> {
        self.classifier.as_deref()
    }

    pub fn annotator(&self) -> &dyn FrameAnnotator {
        self.annotator.as_ref()
    }

    pub fn normalizer(&self) -> &FaceNormalizer {
        &self.normalizer
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }
}
