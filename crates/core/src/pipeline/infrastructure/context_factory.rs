use std::sync::Arc;

use crate::annotation::infrastructure::raster_annotator::RasterAnnotator;
use crate::classification::infrastructure::loader_factory::load_classifier;
use crate::detection::infrastructure::cascade_face_locator::{CascadeFaceLocator, CascadeParams};
use crate::pipeline::inference_context::InferenceContext;
use crate::shared::config::MaskConfig;

/// Builds the process-wide context: cascade locator, classifier (if any
/// artifact loads) and raster annotator.
///
/// Fails only when the face detector model is missing or unreadable; a
/// missing classifier degrades to detection-only annotation.
pub fn build_context(
    config: MaskConfig,
    candidates: &[&str],
) -> Result<InferenceContext, Box<dyn std::error::Error>> {
    let detector_path = config.detector_model_path();
    let locator = CascadeFaceLocator::open(&detector_path, CascadeParams::default())?;
    let classifier = load_classifier(&config, candidates);
    let annotator = RasterAnnotator::from_config(&config)?;
    Ok(InferenceContext::new(
        config,
        Arc::new(locator),
        classifier,
        Arc::new(annotator),
    ))
}
