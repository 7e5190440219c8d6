use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::annotation::domain::frame_annotator::Annotation;
use crate::classification::domain::decision::Decision;
use crate::classification::domain::mask_classifier::{ClassifierError, MaskClassifier};
use crate::pipeline::inference_context::InferenceContext;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::video::infrastructure::image_file_reader::{decode_image_bytes, read_image_file};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid image input: {0}")]
    InvalidImageInput(String),
    #[error("face location failed: {0}")]
    Locate(String),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("annotation failed: {0}")]
    Annotate(String),
}

/// One located face and, when a classifier is loaded, its mask state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub face: FaceBox,
    pub decision: Option<Decision>,
}

/// Single-frame pipeline:
/// locate → normalize (batched) → predict → decide → annotate.
///
/// Stateless across calls; the context is shared read-only, so one use case
/// may serve many threads.
pub struct DetectMasksUseCase {
    context: Arc<InferenceContext>,
}

impl DetectMasksUseCase {
    pub fn new(context: Arc<InferenceContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &InferenceContext {
        &self.context
    }

    /// Annotates `frame` in place and returns one detection per face.
    ///
    /// A frame without faces is returned untouched with an empty set.
    pub fn process_frame(
        &self,
        frame: &mut Frame,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Detection>, PipelineError> {
        frame
            .validate()
            .map_err(|e| PipelineError::InvalidImageInput(e.to_string()))?;

        let t0 = Instant::now();
        let faces = self
            .context
            .locator()
            .locate(frame)
            .map_err(|e| PipelineError::Locate(e.to_string()))?;
        logger.timing("locate", elapsed_ms(t0));
        logger.metric("faces", faces.len() as f64);

        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let detections = match self.context.classifier() {
            Some(classifier) => self.classify(frame, &faces, classifier, logger)?,
            None => faces
                .iter()
                .map(|&face| Detection {
                    face,
                    decision: None,
                })
                .collect(),
        };

        let t0 = Instant::now();
        let annotations: Vec<Annotation> = detections
            .iter()
            .map(|d| match &d.decision {
                Some(decision) => Annotation::classified(d.face, decision),
                None => Annotation::unclassified(d.face),
            })
            .collect();
        self.context
            .annotator()
            .annotate(frame, &annotations)
            .map_err(|e| PipelineError::Annotate(e.to_string()))?;
        logger.timing("annotate", elapsed_ms(t0));

        Ok(detections)
    }

    /// Convenience wrapper without stage logging.
    pub fn detect(&self, frame: &mut Frame) -> Result<Vec<Detection>, PipelineError> {
        self.process_frame(frame, &mut NullPipelineLogger)
    }

    /// Decodes uploaded bytes and runs the pipeline on them.
    pub fn process_image_bytes(
        &self,
        bytes: &[u8],
    ) -> Result<(Frame, Vec<Detection>), PipelineError> {
        let mut frame =
            decode_image_bytes(bytes).map_err(|e| PipelineError::InvalidImageInput(e.to_string()))?;
        let detections = self.detect(&mut frame)?;
        Ok((frame, detections))
    }

    pub fn process_image_file(&self, path: &Path) -> Result<(Frame, Vec<Detection>), PipelineError> {
        let mut frame =
            read_image_file(path).map_err(|e| PipelineError::InvalidImageInput(e.to_string()))?;
        let detections = self.detect(&mut frame)?;
        Ok((frame, detections))
    }

    fn classify(
        &self,
        frame: &Frame,
        faces: &[FaceBox],
        classifier: &dyn MaskClassifier,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Detection>, PipelineError> {
        let t0 = Instant::now();
        let tiles = self
            .context
            .normalizer()
            .normalize_batch(frame, faces, classifier.convention());
        logger.timing("normalize", elapsed_ms(t0));

        let t0 = Instant::now();
        let rows = classifier.predict(tiles.view())?;
        logger.timing("predict", elapsed_ms(t0));
        if rows.nrows() != faces.len() {
            return Err(ClassifierError::OutputShape {
                shape: rows.shape().to_vec(),
                batch: faces.len(),
            }
            .into());
        }

        let engine = self.context.engine();
        Ok(faces
            .iter()
            .zip(rows.rows())
            .map(|(&face, row)| {
                let probs: Vec<f32> = row.iter().copied().collect();
                Detection {
                    face,
                    decision: Some(engine.decide(&probs)),
                }
            })
            .collect())
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
