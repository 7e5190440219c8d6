//! Classical sliding-window face locator using the SeetaFace funnel cascade
//! via `rustface`.
//!
//! Frames wider than `detection_width` are searched on a downscaled
//! grayscale copy; boxes are mapped back to full resolution and clipped.
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::GrayImage;
use thiserror::Error;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Smallest window the cascade supports.
const CASCADE_MIN_WINDOW: u32 = 20;
/// Per-level shrink range accepted by the cascade pyramid.
const PYRAMID_RANGE: (f32, f32) = (0.01, 0.99);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeParamsError {
    #[error("scale factor must be a finite value above 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("score threshold must be a finite positive value, got {0}")]
    ScoreThreshold(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    /// Growth between pyramid levels, e.g. 1.05 for 5% steps.
    pub scale_factor: f64,
    /// Minimum face edge on the detection image, in pixels.
    pub min_size: u32,
    /// Candidate windows scoring below this are discarded.
    pub score_threshold: f64,
    pub window_step: u32,
    /// Frames wider than this are downscaled before detection. 0 disables.
    pub detection_width: u32,
}

impl CascadeParams {
    /// Rejects values the cascade would abort on. `min_size` and
    /// `window_step` are raised to their floors instead.
    pub fn validate(&self) -> Result<(), CascadeParamsError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(CascadeParamsError::ScaleFactor(self.scale_factor));
        }
        if !self.score_threshold.is_finite() || self.score_threshold <= 0.0 {
            return Err(CascadeParamsError::ScoreThreshold(self.score_threshold));
        }
        Ok(())
    }
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.05,
            min_size: 40,
            score_threshold: 2.0,
            window_step: 4,
            detection_width: 600,
        }
    }
}

/// `rustface` models are not thread-safe, so the locator keeps the validated
/// model bytes and builds a fresh detector per call.
pub struct CascadeFaceLocator {
    model_bytes: Arc<[u8]>,
    params: CascadeParams,
}

impl CascadeFaceLocator {
    pub fn open(model_path: &Path, params: CascadeParams) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(model_path)
            .map_err(|e| format!("Cannot open face detector model {}: {e}", model_path.display()))?;
        let locator = Self::from_bytes(&bytes, params)?;
        log::info!("Loaded face detector model {}", model_path.display());
        Ok(locator)
    }

    pub fn from_bytes(bytes: &[u8], params: CascadeParams) -> Result<Self, Box<dyn std::error::Error>> {
        params.validate()?;
        rustface::read_model(Cursor::new(bytes))?;
        Ok(Self {
            model_bytes: Arc::from(bytes),
            params,
        })
    }
}

impl FaceLocator for CascadeFaceLocator {
    fn locate(&self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        frame.validate()?;
        let (fw, fh) = (frame.width(), frame.height());
        let gray = frame.to_gray();
        let (gray, dw, dh) = downscale_gray(gray, fw, fh, self.params.detection_width)?;

        let model = rustface::read_model(Cursor::new(&self.model_bytes[..]))?;
        let mut detector = rustface::create_detector_with_model(model);
        detector.set_min_face_size(self.params.min_size.max(CASCADE_MIN_WINDOW));
        detector.set_score_thresh(self.params.score_threshold);
        detector.set_pyramid_scale_factor(pyramid_factor(self.params.scale_factor));
        let step = self.params.window_step.max(1);
        detector.set_slide_window_step(step, step);

        let faces = detector.detect(&rustface::ImageData::new(&gray, dw, dh));
        let boxes = map_detections(
            faces.iter().map(|face| {
                let bbox = face.bbox();
                [
                    bbox.x() as i64,
                    bbox.y() as i64,
                    bbox.width() as i64,
                    bbox.height() as i64,
                ]
            }),
            (dw, dh),
            (fw, fh),
        );

        log::debug!("Frame {}: {} face(s)", frame.index(), boxes.len());
        Ok(boxes)
    }
}

/// Clips raw `[x, y, w, h]` detections to the detection image, maps them
/// back to the source frame and drops boxes left without area.
fn map_detections(
    raw: impl IntoIterator<Item = [i64; 4]>,
    (dw, dh): (u32, u32),
    (fw, fh): (u32, u32),
) -> Vec<FaceBox> {
    let back_to_source = fw as f64 / dw as f64;
    raw.into_iter()
        .map(|[x, y, w, h]| FaceBox::from_signed(x, y, w, h, dw, dh).scaled(back_to_source, fw, fh))
        .filter(|b| b.area() > 0)
        .collect()
}

/// The cascade shrinks the image by this factor per pyramid level.
fn pyramid_factor(scale_factor: f64) -> f32 {
    let (lo, hi) = PYRAMID_RANGE;
    ((1.0 / scale_factor) as f32).clamp(lo, hi)
}

/// Downscales a luma plane to `max_width`, keeping the aspect ratio.
/// Narrower planes are returned unchanged.
fn downscale_gray(
    gray: Vec<u8>,
    width: u32,
    height: u32,
    max_width: u32,
) -> Result<(Vec<u8>, u32, u32), Box<dyn std::error::Error>> {
    if max_width == 0 || width <= max_width {
        return Ok((gray, width, height));
    }
    let new_h = ((height as f64 * max_width as f64 / width as f64).round() as u32).max(1);
    let image = GrayImage::from_raw(width, height, gray).ok_or("Luma plane size mismatch")?;
    let resized = image::imageops::resize(&image, max_width, new_h, FilterType::Triangle);
    Ok((resized.into_raw(), max_width, new_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_default_params() {
        let p = CascadeParams::default();
        assert_relative_eq!(p.scale_factor, 1.05);
        assert_eq!(p.min_size, 40);
        assert_eq!(p.detection_width, 600);
    }

    #[rstest]
    #[case(1.05, 1.0 / 1.05)]
    #[case(1.25, 0.8)]
    #[case::barely_above_one(1.001, 0.99)]
    #[case::huge_step(500.0, 0.01)]
    fn test_pyramid_factor(#[case] scale: f64, #[case] expected: f64) {
        assert_relative_eq!(pyramid_factor(scale), expected as f32);
    }

    #[rstest]
    #[case::unit_scale(CascadeParams { scale_factor: 1.0, ..CascadeParams::default() })]
    #[case::shrinking_scale(CascadeParams { scale_factor: 0.5, ..CascadeParams::default() })]
    #[case::nan_scale(CascadeParams { scale_factor: f64::NAN, ..CascadeParams::default() })]
    #[case::zero_threshold(CascadeParams { score_threshold: 0.0, ..CascadeParams::default() })]
    #[case::negative_threshold(CascadeParams { score_threshold: -1.0, ..CascadeParams::default() })]
    #[case::infinite_threshold(CascadeParams { score_threshold: f64::INFINITY, ..CascadeParams::default() })]
    fn test_invalid_params_rejected(#[case] params: CascadeParams) {
        assert!(params.validate().is_err());
        let err = CascadeFaceLocator::from_bytes(&[1, 2, 3], params).err().unwrap();
        assert!(err.to_string().contains("must be"));
    }

    #[rstest]
    #[case::defaults(CascadeParams::default())]
    #[case::barely_above_one(CascadeParams { scale_factor: 1.001, ..CascadeParams::default() })]
    #[case::zero_step_and_size(CascadeParams { window_step: 0, min_size: 0, ..CascadeParams::default() })]
    fn test_valid_params_accepted(#[case] params: CascadeParams) {
        assert_eq!(params.validate(), Ok(()));
    }

    #[rstest]
    #[case::inside_same_scale([10, 20, 30, 40], (600, 400), (600, 400), vec![FaceBox::new(10, 20, 30, 40)])]
    #[case::negative_origin_clipped([-5, -5, 30, 30], (600, 400), (600, 400), vec![FaceBox::new(0, 0, 25, 25)])]
    #[case::scaled_back([100, 50, 40, 40], (600, 338), (1200, 676), vec![FaceBox::new(200, 100, 80, 80)])]
    #[case::overflow_after_scaling([580, 300, 40, 40], (600, 338), (1920, 1080), vec![FaceBox::new(1856, 960, 64, 120)])]
    #[case::outside_detection_image([700, 10, 30, 30], (600, 400), (600, 400), vec![])]
    #[case::zero_width([10, 10, 0, 20], (600, 400), (600, 400), vec![])]
    fn test_map_detections(
        #[case] raw: [i64; 4],
        #[case] detection: (u32, u32),
        #[case] source: (u32, u32),
        #[case] expected: Vec<FaceBox>,
    ) {
        let boxes = map_detections([raw], detection, source);
        assert_eq!(boxes, expected);
        for b in &boxes {
            assert!(b.right() <= source.0 && b.bottom() <= source.1);
        }
    }

    #[rstest]
    #[case::zero_area(Frame::new(Vec::new(), 0, 0, 3, 0))]
    #[case::two_channels(Frame::new(vec![0; 4 * 4 * 2], 4, 4, 2, 0))]
    fn test_locate_rejects_malformed_frame(#[case] frame: Frame) {
        let locator = CascadeFaceLocator {
            model_bytes: Arc::from(&[][..]),
            params: CascadeParams::default(),
        };
        assert!(locator.locate(&frame).is_err());
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let (gray, w, h) = downscale_gray(vec![128; 1200 * 800], 1200, 800, 600).unwrap();
        assert_eq!((w, h), (600, 400));
        assert_eq!(gray.len(), 600 * 400);
        assert!(gray.iter().all(|&v| v == 128));
    }

    #[rstest]
    #[case::narrower(400, 300, 600)]
    #[case::equal(600, 300, 600)]
    #[case::disabled(1920, 1080, 0)]
    fn test_downscale_passthrough(#[case] w: u32, #[case] h: u32, #[case] max: u32) {
        let (gray, dw, dh) = downscale_gray(vec![7; (w * h) as usize], w, h, max).unwrap();
        assert_eq!((dw, dh), (w, h));
        assert_eq!(gray.len(), (w * h) as usize);
    }

    #[test]
    fn test_downscale_rejects_wrong_plane() {
        assert!(downscale_gray(vec![0; 10], 1200, 800, 600).is_err());
    }

    #[test]
    fn test_open_missing_model() {
        let err = CascadeFaceLocator::open(Path::new("/nonexistent/seeta.bin"), CascadeParams::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Cannot open face detector model"));
    }

    #[test]
    fn test_from_bytes_rejects_truncated_model() {
        assert!(CascadeFaceLocator::from_bytes(&[1, 2, 3], CascadeParams::default()).is_err());
    }
}
