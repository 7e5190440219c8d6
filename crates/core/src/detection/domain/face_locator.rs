use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Domain interface for finding faces in a frame.
///
/// Implementations hold no per-frame state and may be shared across
/// threads, hence `&self`. Returned boxes are clipped to the frame.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}
