use crate::classification::domain::decision::{Decision, MaskLabel};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// A color in frame byte order (blue, green, red).
pub type Bgr = [u8; 3];

pub const MASK_COLOR: Bgr = [0, 255, 0];
pub const NO_MASK_COLOR: Bgr = [0, 0, 255];
/// Orange, for improper wear and unrecognised classes.
pub const UNCERTAIN_COLOR: Bgr = [0, 165, 255];
/// Blue, for faces drawn without a classifier.
pub const UNCLASSIFIED_COLOR: Bgr = [255, 0, 0];
pub const ERROR_TEXT_COLOR: Bgr = [0, 0, 255];

pub const UNCLASSIFIED_CAPTION: &str = "Face Detected";

pub fn label_color(label: MaskLabel) -> Bgr {
    match label {
        MaskLabel::Mask => MASK_COLOR,
        MaskLabel::NoMask => NO_MASK_COLOR,
        MaskLabel::Improper | MaskLabel::Class(_) => UNCERTAIN_COLOR,
    }
}

/// One box and the caption drawn above it.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub face: FaceBox,
    pub caption: String,
    pub color: Bgr,
}

impl Annotation {
    pub fn classified(face: FaceBox, decision: &Decision) -> Self {
        Self {
            face,
            caption: decision.caption(),
            color: label_color(decision.label),
        }
    }

    /// Degraded rendering used when no classifier could be loaded.
    pub fn unclassified(face: FaceBox) -> Self {
        Self {
            face,
            caption: UNCLASSIFIED_CAPTION.to_string(),
            color: UNCLASSIFIED_COLOR,
        }
    }
}

/// Domain interface for drawing results onto a frame.
///
/// Implementations modify the frame in place and keep its dimensions and
/// channel layout.
pub trait FrameAnnotator: Send + Sync {
    fn annotate(
        &self,
        frame: &mut Frame,
        annotations: &[Annotation],
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Draws free text with its top-left corner at `(x, y)`.
    fn write_text(
        &self,
        frame: &mut Frame,
        text: &str,
        x: i32,
        y: i32,
        color: Bgr,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MaskLabel::Mask, MASK_COLOR)]
    #[case(MaskLabel::NoMask, NO_MASK_COLOR)]
    #[case(MaskLabel::Improper, UNCERTAIN_COLOR)]
    #[case(MaskLabel::Class(4), UNCERTAIN_COLOR)]
    fn test_label_color(#[case] label: MaskLabel, #[case] expected: Bgr) {
        assert_eq!(label_color(label), expected);
    }

    #[test]
    fn test_classified_annotation() {
        let face = FaceBox::new(10, 20, 40, 40);
        let annotation = Annotation::classified(face, &Decision::new(MaskLabel::NoMask, 0.9));
        assert_eq!(annotation.caption, "No mask: 90.00%");
        assert_eq!(annotation.color, NO_MASK_COLOR);
        assert_eq!(annotation.face, face);
    }

    #[test]
    fn test_unclassified_is_distinguishable() {
        let face = FaceBox::new(0, 0, 40, 40);
        let fallback = Annotation::unclassified(face);
        assert_eq!(fallback.caption, "Face Detected");
        for label in [MaskLabel::Mask, MaskLabel::NoMask, MaskLabel::Improper] {
            assert_ne!(fallback.color, label_color(label));
        }
    }
}
