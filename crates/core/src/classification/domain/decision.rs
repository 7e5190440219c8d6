use std::fmt;

use serde::{Serialize, Serializer};

/// Mask-state label attached to a classified face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskLabel {
    Mask,
    NoMask,
    Improper,
    /// Generic label for classifiers with an unrecognised class count.
    Class(usize),
}

impl fmt::Display for MaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskLabel::Mask => f.write_str("Mask"),
            MaskLabel::NoMask => f.write_str("No mask"),
            MaskLabel::Improper => f.write_str("Improper"),
            MaskLabel::Class(i) => write!(f, "Class{i}"),
        }
    }
}

impl Serialize for MaskLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of the decision engine for one face.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub label: MaskLabel,
    /// Winning probability as a percentage in [0, 100].
    pub confidence: f32,
}

impl Decision {
    pub fn new(label: MaskLabel, probability: f32) -> Self {
        Self {
            label,
            confidence: probability * 100.0,
        }
    }

    /// Confidence with two decimals, e.g. `"87.50"`.
    pub fn confidence_text(&self) -> String {
        format!("{:.2}", self.confidence)
    }

    /// Overlay caption, e.g. `"Mask: 87.50%"`.
    pub fn caption(&self) -> String {
        format!("{}: {}%", self.label, self.confidence_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MaskLabel::Mask, "Mask")]
    #[case(MaskLabel::NoMask, "No mask")]
    #[case(MaskLabel::Improper, "Improper")]
    #[case(MaskLabel::Class(3), "Class3")]
    fn test_label_display(#[case] label: MaskLabel, #[case] expected: &str) {
        assert_eq!(label.to_string(), expected);
    }

    #[test]
    fn test_caption_two_decimals() {
        let d = Decision::new(MaskLabel::Mask, 0.875);
        assert_eq!(d.confidence_text(), "87.50");
        assert_eq!(d.caption(), "Mask: 87.50%");
    }

    #[test]
    fn test_serializes_label_as_text() {
        let d = Decision::new(MaskLabel::NoMask, 0.9);
        let json = serde_json::to_value(d).unwrap();
        assert_eq!(json["label"], "No mask");
        assert!((json["confidence"].as_f64().unwrap() - 90.0).abs() < 1e-3);
    }
}
