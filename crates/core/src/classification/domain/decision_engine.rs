use crate::shared::config::{ClassOrder, MaskConfig, Thresholds};

use super::decision::{Decision, MaskLabel};

/// Turns a raw probability vector into a mask-state decision.
///
/// Pure policy: the same vector under the same settings always yields the
/// same decision, and every non-empty vector resolves to some label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionEngine {
    thresholds: Thresholds,
    class_order: ClassOrder,
    force_argmax: bool,
    debug_predictions: bool,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds, class_order: ClassOrder, force_argmax: bool) -> Self {
        Self {
            thresholds,
            class_order,
            force_argmax,
            debug_predictions: false,
        }
    }

    pub fn from_config(config: &MaskConfig) -> Self {
        Self::new(config.thresholds, config.class_order, config.force_argmax)
            .with_debug(config.debug_predictions)
    }

    /// Logs every raw vector at info level.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_predictions = enabled;
        self
    }

    pub fn decide(&self, probs: &[f32]) -> Decision {
        if self.debug_predictions {
            log::info!("Raw probabilities: {probs:?}");
        }
        if probs.is_empty() {
            log::warn!("Classifier returned an empty probability vector");
            return Decision::new(MaskLabel::Class(0), 0.0);
        }
        if self.force_argmax {
            return self.decide_argmax(probs);
        }
        match *probs {
            [a, b] => self.decide_two(a, b),
            [a, b, improper] => self.decide_three(a, b, improper),
            _ => {
                let (i, p) = argmax(probs);
                Decision::new(MaskLabel::Class(i), p)
            }
        }
    }

    /// Labels by the largest index, ignoring thresholds and the ambiguity gap.
    fn decide_argmax(&self, probs: &[f32]) -> Decision {
        let (i, p) = argmax(probs);
        let label = match (probs.len(), i) {
            (2 | 3, 0 | 1) => self.binary_label(i),
            (3, 2) => MaskLabel::Improper,
            _ => MaskLabel::Class(i),
        };
        Decision::new(label, p)
    }

    fn decide_two(&self, a: f32, b: f32) -> Decision {
        let (mask, no_mask) = self.ordered(a, b);
        let t = &self.thresholds;

        if (mask - no_mask).abs() < t.delta {
            return Decision::new(MaskLabel::Improper, mask.max(no_mask));
        }
        if mask >= t.mask && mask > no_mask {
            Decision::new(MaskLabel::Mask, mask)
        } else if no_mask >= t.no_mask && no_mask > mask {
            Decision::new(MaskLabel::NoMask, no_mask)
        } else {
            Decision::new(MaskLabel::Improper, mask.max(no_mask))
        }
    }

    fn decide_three(&self, a: f32, b: f32, improper: f32) -> Decision {
        let (mask, no_mask) = self.ordered(a, b);
        let t = &self.thresholds;

        let mut sorted = [mask, no_mask, improper];
        sorted.sort_by(|x, y| y.total_cmp(x));
        let top = sorted[0];
        if top - sorted[1] < t.delta {
            return Decision::new(MaskLabel::Improper, top);
        }

        if improper >= t.improper && improper >= mask.max(no_mask) {
            return Decision::new(MaskLabel::Improper, improper);
        }
        if mask >= t.mask && mask > no_mask {
            return Decision::new(MaskLabel::Mask, mask);
        }
        if no_mask >= t.no_mask && no_mask > mask {
            return Decision::new(MaskLabel::NoMask, no_mask);
        }

        // Largest wins; ties resolve Improper, then Mask, then No mask.
        if improper == top {
            Decision::new(MaskLabel::Improper, improper)
        } else if mask == top {
            Decision::new(MaskLabel::Mask, mask)
        } else {
            Decision::new(MaskLabel::NoMask, no_mask)
        }
    }

    /// Maps the first two vector entries to `(mask, no_mask)`.
    fn ordered(&self, a: f32, b: f32) -> (f32, f32) {
        match self.class_order {
            ClassOrder::MaskFirst => (a, b),
            ClassOrder::NoMaskFirst => (b, a),
        }
    }

    fn binary_label(&self, index: usize) -> MaskLabel {
        match (self.class_order, index) {
            (ClassOrder::MaskFirst, 0) | (ClassOrder::NoMaskFirst, 1) => MaskLabel::Mask,
            _ => MaskLabel::NoMask,
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(Thresholds::default(), ClassOrder::default(), false)
    }
}

/// First index of the largest value. NaN entries never win.
fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0, values[0]);
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 || best.1.is_nan() {
            best = (i, v);
        }
    }
    best
}
