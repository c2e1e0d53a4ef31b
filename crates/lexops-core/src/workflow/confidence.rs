//! Confidence Gate — the threshold decision that marks output for human review.

/// Threshold used when a stage does not configure its own.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Returns true iff `confidence < threshold`.
pub fn should_escalate(confidence: f64, threshold: f64) -> bool {
    confidence < threshold
}

/// True when `confidence` is a finite number in `[0, 1]`.
pub fn in_bounds(confidence: f64) -> bool {
    confidence.is_finite() && (0.0..=1.0).contains(&confidence)
}

/// Clamp a computed score into `[0, 1]`, mapping NaN to 0.
pub fn clamp(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// A configured gate, shared by every stage of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: clamp(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn escalate(&self, confidence: f64) -> bool {
        should_escalate(confidence, self.threshold)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
