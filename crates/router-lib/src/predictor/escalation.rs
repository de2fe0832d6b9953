//! Confidence-based escalation to human review

/// Label reported in place of the top class when confidence is too low.
/// Model label maps may not use it.
pub const HUMAN_REVIEW_LABEL: &str = "human_review";

/// Caller-visible label and whether a person needs to look at the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub label: String,
    pub needs_human: bool,
}

/// Escalate when the top confidence is strictly below `min_confidence`.
///
/// Equality does not escalate. A non-finite confidence always escalates.
/// `min_confidence` is expected in `[0.0, 1.0]`; range checks belong to the caller.
pub fn decide(top_label: &str, top_confidence: f64, min_confidence: f64) -> Decision {
    let needs_human = !top_confidence.is_finite() || top_confidence < min_confidence;
    let label = if needs_human {
        HUMAN_REVIEW_LABEL
    } else {
        top_label
    };
    Decision {
        label: label.to_string(),
        needs_human,
    }
}
