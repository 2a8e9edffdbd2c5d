//! Two-signal confidence scoring and the handoff decision
//!
//! Confidence blends the best retrieval similarity with the model's own
//! uncertainty signal. Retrieval score alone produces confident-sounding
//! answers built on weak matches; model self-report alone is poorly
//! calibrated. These are pure functions so the blending policy can be tuned
//! without touching any network code.

use std::sync::OnceLock;

use regex::Regex;

/// Confidence assigned when there is no grounding at all
pub const MIN_CONFIDENCE: f32 = 0.0;

/// How strongly a model uncertainty signal attenuates retrieval confidence
const UNCERTAINTY_FACTOR: f32 = 0.3;

/// Blend the best retrieval similarity with the model's uncertainty signal
///
/// Monotonically non-decreasing in `best_similarity` for a fixed
/// `model_uncertain`. An uncertain answer is attenuated rather than zeroed:
/// strong retrieval with a hedging answer still ranks above weak retrieval.
pub fn score(best_similarity: f32, model_uncertain: bool) -> f32 {
    let similarity = best_similarity.clamp(0.0, 1.0);
    if model_uncertain {
        similarity * UNCERTAINTY_FACTOR
    } else {
        similarity
    }
}

/// Detect an "I don't know" pattern in the model's own output
pub fn is_uncertain(answer: &str) -> bool {
    static PATTERNS: OnceLock<Regex> = OnceLock::new();
    let re = PATTERNS.get_or_init(|| {
        Regex::new(
            r"(?i)\b(i don'?t know|i do not know|not available in the (provided|available)|no information (about|on|available)|cannot find|could not find|couldn'?t find|not mentioned in the)",
        )
        .expect("uncertainty regex is valid")
    });
    re.is_match(answer)
}

/// Hard handoff decision: strictly below the threshold hands off;
/// equal to the threshold does not
pub fn should_handoff(confidence: f32, threshold: f32) -> bool {
    confidence < threshold
}
