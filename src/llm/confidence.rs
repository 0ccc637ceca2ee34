use serde::{Deserialize, Serialize};

/// Coarse match-quality label for solver results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Derive a confidence label from the model's free-text analysis by
/// substring matching the phrases it is prompted to emit. Brittle by
/// nature; kept in one place so it can be swapped for structured output.
/// Anything that matches neither phrase set is Low.
pub fn classify_confidence(analysis: &str) -> Confidence {
    let lower = analysis.to_lowercase();
    if lower.contains("high confidence") || lower.contains("match assessment: high") {
        Confidence::High
    } else if lower.contains("medium confidence") || lower.contains("match assessment: medium") {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_confidence_phrase() {
        let text = "I have high confidence these incidents match.";
        assert_eq!(classify_confidence(text), Confidence::High);
    }

    #[test]
    fn test_match_assessment_heading() {
        let text = "MATCH ASSESSMENT: High\nThe past RCA is nearly identical.";
        assert_eq!(classify_confidence(text), Confidence::High);
    }

    #[test]
    fn test_medium_confidence() {
        let text = "Match assessment: Medium - partial overlap in symptoms.";
        assert_eq!(classify_confidence(text), Confidence::Medium);
    }

    #[test]
    fn test_defaults_to_low() {
        assert_eq!(classify_confidence("No clear match."), Confidence::Low);
        assert_eq!(classify_confidence(""), Confidence::Low);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_value(Confidence::High).unwrap();
        assert_eq!(json, "high");
    }
}
