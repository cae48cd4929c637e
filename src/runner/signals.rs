//! Verdict tags in agent output.
//!
//! Review and inspection agents finish by printing one of:
//! - `<review>approved</review>` or `<review>changes-requested</review>`
//! - `<inspection>passed</inspection>` or `<inspection>failed</inspection>`
//!
//! When a tag appears more than once, the last occurrence wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::orchestrator::InspectionResult;

static REVIEW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<review>\s*(approved|changes-requested)\s*</review>").unwrap()
});

static INSPECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<inspection>\s*(passed|failed)\s*</inspection>").unwrap()
});

/// Verdicts extracted from one agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentVerdicts {
    /// `Some(true)` when the documents were approved.
    pub review: Option<bool>,
    pub inspection: Option<InspectionResult>,
}

impl AgentVerdicts {
    pub fn is_empty(&self) -> bool {
        self.review.is_none() && self.inspection.is_none()
    }
}

pub fn parse_verdicts(text: &str) -> AgentVerdicts {
    let review = REVIEW_REGEX
        .captures_iter(text)
        .last()
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().eq_ignore_ascii_case("approved"));

    let inspection = INSPECTION_REGEX
        .captures_iter(text)
        .last()
        .and_then(|cap| cap.get(1))
        .map(|m| {
            if m.as_str().eq_ignore_ascii_case("passed") {
                InspectionResult::Passed
            } else {
                InspectionResult::Failed
            }
        });

    AgentVerdicts { review, inspection }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_approved() {
        let v = parse_verdicts("Looks good.\n<review>approved</review>\n");
        assert_eq!(v.review, Some(true));
        assert!(v.inspection.is_none());
    }

    #[test]
    fn test_review_changes_requested() {
        let v = parse_verdicts("<review> Changes-Requested </review>");
        assert_eq!(v.review, Some(false));
    }

    #[test]
    fn test_last_verdict_wins() {
        let text = "<inspection>failed</inspection> fixed it <inspection>passed</inspection>";
        assert_eq!(parse_verdicts(text).inspection, Some(InspectionResult::Passed));
    }

    #[test]
    fn test_unknown_values_ignored() {
        let v = parse_verdicts("<review>maybe</review><inspection>skipped</inspection>");
        assert!(v.is_empty());
    }

    #[test]
    fn test_no_tags() {
        assert_eq!(parse_verdicts("plain output"), AgentVerdicts::default());
    }
}
