//! Premature-feedback detection for interview replies.
//!
//! A heuristic: the model is asked to use fixed section headers when it writes
//! formal feedback, so finding those headers mid-interview means it jumped
//! ahead. Rephrased headers slip through.

/// Decides whether a model reply already contains formal feedback.
pub trait FeedbackClassifier: Send + Sync {
    fn classify(&self, text: &str) -> bool;
}

/// Case-sensitive substring search over a fixed marker list.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    markers: Vec<String>,
    min_matches: usize,
}

impl MarkerDetector {
    /// `min_matches` below 1 is treated as 1.
    pub fn new(markers: Vec<String>, min_matches: usize) -> Self {
        Self {
            markers,
            min_matches: min_matches.max(1),
        }
    }

    pub fn contains_formal_feedback(&self, text: &str) -> bool {
        let found = self
            .markers
            .iter()
            .filter(|m| !m.is_empty() && text.contains(m.as_str()))
            .count();
        found >= self.min_matches
    }
}

impl FeedbackClassifier for MarkerDetector {
    fn classify(&self, text: &str) -> bool {
        self.contains_formal_feedback(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FEEDBACK_MARKERS;

    fn detector(min_matches: usize) -> MarkerDetector {
        MarkerDetector::new(
            DEFAULT_FEEDBACK_MARKERS.iter().map(|m| m.to_string()).collect(),
            min_matches,
        )
    }

    #[test]
    fn any_marker_triggers_by_default() {
        let d = detector(1);
        assert!(d.contains_formal_feedback("Thanks!\n\n**Strengths**\n- thorough history"));
        assert!(d.contains_formal_feedback("## Clerkship Director Summary\n..."));
    }

    #[test]
    fn plain_interview_text_is_not_feedback() {
        let d = detector(1);
        assert!(!d.contains_formal_feedback(
            "What strengths did you notice when she presented the patient?"
        ));
        assert!(!d.contains_formal_feedback(""));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let d = detector(1);
        assert!(!d.contains_formal_feedback("**strengths**"));
        assert!(!d.contains_formal_feedback("**STRENGTHS**"));
    }

    #[test]
    fn threshold_requires_distinct_markers() {
        let d = detector(3);
        assert!(!d.contains_formal_feedback("**Strengths** and **Strengths** again"));
        assert!(d.contains_formal_feedback(
            "**Context of evaluation** x **Strengths** y **Areas for Improvement** z"
        ));
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let d = MarkerDetector::new(vec!["**Strengths**".to_string()], 0);
        assert!(!d.contains_formal_feedback("no markers here"));
    }

    #[test]
    fn empty_markers_never_match() {
        let d = MarkerDetector::new(vec![String::new()], 1);
        assert!(!d.contains_formal_feedback("anything"));
    }

    #[test]
    fn result_depends_only_on_text() {
        let d = detector(1);
        let text = "**Areas for Improvement**\n- presentation structure";
        let boxed: Box<dyn FeedbackClassifier> = Box::new(d.clone());
        assert_eq!(d.classify(text), boxed.classify(text));
        assert_eq!(d.classify(text), d.classify(text));
    }
}
