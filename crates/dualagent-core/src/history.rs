use std::collections::HashSet;

use crate::messages::{Issue, Review};

/// Threshold above which the latest patch counts as a near-repeat of the
/// previous one.
pub const OSCILLATION_SIMILARITY: f64 = 0.95;

/// One entry in the open-issues buffer. Entries sourced from reviewer issues
/// keep their `issue_id` so the arbiter can drop a refuted issue.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenIssue {
    pub issue_id: Option<String>,
    pub text: String,
}

impl OpenIssue {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            issue_id: None,
            text: text.into(),
        }
    }

    pub fn from_issue(issue: &Issue) -> Self {
        let mut text = format!("[{}] {}", issue.severity.as_str(), issue.description);
        if let Some(steps) = &issue.how_to_verify {
            text.push_str(&format!("\nHow to verify: {}", steps));
        }
        if let Some(uncertainty) = &issue.uncertainty {
            text.push_str(&format!("\nUncertainty: {}", uncertainty));
        }
        Self {
            issue_id: issue.issue_id.clone(),
            text,
        }
    }

    /// Wholesale replacement buffer for a review that requests changes.
    pub fn from_review(review: &Review) -> Vec<Self> {
        let mut entries: Vec<Self> = review.issues.iter().map(Self::from_issue).collect();
        if let Some(patch) = &review.suggested_patch {
            entries.push(Self::note(format!("Reviewer-suggested patch:\n{}", patch)));
        }
        entries
    }

    pub fn test_failure(output: &str) -> Self {
        Self::note(format!("[critical] Tests failed.\n{}", output))
    }

    pub fn diagnostics(composite: &str) -> Self {
        Self::note(format!("DIAGNOSTICS RUN:\n{}", composite))
    }

    pub fn arbiter_confirmed(issue: &Issue) -> Self {
        Self {
            issue_id: issue.issue_id.clone(),
            text: format!(
                "Arbiter-confirmed bug ({}): {}",
                issue.severity.as_str(),
                issue.description
            ),
        }
    }
}

/// Cycle-scoped record of applied patches and received reviews. Reset when a
/// new cycle starts; nothing here survives across user requests.
#[derive(Debug, Default)]
pub struct CycleHistory {
    patches: Vec<String>,
    reviews: Vec<Review>,
}

impl CycleHistory {
    pub fn push_patch(&mut self, patch: String) {
        self.patches.push(patch);
    }

    pub fn push_review(&mut self, review: Review) {
        self.reviews.push(review);
    }

    pub fn patches(&self) -> &[String] {
        &self.patches
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn last_patch(&self) -> Option<&String> {
        self.patches.last()
    }

    pub fn last_review(&self) -> Option<&Review> {
        self.reviews.last()
    }

    /// Exact repetition of any earlier patch, or a near-repeat of the most
    /// recent one.
    pub fn is_oscillating(&self, patch: &str) -> bool {
        if self.patches.iter().any(|previous| previous == patch) {
            return true;
        }
        self.patches
            .last()
            .is_some_and(|latest| jaccard_line_similarity(latest, patch) >= OSCILLATION_SIMILARITY)
    }

    /// Issues in the latest review whose `issue_id` also appeared in the
    /// previous review at critical or major severity.
    pub fn stuck_issues(&self) -> Vec<Issue> {
        let [.., previous, latest] = self.reviews.as_slice() else {
            return Vec::new();
        };
        latest
            .issues
            .iter()
            .filter(|issue| {
                let Some(id) = &issue.issue_id else {
                    return false;
                };
                previous.issues.iter().any(|earlier| {
                    earlier.issue_id.as_deref() == Some(id) && earlier.severity.is_blocking()
                })
            })
            .cloned()
            .collect()
    }

    pub fn last_review_has_blocking_issues(&self) -> bool {
        self.last_review().is_some_and(Review::has_blocking_issues)
    }
}

/// Jaccard similarity over the line sets of two patches.
pub fn jaccard_line_similarity(a: &str, b: &str) -> f64 {
    let lines_a: HashSet<&str> = a.lines().collect();
    let lines_b: HashSet<&str> = b.lines().collect();
    if lines_a.is_empty() && lines_b.is_empty() {
        return 1.0;
    }
    let intersection = lines_a.intersection(&lines_b).count();
    let union = lines_a.union(&lines_b).count();
    intersection as f64 / union as f64
}
