use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Prompt context rebuilt for every agent turn.
///
/// `open_issues` holds only what the next turn should respond to; callers
/// replace it wholesale when handing off to a different agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SharedState {
    pub goal: String,
    pub constraints: Vec<String>,
    pub recent_diff: Option<String>,
    pub last_test_output: Option<String>,
    pub open_issues: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
        }
    }

    /// Critical and major issues gate arbiter and moderator escalation.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Critical | Self::Major)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_verify: Option<String>,
    /// Caller-assigned stable slug used for cross-iteration tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    RequestChanges,
    Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    DefiniteBug,
    Uncertainty,
    NeedsHuman,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub verdict: Verdict,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_tests: Option<Vec<String>>,
    #[serde(default)]
    pub stopping: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_needed: Option<Vec<String>>,
}

impl Review {
    /// Stands in for the reviewer when review is skipped by `review_mode`.
    pub fn synthesized_approval() -> Self {
        Self {
            verdict: Verdict::Approve,
            issues: Vec::new(),
            suggested_patch: None,
            extra_tests: None,
            stopping: "Review skipped by policy".to_string(),
            block_reason: None,
            diagnostics_needed: None,
        }
    }

    pub fn has_blocking_issues(&self) -> bool {
        self.issues.iter().any(|issue| issue.severity.is_blocking())
    }

    fn validate(&self) -> Result<(), String> {
        if self.verdict == Verdict::Block && self.block_reason.is_none() {
            return Err("verdict 'block' requires a block_reason".to_string());
        }
        if self.block_reason == Some(BlockReason::Uncertainty)
            && self
                .diagnostics_needed
                .as_ref()
                .is_none_or(|commands| commands.is_empty())
        {
            return Err(
                "block_reason 'uncertainty' requires non-empty diagnostics_needed".to_string(),
            );
        }
        Ok(())
    }
}

/// Builder output. Two shapes are valid: a file request carrying only
/// `files_needed`, or an implementation carrying at minimum `patch`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_needed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<String>,
}

impl BuilderMessage {
    pub fn file_request(&self) -> Option<&[String]> {
        match &self.files_needed {
            Some(files) if self.patch.is_none() && !files.is_empty() => Some(files.as_slice()),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.file_request().is_some() || self.patch.is_some() {
            return Ok(());
        }
        Err("expected either a non-empty files_needed list or a patch".to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorVerdict {
    AcceptBuilder,
    AcceptReviewer,
    RejectBoth,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeratorDecision {
    pub decision: ModeratorVerdict,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterOutcome {
    BugConfirmed,
    BugRefuted,
    TestInvalid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArbiterTestResult {
    pub test_added: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_passed: Option<bool>,
    pub outcome: ArbiterOutcome,
    pub explanation: String,
}

impl ArbiterTestResult {
    pub fn invalid(explanation: impl Into<String>) -> Self {
        Self {
            test_added: false,
            test_patch: None,
            test_passed: None,
            outcome: ArbiterOutcome::TestInvalid,
            explanation: explanation.into(),
        }
    }

    pub fn confirmed(test_patch: String, explanation: impl Into<String>) -> Self {
        Self {
            test_added: true,
            test_patch: Some(test_patch),
            test_passed: Some(false),
            outcome: ArbiterOutcome::BugConfirmed,
            explanation: explanation.into(),
        }
    }

    pub fn refuted(test_patch: String, explanation: impl Into<String>) -> Self {
        Self {
            test_added: true,
            test_patch: Some(test_patch),
            test_passed: Some(true),
            outcome: ArbiterOutcome::BugRefuted,
            explanation: explanation.into(),
        }
    }
}

/// Drops an optional ```json fence around an agent payload.
pub fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_payload<T>(role: &str, raw: &str) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(strip_json_fence(raw))
        .map_err(|error| ProtocolError::parse(role, error.to_string()))
}

pub fn parse_builder_message(raw: &str) -> Result<BuilderMessage, ProtocolError> {
    let message: BuilderMessage = parse_payload("builder", raw)?;
    message
        .validate()
        .map_err(|reason| ProtocolError::schema("builder", reason))?;
    Ok(message)
}

pub fn parse_review(raw: &str) -> Result<Review, ProtocolError> {
    let review: Review = parse_payload("reviewer", raw)?;
    review
        .validate()
        .map_err(|reason| ProtocolError::schema("reviewer", reason))?;
    Ok(review)
}

pub fn parse_moderator_decision(raw: &str) -> Result<ModeratorDecision, ProtocolError> {
    parse_payload("moderator", raw)
}
