//! System prompts and prompt assembly for the three agent roles.
//!
//! The personas are load-bearing: the builder stays minimal and diff-focused,
//! the reviewer hunts edge cases and demands reproduction steps. Both must
//! answer with pure JSON so the protocol layer can parse them.

use crate::config::ReviewStrictness;
use crate::messages::{BuilderMessage, Issue, Review, SharedState};

pub const BUILDER_SYSTEM_PROMPT: &str = "\
You are the Builder in a two-agent coding loop. You turn a change request \
into the smallest unified diff that satisfies it.

Rules:
- Produce minimal, focused diffs. Do not refactor beyond the request.
- Write or update tests alongside every implementation change.
- Be conservative about new dependencies; prefer what the project already uses.
- If you need to see files before you can write a patch, ask for them.

Respond with pure JSON, no surrounding prose and no markdown fence. Either a \
file request:
{\"files_needed\": [\"path\", ...]}
or an implementation:
{\"plan\": \"...\", \"patch\": \"<unified diff>\", \"tests\": \"...\", \
\"run\": [\"command\", ...], \"risks\": \"...\"}
The patch must be a unified diff with --- a/<path> and +++ b/<path> headers.";

pub const REVIEWER_SYSTEM_PROMPT: &str = "\
You are the Reviewer in a two-agent coding loop. You are paranoid about edge \
cases, strict about invariants, and security-sensitive. Never accept a claim \
without reproduction steps; every issue you raise must say how to verify it.

Respond with pure JSON, no surrounding prose and no markdown fence:
{\"verdict\": \"approve\" | \"request_changes\" | \"block\", \
\"issues\": [{\"severity\": \"critical\" | \"major\" | \"minor\", \
\"description\": \"...\", \"how_to_verify\": \"...\", \"issue_id\": \"stable-slug\"}], \
\"suggested_patch\": \"...\", \"stopping\": \"...\", \
\"block_reason\": \"definite_bug\" | \"uncertainty\" | \"needs_human\", \
\"diagnostics_needed\": [\"command\", ...]}
If verdict is block you must set block_reason; if block_reason is uncertainty \
you must list the diagnostic commands whose output would resolve it. Reuse \
the same issue_id when you raise the same problem again.";

pub const MODERATOR_SYSTEM_PROMPT: &str = "\
You are the Moderator. The Builder and Reviewer have deadlocked. Given the \
original request, the builder's latest patch, the reviewer's findings, and \
whether tests pass, decide who is right.

Respond with pure JSON, no surrounding prose:
{\"decision\": \"accept_builder\" | \"accept_reviewer\" | \"reject_both\", \
\"reasoning\": \"...\"}";

pub const SUMMARIZER_SYSTEM_PROMPT: &str = "\
Summarize the following code-review feedback in at most 200 words. Keep every \
actionable item and every identifier; drop pleasantries and repetition. \
Respond with the summary text only.";

const LENIENT_CLAUSE: &str = "\n\nStrictness: lenient. Raise critical issues \
only; let style and minor concerns pass.";
const STRICT_CLAUSE: &str = "\n\nStrictness: strict. Also raise performance \
and architectural concerns, not just correctness.";

pub fn reviewer_system_prompt(strictness: ReviewStrictness) -> String {
    let mut prompt = REVIEWER_SYSTEM_PROMPT.to_string();
    match strictness {
        ReviewStrictness::Lenient => prompt.push_str(LENIENT_CLAUSE),
        ReviewStrictness::Balanced => {}
        ReviewStrictness::Strict => prompt.push_str(STRICT_CLAUSE),
    }
    prompt
}

pub fn render_shared_state(state: &SharedState) -> String {
    let mut sections = vec![format!("GOAL:\n{}", state.goal)];
    if !state.constraints.is_empty() {
        sections.push(format!("CONSTRAINTS:\n- {}", state.constraints.join("\n- ")));
    }
    if let Some(diff) = &state.recent_diff {
        sections.push(format!("MOST RECENT DIFF:\n{}", diff));
    }
    if let Some(output) = &state.last_test_output {
        sections.push(format!("LAST TEST OUTPUT:\n{}", output));
    }
    if !state.open_issues.is_empty() {
        sections.push(format!("OPEN ISSUES:\n{}", state.open_issues.join("\n\n")));
    }
    sections.join("\n\n")
}

/// Reviewer context: shared state plus the builder's last message.
pub fn render_review_request(state: &SharedState, builder: &BuilderMessage) -> String {
    let mut sections = vec![render_shared_state(state)];
    if let Some(plan) = &builder.plan {
        sections.push(format!("BUILDER PLAN:\n{}", plan));
    }
    if let Some(patch) = &builder.patch {
        sections.push(format!("BUILDER PATCH:\n{}", patch));
    }
    if let Some(tests) = &builder.tests {
        sections.push(format!("BUILDER TESTS:\n{}", tests));
    }
    if let Some(risks) = &builder.risks {
        sections.push(format!("BUILDER RISKS:\n{}", risks));
    }
    sections.push("Review the patch above and respond with your JSON verdict.".to_string());
    sections.join("\n\n")
}

/// Forces the builder into test-demonstration mode for one stuck issue.
pub fn render_arbiter_request(state: &SharedState, issue: &Issue) -> String {
    let issue_id = issue.issue_id.as_deref().unwrap_or("(unnamed)");
    let verify = issue
        .how_to_verify
        .as_deref()
        .unwrap_or("No verification steps were given; reconstruct the scenario from the description.");
    format!(
        "{}\n\nARBITER MODE. The reviewer has raised the same issue twice:\n\
         - issue_id: {}\n- severity: {}\n- description: {}\n- how to verify: {}\n\n\
         You must settle it with a test, not an argument. Respond with an \
         implementation message whose patch ONLY ADDS a test reproducing the \
         reviewer's scenario exactly as described, and whose run list contains \
         the command that executes that test. Do not change any production \
         code. If the test fails, the bug is real; if it passes, the issue is \
         refuted.",
        render_shared_state(state),
        issue_id,
        issue.severity.as_str(),
        issue.description,
        verify,
    )
}

pub fn render_moderator_request(
    request: &str,
    last_patch: Option<&str>,
    last_review: Option<&Review>,
    tests_passed: bool,
) -> String {
    let mut sections = vec![format!("ORIGINAL REQUEST:\n{}", request)];
    if let Some(patch) = last_patch {
        sections.push(format!("BUILDER'S LATEST PATCH:\n{}", patch));
    }
    if let Some(review) = last_review {
        sections.push(format!("REVIEWER FINDINGS:\n{}", render_issues_by_severity(review)));
        if !review.stopping.is_empty() {
            sections.push(format!("REVIEWER STOPPING NOTE:\n{}", review.stopping));
        }
    }
    sections.push(format!(
        "TESTS PASS: {}",
        if tests_passed { "yes" } else { "no" }
    ));
    sections.join("\n\n")
}

fn render_issues_by_severity(review: &Review) -> String {
    let mut lines = Vec::new();
    for severity in ["critical", "major", "minor"] {
        let matching: Vec<&Issue> = review
            .issues
            .iter()
            .filter(|issue| issue.severity.as_str() == severity)
            .collect();
        if matching.is_empty() {
            continue;
        }
        lines.push(format!("{}:", severity));
        for issue in matching {
            match &issue.issue_id {
                Some(id) => lines.push(format!("- [{}] {}", id, issue.description)),
                None => lines.push(format!("- {}", issue.description)),
            }
        }
    }
    if lines.is_empty() {
        "(no issues listed)".to_string()
    } else {
        lines.join("\n")
    }
}
