//! Shared fixtures: a git-backed temp workspace, scripted providers per
//! role, and canned agent payloads.

use std::path::Path;
use std::sync::Arc;

use dualagent_core::{BufferedEventSink, Config, CycleEvent, Session};
use dualagent_llm::{Client, ScriptedAdapter};
use serde_json::json;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    /// Serves the builder role ("openai" in the default config).
    pub builder: ScriptedAdapter,
    /// Serves the reviewer and moderator roles ("anthropic" by default).
    pub reviewer: ScriptedAdapter,
    pub sink: BufferedEventSink,
    pub session: Session,
}

pub fn harness(mut config: Config) -> Harness {
    config.test_command = "true".to_string();
    let dir = TempDir::new().expect("temp workspace");
    init_git_repo(dir.path());

    let builder = ScriptedAdapter::new("openai", Vec::new());
    let reviewer = ScriptedAdapter::new("anthropic", Vec::new());
    let mut client = Client::default();
    client.register_provider(Arc::new(builder.clone()));
    client.register_provider(Arc::new(reviewer.clone()));

    let sink = BufferedEventSink::default();
    let session = Session::new(config, dir.path(), Arc::new(client), Arc::new(sink.clone()))
        .expect("session should construct");

    Harness {
        dir,
        builder,
        reviewer,
        sink,
        session,
    }
}

fn init_git_repo(root: &Path) {
    for args in [
        vec!["init", "--quiet"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "user.name", "test"],
    ] {
        let status = std::process::Command::new("git")
            .args(&args)
            .current_dir(root)
            .status()
            .expect("git should be available");
        assert!(status.success(), "git {:?} failed", args);
    }
}

/// A unified diff creating `path` with the given lines.
pub fn new_file_patch(path: &str, lines: &[&str]) -> String {
    let mut patch = format!(
        "--- /dev/null\n+++ b/{}\n@@ -0,0 +1,{} @@\n",
        path,
        lines.len()
    );
    for line in lines {
        patch.push_str(&format!("+{}\n", line));
    }
    patch
}

pub fn implementation(patch: &str, run: &[&str]) -> String {
    json!({
        "plan": "implement the request",
        "patch": patch,
        "tests": "covered by the run commands",
        "run": run,
        "risks": "low",
    })
    .to_string()
}

pub fn file_request(paths: &[&str]) -> String {
    json!({ "files_needed": paths }).to_string()
}

pub fn approve() -> String {
    json!({
        "verdict": "approve",
        "issues": [],
        "stopping": "looks correct",
    })
    .to_string()
}

pub fn issue(id: &str, severity: &str, description: &str) -> serde_json::Value {
    json!({
        "severity": severity,
        "description": description,
        "how_to_verify": format!("reproduce: {}", description),
        "issue_id": id,
    })
}

pub fn request_changes(issues: &[serde_json::Value]) -> String {
    json!({
        "verdict": "request_changes",
        "issues": issues,
        "stopping": "issues remain",
    })
    .to_string()
}

pub fn block_definite_bug(issues: &[serde_json::Value]) -> String {
    json!({
        "verdict": "block",
        "issues": issues,
        "stopping": "a definite bug is present",
        "block_reason": "definite_bug",
    })
    .to_string()
}

pub fn block_uncertainty(diagnostics: &[&str]) -> String {
    json!({
        "verdict": "block",
        "issues": [],
        "stopping": "cannot judge without more evidence",
        "block_reason": "uncertainty",
        "diagnostics_needed": diagnostics,
    })
    .to_string()
}

pub fn block_needs_human(stopping: &str) -> String {
    json!({
        "verdict": "block",
        "issues": [],
        "stopping": stopping,
        "block_reason": "needs_human",
    })
    .to_string()
}

pub fn moderator_decision(decision: &str) -> String {
    json!({
        "decision": decision,
        "reasoning": "weighed the evidence",
    })
    .to_string()
}

pub fn event_kind(event: &CycleEvent) -> &'static str {
    match event {
        CycleEvent::Status { .. } => "status",
        CycleEvent::StreamChunk { .. } => "stream_chunk",
        CycleEvent::PatchReady { .. } => "patch_ready",
        CycleEvent::TestsOutput { .. } => "tests_output",
        CycleEvent::ReviewReady { .. } => "review_ready",
        CycleEvent::ModeratorDecision { .. } => "moderator_decision",
        CycleEvent::ArbiterMode { .. } => "arbiter_mode",
        CycleEvent::ArbiterResult { .. } => "arbiter_result",
        CycleEvent::DiagnosticRun { .. } => "diagnostic_run",
        CycleEvent::CycleComplete { .. } => "cycle_complete",
        CycleEvent::Error { .. } => "error",
    }
}

/// Every cycle emits at most one terminal record.
pub fn assert_single_terminal(events: &[CycleEvent]) {
    let terminal_count = events.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(
        terminal_count,
        1,
        "expected exactly one terminal event, saw kinds: {:?}",
        events.iter().map(event_kind).collect::<Vec<_>>()
    );
}

/// Kinds without the stream chunks, which vary with provider chunking.
pub fn kinds_without_chunks(events: &[CycleEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|event| !matches!(event, CycleEvent::StreamChunk { .. }))
        .map(event_kind)
        .collect()
}
