use std::sync::Arc;

use crate::config::{Config, ReviewMode};
use crate::errors::CoreError;
use crate::events::{CycleEvent, EventSink};
use crate::history::{CycleHistory, OpenIssue};
use crate::messages::{
    ArbiterOutcome, ArbiterTestResult, BlockReason, BuilderMessage, Issue, ModeratorVerdict,
    Review, SharedState, Verdict,
};
use crate::protocol::{AgentCaller, AgentEndpoint, approx_tokens};
use crate::workspace::{RunResult, Workspace};

/// Terminal outcome, mirrored by the `cycle_complete` event.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutcome {
    pub success: bool,
    pub message: String,
    pub iterations: u32,
}

/// One user request end-to-end: owns all history and the open-issues buffer,
/// and is consumed when it reaches a terminal event.
///
/// Exit contract: `run_cycle` emits exactly one `cycle_complete` record, or
/// one `error` record (and then returns `Err`) when a protocol, guard, or
/// apply failure kills the cycle without a verdict.
pub struct Cycle {
    config: Config,
    workspace: Arc<Workspace>,
    agents: Arc<AgentCaller>,
    sink: Arc<dyn EventSink>,
    builder_endpoint: AgentEndpoint,
    reviewer_endpoint: AgentEndpoint,
    moderator_endpoint: AgentEndpoint,
    history: CycleHistory,
    open_issues: Vec<OpenIssue>,
    recent_diff: Option<String>,
    last_test_output: Option<String>,
    last_tests_passed: bool,
}

impl Cycle {
    pub fn new(
        config: Config,
        workspace: Arc<Workspace>,
        agents: Arc<AgentCaller>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let builder_endpoint = AgentEndpoint::builder_from(&config);
        let reviewer_endpoint = AgentEndpoint::reviewer_from(&config);
        let moderator_endpoint = AgentEndpoint::moderator_from(&config);
        Self {
            config,
            workspace,
            agents,
            sink,
            builder_endpoint,
            reviewer_endpoint,
            moderator_endpoint,
            history: CycleHistory::default(),
            open_issues: Vec::new(),
            recent_diff: None,
            last_test_output: None,
            last_tests_passed: false,
        }
    }

    pub async fn run_cycle(mut self, request: &str) -> Result<CycleOutcome, CoreError> {
        let max = self.config.max_iterations;
        let mut i: u32 = 0;

        loop {
            i += 1;
            self.emit(CycleEvent::status(format!("Iteration {}/{}", i, max)))?;

            let builder = match self.run_builder_turn(request).await {
                Ok(message) => message,
                Err(error) => return self.fatal(error),
            };
            let patch = builder.patch.clone().unwrap_or_default();

            if self.history.is_oscillating(&patch) {
                if self.config.enable_moderator
                    && !self.history.reviews().is_empty()
                    && self.moderator_accepts_builder(request).await?
                {
                    return self.terminal(true, "Moderator accepted the builder's patch.", i);
                }
                return self.terminal(
                    false,
                    "Oscillation detected — human intervention needed.",
                    i,
                );
            }
            self.history.push_patch(patch.clone());

            self.emit(CycleEvent::PatchReady {
                patch: patch.clone(),
            })?;
            if let Err(error) = self.workspace.apply_patch(&patch).await {
                return self.fatal(error);
            }
            self.recent_diff = Some(patch);

            let tests_passed = self.run_build_commands(builder.run.as_deref()).await?;
            if !tests_passed {
                if i >= max {
                    return self.terminal(false, "Max iterations reached with failing tests.", i);
                }
                let output = self.last_test_output.clone().unwrap_or_default();
                self.open_issues = vec![OpenIssue::test_failure(&output)];
                continue;
            }

            let review = if self.should_review(i) {
                let state = self.shared_state(request).await;
                let review = match self
                    .agents
                    .call_reviewer(
                        &self.reviewer_endpoint,
                        self.config.review_strictness,
                        &state,
                        &builder,
                    )
                    .await
                {
                    Ok(review) => review,
                    Err(error) => return self.fatal(error),
                };
                self.history.push_review(review.clone());
                self.emit(CycleEvent::ReviewReady {
                    review: review.clone(),
                })?;
                review
            } else {
                Review::synthesized_approval()
            };

            match review.verdict {
                Verdict::Approve => {
                    return self.terminal(true, "Change approved.", i);
                }
                Verdict::Block => match review.block_reason {
                    Some(BlockReason::Uncertainty) => {
                        let commands = review.diagnostics_needed.clone().unwrap_or_default();
                        self.run_diagnostics(&commands).await?;
                        // A diagnostics round does not consume an attempt.
                        i -= 1;
                        continue;
                    }
                    Some(BlockReason::DefiniteBug) => {
                        self.open_issues = OpenIssue::from_review(&review);
                        if i >= max {
                            return self.finish_exhausted(request, i).await;
                        }
                        continue;
                    }
                    Some(BlockReason::NeedsHuman) | None => {
                        let message = if review.stopping.is_empty() {
                            "Reviewer requested human intervention.".to_string()
                        } else {
                            review.stopping.clone()
                        };
                        return self.terminal(false, message, i);
                    }
                },
                Verdict::RequestChanges => {
                    if let Some(stuck) = self.history.stuck_issues().into_iter().next() {
                        let result = self.run_arbiter(request, &stuck).await?;
                        match result.outcome {
                            ArbiterOutcome::TestInvalid => {
                                return self.terminal(
                                    false,
                                    format!(
                                        "Arbiter could not demonstrate the stuck issue: {}",
                                        result.explanation
                                    ),
                                    i,
                                );
                            }
                            ArbiterOutcome::BugConfirmed => {
                                let mut entries = vec![OpenIssue::arbiter_confirmed(&stuck)];
                                entries.extend(
                                    OpenIssue::from_review(&review)
                                        .into_iter()
                                        .filter(|entry| entry.issue_id != stuck.issue_id),
                                );
                                self.open_issues = entries;
                            }
                            ArbiterOutcome::BugRefuted => {
                                self.open_issues = OpenIssue::from_review(&review)
                                    .into_iter()
                                    .filter(|entry| entry.issue_id != stuck.issue_id)
                                    .collect();
                            }
                        }
                    } else {
                        self.open_issues = OpenIssue::from_review(&review);
                    }
                    if i >= max {
                        return self.finish_exhausted(request, i).await;
                    }
                    continue;
                }
            }
        }
    }

    /// BUILD, including the file-request sub-loop. File requests do not
    /// consume iterations; they only grow the open-issues buffer.
    async fn run_builder_turn(&mut self, request: &str) -> Result<BuilderMessage, CoreError> {
        loop {
            let state = self.shared_state(request).await;
            let message = self
                .agents
                .call_builder(&self.builder_endpoint, &state)
                .await?;
            let Some(files) = message.file_request() else {
                return Ok(message);
            };
            let note = self.read_requested_files(files).await;
            self.open_issues.push(OpenIssue::note(note));
        }
    }

    async fn read_requested_files(&self, files: &[String]) -> String {
        let mut sections = vec!["Files provided:".to_string()];
        for path in files {
            if !self.workspace.is_path_allowed(path) {
                sections.push(format!(
                    "--- {} ---\n(not available: outside the allow-list)",
                    path
                ));
                continue;
            }
            match self.workspace.read_file(path).await {
                Ok(content) => sections.push(format!("--- {} ---\n{}", path, content)),
                Err(error) => {
                    sections.push(format!("--- {} ---\n(not available: {})", path, error));
                }
            }
        }
        sections.join("\n")
    }

    /// RUN: the builder's command list, or the configured test command when
    /// the list is empty. Stops at the first non-zero exit.
    async fn run_build_commands(&mut self, run: Option<&[String]>) -> Result<bool, CoreError> {
        let commands: Vec<String> = match run {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => vec![self.config.test_command.clone()],
        };

        let mut passed = true;
        for command in &commands {
            let result = self.workspace.run_line(command).await;
            self.emit_run_result(&result)?;
            self.last_test_output = Some(format_run(command, &result));
            if !result.passed() {
                passed = false;
                break;
            }
        }
        self.last_tests_passed = passed;
        Ok(passed)
    }

    fn should_review(&self, i: u32) -> bool {
        match self.config.review_mode {
            ReviewMode::Always => true,
            ReviewMode::FinalOnly => i >= self.config.max_iterations,
            // Tests have passed by the time review is considered, so the
            // usual "review on failure" term drops out here.
            ReviewMode::Selective => {
                if i == 1 && !self.config.review_on_test_pass {
                    return false;
                }
                i >= self.config.max_iterations || i % 2 == 0
            }
        }
    }

    async fn run_diagnostics(&mut self, commands: &[String]) -> Result<(), CoreError> {
        self.emit(CycleEvent::DiagnosticRun {
            commands: commands.to_vec(),
        })?;

        let mut blocks = Vec::new();
        for command in commands {
            let result = self.workspace.run_line(command).await;
            self.emit_run_result(&result)?;
            blocks.push(format!(
                "=== {} ===\nExit code: {}\nStdout: {}\nStderr: {}\n",
                command, result.exit_code, result.stdout, result.stderr
            ));
        }
        self.open_issues.push(OpenIssue::diagnostics(&blocks.concat()));
        Ok(())
    }

    /// Forces a bug-demonstration test for a stuck issue. A failing test
    /// confirms the bug; a passing test refutes it; anything unusable is
    /// `test_invalid` and the caller terminates the cycle.
    async fn run_arbiter(
        &mut self,
        request: &str,
        issue: &Issue,
    ) -> Result<ArbiterTestResult, CoreError> {
        self.emit(CycleEvent::ArbiterMode {
            issue: issue.clone(),
        })?;

        let state = self.shared_state(request).await;
        let response = self
            .agents
            .call_arbiter(&self.builder_endpoint, &state, issue)
            .await;
        let result = match response {
            Ok(message) => self.execute_arbiter_test(message).await?,
            Err(error) => {
                ArbiterTestResult::invalid(format!("arbiter response unusable: {}", error))
            }
        };

        self.emit(CycleEvent::ArbiterResult {
            result: result.clone(),
        })?;
        Ok(result)
    }

    async fn execute_arbiter_test(
        &mut self,
        message: BuilderMessage,
    ) -> Result<ArbiterTestResult, CoreError> {
        let Some(patch) = message.patch else {
            return Ok(ArbiterTestResult::invalid(
                "arbiter message carried no test patch",
            ));
        };
        let Some(command) = message
            .run
            .as_ref()
            .and_then(|commands| commands.first())
            .cloned()
        else {
            return Ok(ArbiterTestResult::invalid(
                "arbiter message carried no run command",
            ));
        };

        if let Err(error) = self.workspace.apply_patch(&patch).await {
            return Ok(ArbiterTestResult::invalid(format!(
                "test patch rejected: {}",
                error
            )));
        }

        let result = self.workspace.run_line(&command).await;
        self.emit_run_result(&result)?;
        self.last_test_output = Some(format_run(&command, &result));

        if result.passed() {
            Ok(ArbiterTestResult::refuted(
                patch,
                "demonstration test passed; the reported scenario does not reproduce",
            ))
        } else {
            Ok(ArbiterTestResult::confirmed(
                patch,
                "demonstration test failed; the reported bug reproduces",
            ))
        }
    }

    /// Iteration-limit policy: a moderator consult can still rescue the
    /// builder when the last review carries critical or major issues.
    async fn finish_exhausted(
        &mut self,
        request: &str,
        iterations: u32,
    ) -> Result<CycleOutcome, CoreError> {
        if self.config.enable_moderator
            && self.history.last_review_has_blocking_issues()
            && self.moderator_accepts_builder(request).await?
        {
            return self.terminal(
                true,
                "Moderator accepted the builder's patch at the iteration limit.",
                iterations,
            );
        }

        let stopping = self
            .history
            .last_review()
            .map(|review| review.stopping.clone())
            .unwrap_or_default();
        let message = if stopping.is_empty() {
            "Max iterations reached with unresolved issues.".to_string()
        } else {
            format!("Max iterations reached with unresolved issues. {}", stopping)
        };
        self.terminal(false, message, iterations)
    }

    /// A moderator that fails to answer (or to parse) never overrides the
    /// reviewer.
    async fn moderator_accepts_builder(&self, request: &str) -> Result<bool, CoreError> {
        let Ok(decision) = self
            .agents
            .call_moderator(
                &self.moderator_endpoint,
                request,
                self.history.last_patch().map(String::as_str),
                self.history.last_review(),
                self.last_tests_passed,
            )
            .await
        else {
            return Ok(false);
        };

        let accepted = decision.decision == ModeratorVerdict::AcceptBuilder;
        self.emit(CycleEvent::ModeratorDecision { decision })?;
        Ok(accepted)
    }

    async fn shared_state(&self, request: &str) -> SharedState {
        let rendered: Vec<String> = self
            .open_issues
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        let joined = rendered.join("\n\n");
        let open_issues = if approx_tokens(&joined) > self.config.context_summary_threshold {
            vec![
                self.agents
                    .condense_feedback(
                        &self.builder_endpoint,
                        joined,
                        self.config.context_summary_threshold,
                    )
                    .await,
            ]
        } else {
            rendered
        };

        SharedState {
            goal: request.to_string(),
            constraints: self.constraints(),
            recent_diff: self.recent_diff.clone(),
            last_test_output: self.last_test_output.clone(),
            open_issues,
        }
    }

    fn constraints(&self) -> Vec<String> {
        vec![
            format!(
                "Only modify files matching the allow-list: {}",
                self.config.allow_paths.join(", ")
            ),
            format!("The fallback test command is: {}", self.config.test_command),
        ]
    }

    fn emit(&self, event: CycleEvent) -> Result<(), CoreError> {
        self.sink.emit(event)
    }

    fn emit_run_result(&self, result: &RunResult) -> Result<(), CoreError> {
        self.emit(CycleEvent::TestsOutput {
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
        })
    }

    fn terminal(
        &self,
        success: bool,
        message: impl Into<String>,
        iterations: u32,
    ) -> Result<CycleOutcome, CoreError> {
        let message = message.into();
        self.emit(CycleEvent::CycleComplete {
            success,
            message: message.clone(),
            iterations,
        })?;
        Ok(CycleOutcome {
            success,
            message,
            iterations,
        })
    }

    /// Unrecoverable parse/guard/apply failure: surface `error`, emit no
    /// `cycle_complete`, and abort the cycle.
    fn fatal(&self, error: CoreError) -> Result<CycleOutcome, CoreError> {
        self.emit(CycleEvent::error(error.to_string()))?;
        Err(error)
    }
}

fn format_run(command: &str, result: &RunResult) -> String {
    format!(
        "$ {}\nExit code: {}\nStdout:\n{}\nStderr:\n{}",
        command, result.exit_code, result.stdout, result.stderr
    )
}
