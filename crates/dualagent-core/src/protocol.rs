use std::sync::Arc;

use dualagent_llm::{Client, Message, Request, StreamAccumulator, StreamEvent};
use futures::StreamExt;

use crate::config::{Config, ReviewStrictness};
use crate::errors::CoreError;
use crate::events::{AgentRole, CycleEvent, EventSink};
use crate::messages::{
    BuilderMessage, Issue, ModeratorDecision, Review, SharedState, parse_builder_message,
    parse_moderator_decision, parse_review,
};
use crate::prompts;

/// Raw-feedback fallback when summarization itself fails.
const SUMMARY_FALLBACK_CHARS: usize = 2_000;

/// Token count approximated as one token per four bytes.
pub fn approx_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Provider and model a role's requests are routed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub provider: String,
    pub model: String,
}

impl AgentEndpoint {
    pub fn builder_from(config: &Config) -> Self {
        Self {
            provider: config.builder_provider.id().to_string(),
            model: config.builder_model().to_string(),
        }
    }

    pub fn reviewer_from(config: &Config) -> Self {
        Self {
            provider: config.reviewer_provider.id().to_string(),
            model: config.reviewer_model().to_string(),
        }
    }

    pub fn moderator_from(config: &Config) -> Self {
        Self {
            provider: config.moderator_provider.id().to_string(),
            model: config.moderator_model().to_string(),
        }
    }
}

/// Sends role prompts to providers, forwards streamed tokens to the event
/// sink, and parses the final JSON payload into a typed message.
pub struct AgentCaller {
    client: Arc<Client>,
    sink: Arc<dyn EventSink>,
}

impl AgentCaller {
    pub fn new(client: Arc<Client>, sink: Arc<dyn EventSink>) -> Self {
        Self { client, sink }
    }

    async fn call_streaming(
        &self,
        role: AgentRole,
        endpoint: &AgentEndpoint,
        system: &str,
        user: &str,
    ) -> Result<String, CoreError> {
        let request = Request::new(
            endpoint.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_provider(endpoint.provider.clone());

        let mut stream = self.client.stream(request).await?;
        let mut accumulator = StreamAccumulator::new();
        while let Some(event) = stream.next().await {
            let event = event?;
            if let StreamEvent::TextDelta { delta } = &event {
                self.sink.emit(CycleEvent::stream_chunk(role, delta.clone()))?;
            }
            accumulator.process(&event);
        }

        let response = accumulator.into_response(&endpoint.provider, &endpoint.model)?;
        Ok(response.text().to_string())
    }

    pub async fn call_builder(
        &self,
        endpoint: &AgentEndpoint,
        state: &SharedState,
    ) -> Result<BuilderMessage, CoreError> {
        let raw = self
            .call_streaming(
                AgentRole::Builder,
                endpoint,
                prompts::BUILDER_SYSTEM_PROMPT,
                &prompts::render_shared_state(state),
            )
            .await?;
        Ok(parse_builder_message(&raw)?)
    }

    /// Arbiter turns reuse the builder persona with a forced test-only brief.
    pub async fn call_arbiter(
        &self,
        endpoint: &AgentEndpoint,
        state: &SharedState,
        issue: &Issue,
    ) -> Result<BuilderMessage, CoreError> {
        let raw = self
            .call_streaming(
                AgentRole::Builder,
                endpoint,
                prompts::BUILDER_SYSTEM_PROMPT,
                &prompts::render_arbiter_request(state, issue),
            )
            .await?;
        Ok(parse_builder_message(&raw)?)
    }

    pub async fn call_reviewer(
        &self,
        endpoint: &AgentEndpoint,
        strictness: ReviewStrictness,
        state: &SharedState,
        builder: &BuilderMessage,
    ) -> Result<Review, CoreError> {
        let system = prompts::reviewer_system_prompt(strictness);
        let raw = self
            .call_streaming(
                AgentRole::Reviewer,
                endpoint,
                &system,
                &prompts::render_review_request(state, builder),
            )
            .await?;
        Ok(parse_review(&raw)?)
    }

    pub async fn call_moderator(
        &self,
        endpoint: &AgentEndpoint,
        request: &str,
        last_patch: Option<&str>,
        last_review: Option<&Review>,
        tests_passed: bool,
    ) -> Result<ModeratorDecision, CoreError> {
        let raw = self
            .call_streaming(
                AgentRole::Moderator,
                endpoint,
                prompts::MODERATOR_SYSTEM_PROMPT,
                &prompts::render_moderator_request(request, last_patch, last_review, tests_passed),
            )
            .await?;
        Ok(parse_moderator_decision(&raw)?)
    }

    /// Compress feedback that exceeds the configured token ceiling.
    ///
    /// The summary request goes to the builder's provider without streaming;
    /// if it fails, the raw feedback is truncated instead.
    pub async fn condense_feedback(
        &self,
        endpoint: &AgentEndpoint,
        feedback: String,
        threshold_tokens: usize,
    ) -> String {
        if approx_tokens(&feedback) <= threshold_tokens {
            return feedback;
        }

        let request = Request::new(
            endpoint.model.clone(),
            vec![
                Message::system(prompts::SUMMARIZER_SYSTEM_PROMPT),
                Message::user(feedback.clone()),
            ],
        )
        .with_provider(endpoint.provider.clone());

        match self.client.complete(request).await {
            Ok(response) if !response.text().trim().is_empty() => {
                response.text().trim().to_string()
            }
            _ => truncate_chars(&feedback, SUMMARY_FALLBACK_CHARS),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("\n[feedback truncated]");
    truncated
}
