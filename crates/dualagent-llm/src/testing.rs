//! Scripted adapter for driving the orchestrator in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::errors::LlmError;
use crate::provider::ProviderAdapter;
use crate::stream::{StreamEvent, StreamEventStream};
use crate::types::{Message, Request, Response, Usage};

/// Pops one canned response text per call, recording every request it sees.
///
/// Streaming splits the canned text across two deltas so consumers exercise
/// their accumulation path.
#[derive(Clone)]
pub struct ScriptedAdapter {
    name: String,
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("scripted responses mutex")
            .push_back(response.into());
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .expect("scripted requests mutex")
            .clone()
    }

    fn next_response(&self, request: Request) -> Result<String, LlmError> {
        self.requests
            .lock()
            .expect("scripted requests mutex")
            .push(request);
        self.responses
            .lock()
            .expect("scripted responses mutex")
            .pop_front()
            .ok_or_else(|| LlmError::provider(self.name.clone(), "no scripted response queued"))
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: Request) -> Result<Response, LlmError> {
        let model = request.model.clone();
        let text = self.next_response(request)?;
        Ok(Response {
            model,
            provider: self.name.clone(),
            message: Message::assistant(text),
            usage: Usage::default(),
        })
    }

    async fn stream(&self, request: Request) -> Result<StreamEventStream, LlmError> {
        let text = self.next_response(request)?;
        let split = text
            .char_indices()
            .nth(text.chars().count() / 2)
            .map(|(index, _)| index)
            .unwrap_or(0);
        let (head, tail) = text.split_at(split);
        let events = vec![
            Ok(StreamEvent::TextDelta {
                delta: head.to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                delta: tail.to_string(),
            }),
            Ok(StreamEvent::Finish {
                usage: Usage::default(),
            }),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}
