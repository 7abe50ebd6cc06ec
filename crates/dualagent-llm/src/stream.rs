use std::pin::Pin;

use futures::Stream;

use crate::errors::LlmError;
use crate::types::{Message, Response, Usage};

/// One streamed increment of a completion.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    TextDelta { delta: String },
    Finish { usage: Usage },
    StreamError { message: String },
}

pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Folds a delta sequence back into a [`Response`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    usage: Option<Usage>,
    error: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { delta } => self.text.push_str(delta),
            StreamEvent::Finish { usage } => self.usage = Some(usage.clone()),
            StreamEvent::StreamError { message } => self.error = Some(message.clone()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_response(
        self,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Response, LlmError> {
        if let Some(message) = self.error {
            return Err(LlmError::Stream(message));
        }
        Ok(Response {
            model: model.into(),
            provider: provider.into(),
            message: Message::assistant(self.text),
            usage: self.usage.unwrap_or_default(),
        })
    }
}
