use std::sync::{Arc, Mutex};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::messages::{ArbiterTestResult, Issue, ModeratorDecision, Review};

pub type EventStream = UnboundedReceiver<CycleEvent>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Builder,
    Reviewer,
    Moderator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builder => "builder",
            Self::Reviewer => "reviewer",
            Self::Moderator => "moderator",
        }
    }
}

/// Outbound event records, emitted in the order they occur.
///
/// Consumers rely on the linearization: streaming chunks always precede the
/// structured payload (`patch_ready` / `review_ready`) of the same turn, and
/// a cycle produces exactly one terminal record (`cycle_complete` or
/// `error`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleEvent {
    Status {
        message: String,
    },
    StreamChunk {
        role: AgentRole,
        chunk: String,
    },
    PatchReady {
        patch: String,
    },
    TestsOutput {
        stdout: String,
        stderr: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    ReviewReady {
        review: Review,
    },
    ModeratorDecision {
        decision: ModeratorDecision,
    },
    ArbiterMode {
        issue: Issue,
    },
    ArbiterResult {
        result: ArbiterTestResult,
    },
    DiagnosticRun {
        commands: Vec<String>,
    },
    CycleComplete {
        success: bool,
        message: String,
        iterations: u32,
    },
    Error {
        error: String,
    },
}

impl CycleEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn stream_chunk(role: AgentRole, chunk: impl Into<String>) -> Self {
        Self::StreamChunk {
            role,
            chunk: chunk.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CycleComplete { .. } | Self::Error { .. })
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: CycleEvent) -> Result<(), CoreError>;
    fn subscribe(&self) -> EventStream;
}

#[derive(Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: CycleEvent) -> Result<(), CoreError> {
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let (sender, receiver) = unbounded();
        drop(sender);
        receiver
    }
}

#[derive(Default)]
struct BufferedState {
    events: Vec<CycleEvent>,
    subscribers: Vec<UnboundedSender<CycleEvent>>,
}

/// Retains every event and replays the backlog to late subscribers.
#[derive(Clone, Default)]
pub struct BufferedEventSink {
    inner: Arc<Mutex<BufferedState>>,
}

impl BufferedEventSink {
    pub fn snapshot(&self) -> Vec<CycleEvent> {
        let guard = self.inner.lock().expect("buffered sink mutex poisoned");
        guard.events.clone()
    }
}

impl EventSink for BufferedEventSink {
    fn emit(&self, event: CycleEvent) -> Result<(), CoreError> {
        let mut guard = self.inner.lock().expect("buffered sink mutex poisoned");
        guard.events.push(event.clone());

        let mut active = Vec::with_capacity(guard.subscribers.len());
        for subscriber in guard.subscribers.drain(..) {
            if subscriber.unbounded_send(event.clone()).is_ok() {
                active.push(subscriber);
            }
        }
        guard.subscribers = active;
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let (sender, receiver) = unbounded();
        let mut guard = self.inner.lock().expect("buffered sink mutex poisoned");
        for event in &guard.events {
            if sender.unbounded_send(event.clone()).is_err() {
                return receiver;
            }
        }
        guard.subscribers.push(sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, executor::block_on};

    #[test]
    fn tagged_union_uses_wire_names() {
        let json = serde_json::to_string(&CycleEvent::TestsOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_code: 0,
        })
        .expect("event should serialize");
        assert!(json.contains("\"type\":\"tests_output\""));
        assert!(json.contains("\"exitCode\":0"));

        let json = serde_json::to_string(&CycleEvent::stream_chunk(AgentRole::Builder, "hi"))
            .expect("event should serialize");
        assert!(json.contains("\"type\":\"stream_chunk\""));
        assert!(json.contains("\"role\":\"builder\""));
    }

    #[test]
    fn buffered_sink_stores_events_in_emission_order() {
        let sink = BufferedEventSink::default();
        sink.emit(CycleEvent::status("Iteration 1/3"))
            .expect("emit should succeed");
        sink.emit(CycleEvent::PatchReady {
            patch: "--- a/x".to_string(),
        })
        .expect("emit should succeed");

        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CycleEvent::Status { .. }));
        assert!(matches!(events[1], CycleEvent::PatchReady { .. }));
    }

    #[test]
    fn buffered_sink_replays_backlog_to_late_subscribers() {
        let sink = BufferedEventSink::default();
        sink.emit(CycleEvent::status("early"))
            .expect("emit should succeed");

        let mut stream = sink.subscribe();
        sink.emit(CycleEvent::status("late"))
            .expect("emit should succeed");

        let first = block_on(stream.next()).expect("backlog event");
        let second = block_on(stream.next()).expect("live event");
        assert_eq!(first, CycleEvent::status("early"));
        assert_eq!(second, CycleEvent::status("late"));
    }

    #[test]
    fn terminal_detection_covers_both_terminal_records() {
        assert!(
            CycleEvent::CycleComplete {
                success: true,
                message: "done".to_string(),
                iterations: 1,
            }
            .is_terminal()
        );
        assert!(CycleEvent::error("boom").is_terminal());
        assert!(!CycleEvent::status("working").is_terminal());
    }
}
