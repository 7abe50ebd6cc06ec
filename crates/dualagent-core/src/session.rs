use std::path::PathBuf;
use std::sync::Arc;

use dualagent_llm::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::cycle::{Cycle, CycleOutcome};
use crate::errors::CoreError;
use crate::events::{CycleEvent, EventSink};
use crate::guard::AllowList;
use crate::protocol::AgentCaller;
use crate::workspace::Workspace;

/// Inbound client records.
///
/// `apply_patch` and `run_tests` hit the workspace guard and runner directly
/// without involving any agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    RunCycle { request: String },
    ApplyPatch { patch: String },
    RunTests {},
}

/// One connected client: a workspace view, an event sink, and at most one
/// cycle at a time. Nothing here is shared across sessions; each session
/// owns its history and open-issues buffer through the cycles it spawns.
pub struct Session {
    id: String,
    config: Config,
    workspace: Arc<Workspace>,
    agents: Arc<AgentCaller>,
    sink: Arc<dyn EventSink>,
}

impl Session {
    pub fn new(
        config: Config,
        workspace_root: impl Into<PathBuf>,
        client: Arc<Client>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, CoreError> {
        let allow_list = AllowList::new(&config.allow_paths)?;
        let workspace = Arc::new(Workspace::new(workspace_root, allow_list));
        let agents = Arc::new(AgentCaller::new(client, sink.clone()));
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config,
            workspace,
            agents,
            sink,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Dispatch one inbound record. Taking `&mut self` keeps operations
    /// strictly sequential per session; a second cycle cannot start while
    /// one is in flight.
    pub async fn handle(&mut self, command: ClientCommand) -> Result<(), CoreError> {
        match command {
            ClientCommand::RunCycle { request } => {
                self.run_cycle(&request).await?;
                Ok(())
            }
            ClientCommand::ApplyPatch { patch } => self.apply_patch(&patch).await,
            ClientCommand::RunTests {} => self.run_tests().await,
        }
    }

    /// Drive one full cycle. Each call builds a fresh [`Cycle`]; no mutable
    /// state survives from previous requests.
    pub async fn run_cycle(&mut self, request: &str) -> Result<CycleOutcome, CoreError> {
        let cycle = Cycle::new(
            self.config.clone(),
            self.workspace.clone(),
            self.agents.clone(),
            self.sink.clone(),
        );
        cycle.run_cycle(request).await
    }

    async fn apply_patch(&self, patch: &str) -> Result<(), CoreError> {
        match self.workspace.apply_patch(patch).await {
            Ok(()) => {
                self.sink.emit(CycleEvent::PatchReady {
                    patch: patch.to_string(),
                })?;
                self.sink.emit(CycleEvent::status("Patch applied."))
            }
            Err(error) => {
                self.sink.emit(CycleEvent::error(error.to_string()))?;
                Err(error)
            }
        }
    }

    async fn run_tests(&self) -> Result<(), CoreError> {
        let result = self.workspace.run_line(&self.config.test_command).await;
        self.sink.emit(CycleEvent::TestsOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        })
    }
}
