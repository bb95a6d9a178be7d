// src/core/api.rs

use crate::{
    core::{
        engine::{Engine, EngineError, RunScope},
        history::render_timeline,
        scheduler::JobStatus,
    },
    models::{Argument, HistoryAction, HistoryEntry},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Handed to a command that declared a context injection point.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub name: String,
    pub description: String,
    /// Directory of the running binary.
    pub directory: PathBuf,
    pub working_directory: PathBuf,
    pub api: Api,
}

/// Operations a running command may call back into: scheduling, webhooks and
/// the history of the run it belongs to.
#[derive(Debug, Clone)]
pub struct Api {
    engine: Engine,
    scope: RunScope,
}

impl Api {
    pub(crate) fn new(engine: Engine, scope: RunScope) -> Self {
        Self { engine, scope }
    }

    // --- Jobs ---

    pub fn start_jobs(&self) -> Result<Vec<JobStatus>, EngineError> {
        self.engine.start_jobs()
    }

    pub fn start_job(&self, name: &str) -> Result<JobStatus, EngineError> {
        self.engine.start_job(name)
    }

    pub fn cancel_jobs(&self) -> Vec<JobStatus> {
        self.engine.cancel_jobs()
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.engine.jobs()
    }

    // --- Webhooks ---

    pub async fn start_webhooks(&self, port: Option<u16>) -> Result<SocketAddr, EngineError> {
        let port = port.unwrap_or(self.engine.config().webhook_port);
        self.engine.start_webhooks(port).await
    }

    pub async fn stop_webhooks(&self) -> bool {
        self.engine.stop_webhooks().await
    }

    // --- History ---

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.scope.history().entries()
    }

    pub fn add_to_history(&self, entry: HistoryEntry) {
        self.scope.history().add_entry(entry);
    }

    pub fn latest_entry(&self) -> Option<HistoryEntry> {
        self.scope.history().latest()
    }

    /// Records a step of the current command under its history entry.
    pub fn add_action(&self, name: &str, description: &str) -> bool {
        self.scope
            .history()
            .add_action(HistoryAction::new(name, description))
    }

    pub fn print_history(&self) {
        self.engine
            .prompt()
            .present(&render_timeline(&self.scope.history().entries()));
    }

    // --- Commands ---

    // Failures below propagate to the calling command, whose own run reports
    // them to the ERROR hook.

    /// Lets the user pick a command and runs it as part of this run.
    pub async fn prompt_command_and_run(&self) -> Result<(), EngineError> {
        self.engine.select_and_run(&self.scope).await
    }

    /// Runs a registered action (or any other handler) within this run.
    pub async fn run_action(&self, name: &str, args: Vec<Argument>) -> Result<Value, EngineError> {
        self.engine.invoke(&self.scope, name, args, true).await
    }
}
