// src/core/engine.rs

use crate::{
    core::{
        api::{Api, ExecutionContext},
        config::AppConfig,
        history::History,
        parameters::ParameterResolver,
        prompt::PromptSource,
        registry::{Dispatch, Handler, Registry},
        scheduler::{JobStatus, Scheduler},
        webhook::WebhookDispatcher,
    },
    models::{
        Args, Argument, Command, EntryKind, HistoryEntry, HookKind, Invocation, SuppliedArgs,
    },
};
use colored::*;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::fmt::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("No handler registered for '{0}'")]
    MissingHandler(String),
    #[error("No commands are registered")]
    NoCommands,
    #[error("Could not resolve parameter '{param}' of '{command}': {reason}")]
    Resolution {
        command: String,
        param: String,
        reason: String,
    },
    #[error("Could not select a command: {0}")]
    Selection(String),
    #[error("Command '{command}' failed: {cause:#}")]
    Handler {
        command: String,
        cause: anyhow::Error,
    },
    #[error("Invalid schedule '{schedule}' for job '{job}': {reason}")]
    InvalidSchedule {
        job: String,
        schedule: String,
        reason: String,
    },
    #[error("Unknown job '{0}'")]
    UnknownJob(String),
    #[error("Jobs and webhooks need a running Tokio runtime")]
    NoRuntime,
    #[error("Invalid webhook path '{0}'")]
    InvalidWebhookPath(String),
    #[error("Webhook path '{0}' is registered twice")]
    DuplicateWebhookPath(String),
    #[error("Webhooks are already listening on {0}")]
    WebhooksRunning(SocketAddr),
    #[error("Could not listen for webhooks on {addr}: {source}")]
    WebhookBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// The command the error is about, when there is one.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::UnknownCommand(name) | Self::MissingHandler(name) => Some(name),
            Self::Resolution { command, .. } | Self::Handler { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// The per-run state of one top-level run: its timeline and the values
/// supplied up front for its parameters.
///
/// A CLI run, each job fire and each webhook request get their own scope, so
/// concurrent runs never see or clear each other's history.
#[derive(Debug, Clone, Default)]
pub struct RunScope {
    history: History,
    supplied: Arc<SuppliedArgs>,
}

impl RunScope {
    pub fn new(supplied: SuppliedArgs) -> Self {
        Self {
            history: History::new(),
            supplied: Arc::new(supplied),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn supplied(&self) -> &SuppliedArgs {
        &self.supplied
    }
}

pub(crate) struct EngineInner {
    pub(crate) registry: Registry,
    pub(crate) config: AppConfig,
    pub(crate) prompt: Arc<dyn PromptSource>,
    pub(crate) scheduler: Scheduler,
    pub(crate) webhooks: WebhookDispatcher,
}

/// Runs registered commands. Cheap to clone; clones share the same registry,
/// scheduler and webhook server.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.inner.config.name)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builds an engine once registration is complete. Fails when a hook, job,
    /// webhook, parameter or injection refers to a name without a handler.
    pub fn new(
        registry: Registry,
        config: AppConfig,
        prompt: Arc<dyn PromptSource>,
    ) -> Result<Self, EngineError> {
        registry.validate()?;
        log::debug!(
            "Engine '{}' ready with {} command(s), {} job(s), {} webhook(s)",
            config.name,
            registry.commands().len(),
            registry.jobs().len(),
            registry.webhooks().len()
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                registry,
                config,
                prompt,
                scheduler: Scheduler::default(),
                webhooks: WebhookDispatcher::default(),
            }),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn prompt(&self) -> &dyn PromptSource {
        self.inner.prompt.as_ref()
    }

    // --- Top-level runs ---

    /// Executes one top-level run and returns its timeline.
    ///
    /// Without commands, the ON_START hook owns the run; if there is none the
    /// user picks a command interactively. The history is cleared when the
    /// run ends, whether it succeeded or not.
    pub async fn run(&self, invocation: Invocation) -> Result<Vec<HistoryEntry>, EngineError> {
        let scope = RunScope::new(invocation.supplied);
        let history = scope.history().clone();
        let _reset = scopeguard::guard((), move |_| history.clear());

        if invocation.commands.is_empty() {
            if self.run_hook(&scope, HookKind::OnStart, Vec::new()).await? {
                return Ok(scope.history().entries());
            }
            let command = self.select_command().await?;
            self.run_sequence(&scope, std::slice::from_ref(&command)).await?;
        } else {
            let commands = invocation
                .commands
                .iter()
                .map(|name| {
                    self.inner
                        .registry
                        .command(name)
                        .cloned()
                        .ok_or_else(|| EngineError::UnknownCommand(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.run_sequence(&scope, &commands).await?;
        }

        Ok(scope.history().entries())
    }

    /// Asks for a command and runs it inside `scope`, which belongs to a run
    /// already in progress. A failure is returned, not reported; the ERROR
    /// hook hears about it once the enclosing run fails.
    pub async fn select_and_run(&self, scope: &RunScope) -> Result<(), EngineError> {
        let command = self.select_command().await?;
        self.invoke_sequence(scope, std::slice::from_ref(&command)).await
    }

    async fn run_sequence(&self, scope: &RunScope, commands: &[Command]) -> Result<(), EngineError> {
        let result = self.invoke_sequence(scope, commands).await;
        if let Err(err) = &result {
            self.report_failure(scope, err).await;
        }
        result
    }

    async fn invoke_sequence(&self, scope: &RunScope, commands: &[Command]) -> Result<(), EngineError> {
        self.invoke_hook(scope, HookKind::BeforeAll, Vec::new()).await?;
        for command in commands {
            self.invoke(scope, &command.name, Vec::new(), true).await?;
        }
        self.invoke_hook(scope, HookKind::AfterAll, Vec::new()).await?;
        Ok(())
    }

    /// Presents the registered commands and waits for a valid choice, given
    /// either as a 1-based number or as a name.
    pub async fn select_command(&self) -> Result<Command, EngineError> {
        let commands = self.inner.registry.commands();
        if commands.is_empty() {
            return Err(EngineError::NoCommands);
        }

        self.inner.prompt.present(&render_command_table(commands));
        loop {
            let answer = self
                .inner
                .prompt
                .ask(t!("engine.select_prompt"))
                .await
                .map_err(|e| EngineError::Selection(format!("{:#}", e)))?;

            match pick_command(commands, answer.trim()) {
                Ok(command) => {
                    log::debug!("Selected command '{}'", command.name);
                    return Ok(command.clone());
                }
                Err(message) => self.inner.prompt.notify(&message),
            }
        }
    }

    // --- Single command dispatch ---

    /// Resolves the arguments of `name`, calls its handler and returns the
    /// handler's value. A failure goes to the ERROR hook, is logged, and is
    /// then returned to the caller.
    pub fn run_command<'a>(
        &'a self,
        scope: &'a RunScope,
        name: &'a str,
        extras: Vec<Argument>,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        async move {
            match self.invoke(scope, name, extras, true).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    self.report_failure(scope, &err).await;
                    Err(err)
                }
            }
        }
        .boxed()
    }

    /// Dispatch without error reporting, for calls made from inside a run.
    /// `bracket` is false for hook handlers, which never run the per-command
    /// hooks themselves.
    pub(crate) fn invoke<'a>(
        &'a self,
        scope: &'a RunScope,
        name: &'a str,
        extras: Vec<Argument>,
        bracket: bool,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        async move {
            let dispatch = self
                .inner
                .registry
                .dispatch(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownCommand(name.to_string()))?;

            let command = self.describe(name);
            let context = self.context_for(scope, &command);
            let args = ParameterResolver::new(
                &self.inner.registry,
                self.inner.prompt.as_ref(),
                self.inner.config.max_validation_attempts,
            )
            .resolve(name, scope.supplied(), Some(context), extras)
            .await?;

            match dispatch {
                Dispatch::WithHooks(handler) if bracket => {
                    self.invoke_hook(scope, HookKind::BeforeEach, Vec::new()).await?;
                    scope.history().add_entry(HistoryEntry::new(
                        EntryKind::Command,
                        &command.name,
                        command.description(),
                    ));
                    let value = call(&handler, name, args).await?;
                    self.invoke_hook(scope, HookKind::AfterEach, Vec::new()).await?;
                    Ok(value)
                }
                Dispatch::Recorded(action, handler) => {
                    scope.history().add_entry(HistoryEntry::new(
                        EntryKind::Action,
                        &action.name,
                        &action.description,
                    ));
                    call(&handler, name, args).await
                }
                other => call(other.handler(), name, args).await,
            }
        }
        .boxed()
    }

    /// The command metadata for any dispatchable name, including hook, job,
    /// webhook and action handlers that are not CLI commands.
    fn describe(&self, name: &str) -> Command {
        let registry = &self.inner.registry;
        if let Some(command) = registry.commands().iter().find(|c| c.name == name) {
            return command.clone();
        }
        let bound = registry
            .jobs()
            .iter()
            .map(|j| &j.command)
            .chain(registry.webhooks().iter().map(|w| &w.command))
            .chain(HookKind::ALL.iter().filter_map(|k| registry.hook(*k).map(|h| &h.command)))
            .find(|c| c.name == name);
        if let Some(command) = bound {
            return command.clone();
        }
        match registry.actions().iter().find(|a| a.name == name) {
            Some(action) => Command::new(&action.name, &action.description),
            None => Command::new(name, ""),
        }
    }

    pub fn context_for(&self, scope: &RunScope, command: &Command) -> ExecutionContext {
        ExecutionContext {
            name: command.name.clone(),
            description: command.description().to_string(),
            directory: binary_directory(),
            working_directory: working_directory(),
            api: Api::new(self.clone(), scope.clone()),
        }
    }

    // --- Jobs ---

    /// Starts a trigger for every registered job. Schedules are checked first,
    /// so an invalid one leaves every job stopped.
    pub fn start_jobs(&self) -> Result<Vec<JobStatus>, EngineError> {
        let jobs = self.inner.registry.jobs();
        for job in jobs {
            crate::core::scheduler::check_schedule(job)?;
        }
        jobs.iter()
            .map(|job| self.inner.scheduler.start(self, job))
            .collect()
    }

    pub fn start_job(&self, name: &str) -> Result<JobStatus, EngineError> {
        let job = self
            .inner
            .registry
            .job(name)
            .ok_or_else(|| EngineError::UnknownJob(name.to_string()))?;
        self.inner.scheduler.start(self, job)
    }

    /// Stops every trigger. Already running fires finish on their own.
    pub fn cancel_jobs(&self) -> Vec<JobStatus> {
        self.inner.scheduler.cancel_all(self.inner.registry.jobs())
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.inner
            .registry
            .jobs()
            .iter()
            .map(|job| self.inner.scheduler.status(job))
            .collect()
    }

    // --- Webhooks ---

    /// Binds the webhook server on the configured host. Port 0 picks a free port.
    pub async fn start_webhooks(&self, port: u16) -> Result<SocketAddr, EngineError> {
        self.inner
            .webhooks
            .start(self, &self.inner.config.webhook_host, port)
            .await
    }

    /// Shuts the webhook server down. Returns `false` if it was not running.
    pub async fn stop_webhooks(&self) -> bool {
        self.inner.webhooks.stop().await
    }

    pub fn webhook_addr(&self) -> Option<SocketAddr> {
        self.inner.webhooks.addr()
    }
}

async fn call(handler: &Arc<dyn Handler>, name: &str, args: Vec<Argument>) -> Result<Value, EngineError> {
    log::debug!("Calling '{}' with {} argument(s)", name, args.len());
    handler
        .call(Args::new(args))
        .await
        .map_err(|cause| EngineError::Handler {
            command: name.to_string(),
            cause,
        })
}

fn binary_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
}

fn working_directory() -> PathBuf {
    std::env::current_dir()
        .map(|dir| dunce::simplified(&dir).to_path_buf())
        .unwrap_or_default()
}

// --- Selection helpers ---

fn render_command_table(commands: &[Command]) -> String {
    let name_width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0).max(7);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("{:>3}  {:<name_width$}  {}", "#", "Command", "Description").bold()
    );
    for (i, command) in commands.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<name_width$}  {}",
            (i + 1).to_string().blue(),
            command.name,
            command.description()
        );
    }
    out
}

fn pick_command<'c>(commands: &'c [Command], answer: &str) -> Result<&'c Command, String> {
    let out_of_range = || format!(t!("engine.select_range"), max = commands.len());

    if answer.is_empty() {
        return Err(out_of_range());
    }
    if let Ok(number) = answer.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|i| commands.get(i))
            .ok_or_else(out_of_range);
    }
    commands
        .iter()
        .find(|c| c.name == answer)
        .ok_or_else(|| format!(t!("engine.select_unknown"), name = answer))
}
