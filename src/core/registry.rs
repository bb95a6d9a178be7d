// src/core/registry.rs

//! # Registry
//!
//! Holds every declaration made while the application boots: commands and
//! their handlers, parameters, injection points, hooks, jobs, webhooks and
//! actions. It is filled through the `register_*` methods and then handed to
//! the [`Engine`](crate::core::engine::Engine), which only ever reads it.
//!
//! Handlers are composed once, here: a handler registered as a command is
//! stored already wrapped with the per-command hook bracket, and an action
//! handler is stored wrapped with its history recording.

use crate::core::engine::EngineError;
use crate::models::{
    Action, Args, Command, Hook, HookKind, Injection, InjectionKind, Job, Parameter, Webhook,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The future a handler returns.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// User code bound to a command name.
pub trait Handler: Send + Sync {
    fn call(&self, args: Args) -> HandlerFuture;
}

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn call(&self, args: Args) -> HandlerFuture {
        (self.0)(args).boxed()
    }
}

/// Turns an async closure into a shareable [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// How a handler is dispatched, decided at registration time.
#[derive(Clone)]
pub(crate) enum Dispatch {
    /// Called as-is. Used for hook, job and webhook handlers.
    Plain(Arc<dyn Handler>),
    /// Bracketed by BEFORE_EACH/AFTER_EACH and recorded as a `Command` entry.
    WithHooks(Arc<dyn Handler>),
    /// Recorded as an `Action` entry before it runs.
    Recorded(Action, Arc<dyn Handler>),
}

impl Dispatch {
    pub(crate) fn handler(&self) -> &Arc<dyn Handler> {
        match self {
            Self::Plain(h) | Self::WithHooks(h) | Self::Recorded(_, h) => h,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    commands: Vec<Command>,
    params: Vec<Parameter>,
    injections: Vec<Injection>,
    hooks: Vec<Hook>,
    jobs: Vec<Job>,
    webhooks: Vec<Webhook>,
    actions: Vec<Action>,
    handlers: HashMap<String, Dispatch>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<_> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Registry")
            .field("commands", &self.commands)
            .field("params", &self.params)
            .field("injections", &self.injections)
            .field("hooks", &self.hooks)
            .field("jobs", &self.jobs)
            .field("webhooks", &self.webhooks)
            .field("actions", &self.actions)
            .field("handlers", &handlers)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Registration ---

    /// Registers a command selectable from the CLI. Its handler is wrapped so
    /// every invocation runs BEFORE_EACH, records a `Command` entry, then AFTER_EACH.
    pub fn register_command<F, Fut>(&mut self, command: Command, handler: F) -> &mut Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register_command_handler(command, handler_fn(handler))
    }

    pub fn register_command_handler(
        &mut self,
        command: Command,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        if let Some(existing) = self.commands.iter_mut().find(|c| c.name == command.name) {
            log::warn!("Command '{}' registered twice; keeping the last one.", command.name);
            *existing = command.clone();
        } else {
            self.commands.push(command.clone());
        }
        self.insert_dispatch(&command.name, Dispatch::WithHooks(handler));
        self
    }

    /// Registers a handler that is not itself a CLI command, e.g. for a hook,
    /// job or webhook. If a command of the same name exists it keeps its hooks.
    pub fn register_handler<F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register_handler_object(name, handler_fn(handler))
    }

    pub fn register_handler_object(&mut self, name: &str, handler: Arc<dyn Handler>) -> &mut Self {
        let dispatch = if self.commands.iter().any(|c| c.name == name) {
            Dispatch::WithHooks(handler)
        } else {
            Dispatch::Plain(handler)
        };
        self.insert_dispatch(name, dispatch);
        self
    }

    fn insert_dispatch(&mut self, name: &str, dispatch: Dispatch) {
        if self.handlers.insert(name.to_string(), dispatch).is_some() {
            log::debug!("Handler for '{}' replaced.", name);
        }
    }

    pub fn register_param(&mut self, command: &str, mut param: Parameter) -> &mut Self {
        param.command = command.to_string();
        if let Some(existing) = self
            .params
            .iter_mut()
            .find(|p| p.command == command && p.name == param.name)
        {
            log::warn!(
                "Parameter '{}' of '{}' registered twice; keeping the last one.",
                param.name,
                command
            );
            *existing = param;
        } else {
            self.params.push(param);
        }
        self
    }

    /// Declares where an engine-built object is spliced into `command`'s arguments.
    /// A command has at most one injection point per kind; a second one replaces the first.
    pub fn register_injection(&mut self, command: &str, kind: InjectionKind, index: usize) -> &mut Self {
        if let Some(existing) = self
            .injections
            .iter_mut()
            .find(|i| i.command == command && i.kind == kind)
        {
            log::warn!(
                "{:?} injection of '{}' moved from index {} to {}.",
                kind,
                command,
                existing.index,
                index
            );
            existing.index = index;
        } else {
            self.injections.push(Injection {
                command: command.to_string(),
                kind,
                index,
            });
        }
        self
    }

    pub fn register_context(&mut self, command: &str, index: usize) -> &mut Self {
        self.register_injection(command, InjectionKind::Context, index)
    }

    pub fn register_body(&mut self, command: &str, index: usize) -> &mut Self {
        self.register_injection(command, InjectionKind::Body, index)
    }

    pub fn register_error(&mut self, command: &str, index: usize) -> &mut Self {
        self.register_injection(command, InjectionKind::Error, index)
    }

    /// Attaches `command` to a lifecycle point. Only one hook per kind is
    /// effective: the last one registered wins.
    pub fn register_hook(&mut self, kind: HookKind, command: Command) -> &mut Self {
        if let Some(previous) = self.hook(kind) {
            log::warn!(
                "Hook {} is already bound to '{}'; '{}' replaces it.",
                kind,
                previous.command.name,
                command.name
            );
        }
        self.hooks.push(Hook { kind, command });
        self
    }

    pub fn register_job(&mut self, job: Job) -> &mut Self {
        if self.jobs.iter().any(|j| j.name == job.name) {
            log::warn!("Job '{}' registered twice; keeping the last one.", job.name);
            self.jobs.retain(|j| j.name != job.name);
        }
        self.jobs.push(job);
        self
    }

    pub fn register_webhook(&mut self, webhook: Webhook) -> &mut Self {
        self.webhooks.push(webhook);
        self
    }

    pub fn register_action<F, Fut>(&mut self, action: Action, handler: F) -> &mut Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.actions.retain(|a| a.name != action.name);
        self.actions.push(action.clone());
        self.insert_dispatch(&action.name.clone(), Dispatch::Recorded(action, handler_fn(handler)));
        self
    }

    // --- Queries ---

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Finds a CLI command by name or alias.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands
            .iter()
            .find(|c| c.name == name)
            .or_else(|| {
                self.commands
                    .iter()
                    .find(|c| c.options.alias.as_deref() == Some(name))
            })
    }

    /// The parameters of `command`, ordered by their positional index.
    pub fn params_for(&self, command: &str) -> Vec<&Parameter> {
        let mut params: Vec<_> = self.params.iter().filter(|p| p.command == command).collect();
        params.sort_by_key(|p| p.index);
        params
    }

    pub fn injection(&self, command: &str, kind: InjectionKind) -> Option<usize> {
        self.injections
            .iter()
            .find(|i| i.command == command && i.kind == kind)
            .map(|i| i.index)
    }

    /// The effective hook of `kind`: the last one registered.
    pub fn hook(&self, kind: HookKind) -> Option<&Hook> {
        self.hooks.iter().rev().find(|h| h.kind == kind)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn webhooks(&self) -> &[Webhook] {
        &self.webhooks
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn dispatch(&self, name: &str) -> Option<&Dispatch> {
        self.handlers.get(name)
    }

    /// Checks that every declaration points at a registered handler.
    pub fn validate(&self) -> Result<(), EngineError> {
        let referenced = self
            .hooks
            .iter()
            .map(|h| &h.command.name)
            .chain(self.jobs.iter().map(|j| &j.command.name))
            .chain(self.webhooks.iter().map(|w| &w.command.name))
            .chain(self.params.iter().map(|p| &p.command))
            .chain(self.injections.iter().map(|i| &i.command));

        for name in referenced {
            if !self.has_handler(name) {
                return Err(EngineError::MissingHandler(name.clone()));
            }
        }
        Ok(())
    }
}
