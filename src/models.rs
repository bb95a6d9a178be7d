// src/models.rs

use crate::core::{api::ExecutionContext, validators::Validator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// --- REGISTRATION MODELS ---
// Everything in this section is written once during bootstrap and treated as
// immutable once the engine is built.

/// Presentation options of a command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOptions {
    pub description: String,
    pub alias: Option<String>,
}

/// A named operation the engine can dispatch to a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub options: CommandOptions,
}

impl Command {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: CommandOptions {
                description: description.into(),
                alias: None,
            },
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.options.alias = Some(alias.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.options.description
    }
}

/// Options that control how a parameter value is obtained and checked.
#[derive(Clone, Default)]
pub struct ParamOptions {
    /// Shown as the prompt question and as the CLI flag help.
    pub description: String,
    pub optional: bool,
    pub validators: Vec<Arc<dyn Validator>>,
}

impl fmt::Debug for ParamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamOptions")
            .field("description", &self.description)
            .field("optional", &self.optional)
            .field(
                "validators",
                &self.validators.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A declared argument of a command, placed at `index` in the handler's argument list.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    /// Name of the owning command.
    pub command: String,
    pub index: usize,
    pub options: ParamOptions,
}

impl Parameter {
    /// Creates a required parameter. The owning command is set on registration.
    pub fn new(name: impl Into<String>, index: usize, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: String::new(),
            index,
            options: ParamOptions {
                description: description.into(),
                optional: false,
                validators: Vec::new(),
            },
        }
    }

    pub fn optional(mut self) -> Self {
        self.options.optional = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.options.validators.push(Arc::new(validator));
        self
    }
}

/// The engine-built objects that can be spliced into a handler's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionKind {
    Context,
    Body,
    Error,
}

/// Marks where an engine-built object goes in a command's argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub command: String,
    pub kind: InjectionKind,
    pub index: usize,
}

/// The lifecycle points a hook can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookKind {
    OnStart,
    Error,
    BeforeAll,
    AfterAll,
    BeforeEach,
    AfterEach,
}

impl HookKind {
    pub const ALL: [Self; 6] = [
        Self::OnStart,
        Self::Error,
        Self::BeforeAll,
        Self::AfterAll,
        Self::BeforeEach,
        Self::AfterEach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnStart => "ON_START",
            Self::Error => "ERROR",
            Self::BeforeAll => "BEFORE_ALL",
            Self::AfterAll => "AFTER_ALL",
            Self::BeforeEach => "BEFORE_EACH",
            Self::AfterEach => "AFTER_EACH",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub kind: HookKind,
    pub command: Command,
}

/// A command bound to a cron schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub command: Command,
    pub schedule: String,
}

impl Job {
    pub fn new(command: Command, schedule: impl Into<String>) -> Self {
        Self {
            name: command.name.clone(),
            command,
            schedule: schedule.into(),
        }
    }
}

/// A command bound to an HTTP POST path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub path: String,
    pub command: Command,
}

impl Webhook {
    pub fn new(path: impl Into<String>, command: Command) -> Self {
        Self {
            path: path.into(),
            command,
        }
    }
}

/// A plugin operation whose invocations are recorded as `Action` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub plugin: String,
    pub description: String,
}

// --- HISTORY MODELS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Command,
    Hook,
    Webhook,
    Job,
    Action,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Command => "Command",
            Self::Hook => "Hook",
            Self::Webhook => "Webhook",
            Self::Job => "Job",
            Self::Action => "Action",
        };
        f.write_str(label)
    }
}

/// A fine-grained step reported by a running command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAction {
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryAction {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub sub_actions: Vec<HistoryAction>,
}

impl HistoryEntry {
    pub fn new(kind: EntryKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            timestamp: Utc::now(),
            sub_actions: Vec::new(),
        }
    }
}

/// One row of the exported, read-only timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineRow {
    /// 1-based position in the timeline.
    pub index: usize,
    pub kind: EntryKind,
    pub name: String,
    pub description: String,
    /// Time elapsed until the next entry; `None` for the last one.
    pub duration_to_next: Option<Duration>,
    pub sub_actions: Vec<HistoryAction>,
}

// --- INVOCATION MODELS ---

/// What the ERROR hook receives about the failure that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    /// The command whose invocation failed.
    pub command: String,
    pub message: String,
}

/// A single resolved value handed to a handler.
#[derive(Debug, Clone)]
pub enum Argument {
    Value(Value),
    /// An optional parameter that was not supplied.
    Empty,
    Context(ExecutionContext),
    Body(Value),
    Error(HandlerFailure),
}

impl Argument {
    pub fn kind(&self) -> Option<InjectionKind> {
        match self {
            Self::Context(_) => Some(InjectionKind::Context),
            Self::Body(_) => Some(InjectionKind::Body),
            Self::Error(_) => Some(InjectionKind::Error),
            Self::Value(_) | Self::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) | Self::Body(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }
}

/// The ordered argument list a handler is called with.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Argument>);

impl Args {
    pub fn new(args: Vec<Argument>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.get(index).and_then(Argument::as_value)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Argument::as_str)
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.0.iter().find_map(|a| match a {
            Argument::Context(ctx) => Some(ctx),
            _ => None,
        })
    }

    pub fn body(&self) -> Option<&Value> {
        self.0.iter().find_map(|a| match a {
            Argument::Body(body) => Some(body),
            _ => None,
        })
    }

    pub fn error(&self) -> Option<&HandlerFailure> {
        self.0.iter().find_map(|a| match a {
            Argument::Error(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Argument> {
        self.0
    }
}

/// Values supplied from outside (CLI flags) for one run, keyed by command and parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppliedArgs {
    values: HashMap<String, HashMap<String, Value>>,
}

impl SuppliedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: &str, param: &str, value: impl Into<Value>) {
        self.values
            .entry(command.to_string())
            .or_default()
            .insert(param.to_string(), value.into());
    }

    pub fn with(mut self, command: &str, param: &str, value: impl Into<Value>) -> Self {
        self.insert(command, param, value);
        self
    }

    pub fn get(&self, command: &str, param: &str) -> Option<&Value> {
        self.values.get(command).and_then(|params| params.get(param))
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(HashMap::is_empty)
    }
}

/// A request for one top-level run: the commands to execute, in order, and
/// the values already known for their parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub commands: Vec<String>,
    pub supplied: SuppliedArgs,
}

impl Invocation {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            supplied: SuppliedArgs::default(),
        }
    }

    pub fn with_supplied(mut self, supplied: SuppliedArgs) -> Self {
        self.supplied = supplied;
        self
    }
}
