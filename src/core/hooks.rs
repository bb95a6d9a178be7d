// src/core/hooks.rs

//! # Hook Pipeline
//!
//! Lifecycle hooks run through the same dispatch path as commands, so they
//! can declare their own parameters and injections. They are never bracketed
//! by BEFORE_EACH/AFTER_EACH themselves.
//!
//! Failures are routed to the ERROR hook only where a run is entered
//! ([`Engine::run`], [`Engine::run_command`] and [`Engine::run_hook`]), so each
//! failure reaches it exactly once. Calls a running command makes through its
//! api handle propagate their failure instead. An ERROR hook that fails is
//! logged and dropped.

use crate::{
    core::engine::{Engine, EngineError, RunScope},
    models::{Argument, EntryKind, HandlerFailure, HistoryEntry, HookKind},
};

impl Engine {
    /// Runs the hook registered for `kind`, if any.
    ///
    /// Returns `Ok(false)` when nothing is registered for `kind`. A failing
    /// hook (other than ERROR) is reported to the ERROR hook and returned.
    pub async fn run_hook(
        &self,
        scope: &RunScope,
        kind: HookKind,
        extras: Vec<Argument>,
    ) -> Result<bool, EngineError> {
        match self.invoke_hook(scope, kind, extras).await {
            Err(err) if kind != HookKind::Error => {
                self.report_failure(scope, &err).await;
                Err(err)
            }
            result => result,
        }
    }

    pub(crate) async fn invoke_hook(
        &self,
        scope: &RunScope,
        kind: HookKind,
        extras: Vec<Argument>,
    ) -> Result<bool, EngineError> {
        let Some(hook) = self.inner.registry.hook(kind) else {
            return Ok(false);
        };

        log::debug!("Running {} hook '{}'", kind, hook.command.name);
        scope.history().add_entry(HistoryEntry::new(
            EntryKind::Hook,
            &hook.command.name,
            kind.as_str(),
        ));
        self.invoke(scope, &hook.command.name, extras, false).await?;
        Ok(true)
    }

    /// Hands a failure to the ERROR hook, then logs it.
    pub(crate) async fn report_failure(&self, scope: &RunScope, err: &EngineError) {
        let failure = HandlerFailure {
            command: err.command().unwrap_or_default().to_string(),
            message: err.to_string(),
        };

        if let Err(hook_err) = self
            .invoke_hook(scope, HookKind::Error, vec![Argument::Error(failure)])
            .await
        {
            log::warn!("ERROR hook failed while handling '{}': {}", err, hook_err);
        }
        log::error!("{}", err);
    }
}
