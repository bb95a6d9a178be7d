// src/core/parameters.rs

use crate::{
    core::{
        api::ExecutionContext,
        engine::EngineError,
        prompt::PromptSource,
        registry::Registry,
        validators::{Validation, run_chain},
    },
    models::{Argument, Parameter, SuppliedArgs},
};
use serde_json::Value;

/// Builds the ordered argument list of one command invocation.
///
/// Parameters are taken in positional order. A supplied value is used as-is,
/// a missing optional one becomes [`Argument::Empty`], and a missing required
/// one is asked through the [`PromptSource`]. Every obtained value then runs
/// through the parameter's validator chain; a rejected value is reported and
/// asked for again.
///
/// Engine-built objects (context, request body, error) are spliced in last, at
/// the index the command declared for them. Objects without a declared index
/// are appended, except the context, which is only passed where declared.
pub struct ParameterResolver<'a> {
    registry: &'a Registry,
    prompt: &'a dyn PromptSource,
    max_attempts: Option<usize>,
}

impl std::fmt::Debug for ParameterResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterResolver")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<'a> ParameterResolver<'a> {
    pub fn new(
        registry: &'a Registry,
        prompt: &'a dyn PromptSource,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            registry,
            prompt,
            max_attempts,
        }
    }

    pub async fn resolve(
        &self,
        command: &str,
        supplied: &SuppliedArgs,
        context: Option<ExecutionContext>,
        extras: Vec<Argument>,
    ) -> Result<Vec<Argument>, EngineError> {
        let params = self.registry.params_for(command);
        log::debug!("Resolving {} parameter(s) for '{}'", params.len(), command);

        let mut args = Vec::with_capacity(params.len() + extras.len() + 1);
        for param in params {
            let supplied_value = supplied.get(command, &param.name).cloned();
            args.push(self.resolve_param(param, supplied_value).await?);
        }

        Ok(self.splice(command, args, context, extras))
    }

    async fn resolve_param(
        &self,
        param: &Parameter,
        supplied: Option<Value>,
    ) -> Result<Argument, EngineError> {
        let mut candidate = supplied;
        let mut failures = 0usize;

        loop {
            let raw = match candidate.take() {
                Some(value) => value,
                // After a rejection the user clearly meant to give a value, so
                // an optional parameter is asked for instead of left empty.
                None if param.options.optional && failures == 0 => return Ok(Argument::Empty),
                None => Value::String(self.ask(param).await?),
            };

            match run_chain(&param.options.validators, raw) {
                Validation::Valid(value) => return Ok(Argument::Value(value)),
                Validation::Invalid(message) => {
                    failures += 1;
                    log::debug!(
                        "Parameter '{}' of '{}' rejected ({} time(s)): {}",
                        param.name,
                        param.command,
                        failures,
                        message
                    );
                    self.prompt.notify(&message);

                    if let Some(max) = self.max_attempts
                        && failures >= max
                    {
                        return Err(EngineError::Resolution {
                            command: param.command.clone(),
                            param: param.name.clone(),
                            reason: format!("{} ({} attempts)", message, failures),
                        });
                    }
                }
            }
        }
    }

    async fn ask(&self, param: &Parameter) -> Result<String, EngineError> {
        self.prompt
            .ask(&param.options.description)
            .await
            .map_err(|e| EngineError::Resolution {
                command: param.command.clone(),
                param: param.name.clone(),
                reason: format!("{:#}", e),
            })
    }

    fn splice(
        &self,
        command: &str,
        mut args: Vec<Argument>,
        context: Option<ExecutionContext>,
        extras: Vec<Argument>,
    ) -> Vec<Argument> {
        let mut placed: Vec<(usize, Argument)> = Vec::new();
        let mut trailing = Vec::new();

        let injected = context.map(Argument::Context).into_iter().chain(extras);
        for arg in injected {
            let index = arg
                .kind()
                .and_then(|kind| self.registry.injection(command, kind));
            match index {
                Some(index) => placed.push((index, arg)),
                None if matches!(arg, Argument::Context(_)) => {}
                None => trailing.push(arg),
            }
        }

        // Inserting in ascending index order lands every object on its declared
        // index while the parameters keep their relative order.
        placed.sort_by_key(|(index, _)| *index);
        for (index, arg) in placed {
            let at = index.min(args.len());
            args.insert(at, arg);
        }
        args.extend(trailing);
        args
    }
}
