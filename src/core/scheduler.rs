// src/core/scheduler.rs

use crate::{
    core::engine::{Engine, EngineError, RunScope},
    models::{EntryKind, HistoryEntry, HookKind, Job},
};
use chrono::Utc;
use cron::Schedule;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A job as seen from outside the scheduler. `active_trigger` is set exactly
/// while the job is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub command: String,
    pub schedule: String,
    pub active_trigger: Option<Uuid>,
}

#[derive(Debug)]
struct Trigger {
    id: Uuid,
    task: JoinHandle<()>,
}

/// Owns the trigger task of every scheduled job.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    triggers: Mutex<HashMap<String, Trigger>>,
}

impl Scheduler {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Trigger>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `job`. A job that is already scheduled gets a fresh trigger.
    pub(crate) fn start(&self, engine: &Engine, job: &Job) -> Result<JobStatus, EngineError> {
        let schedule = check_schedule(job)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let id = Uuid::new_v4();
        let task = runtime.spawn(trigger_loop(engine.clone(), job.clone(), schedule));
        if let Some(previous) = self.lock().insert(job.name.clone(), Trigger { id, task }) {
            log::debug!("Replacing trigger {} of job '{}'", previous.id, job.name);
            previous.task.abort();
        }

        log::info!("Job '{}' scheduled ({})", job.name, job.schedule);
        Ok(self.status(job))
    }

    /// Stops every trigger. Calling it again is harmless.
    pub(crate) fn cancel_all(&self, jobs: &[Job]) -> Vec<JobStatus> {
        let drained: Vec<(String, Trigger)> = self.lock().drain().collect();
        for (name, trigger) in drained {
            trigger.task.abort();
            log::info!("Job '{}' cancelled", name);
        }
        jobs.iter().map(|job| self.status(job)).collect()
    }

    pub(crate) fn status(&self, job: &Job) -> JobStatus {
        JobStatus {
            name: job.name.clone(),
            command: job.command.name.clone(),
            schedule: job.schedule.clone(),
            active_trigger: self.lock().get(&job.name).map(|t| t.id),
        }
    }
}

async fn trigger_loop(engine: Engine, job: Job, schedule: Schedule) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = schedule.after(&cursor).next() else {
            log::info!("Job '{}' has no upcoming fire time", job.name);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        // Fires are independent runs; a slow fire does not hold back the next one.
        tokio::spawn(fire(engine.clone(), job.clone()));
        cursor = next.max(Utc::now());
    }
}

/// One fire of a job, as its own top-level run. Failures end here.
pub(crate) async fn fire(engine: Engine, job: Job) {
    let scope = RunScope::default();
    scope.history().add_entry(HistoryEntry::new(
        EntryKind::Job,
        &job.name,
        t!("history.job"),
    ));
    log::debug!("Job '{}' fired", job.name);

    let result = async {
        engine.run_hook(&scope, HookKind::BeforeAll, Vec::new()).await?;
        engine.run_command(&scope, &job.command.name, Vec::new()).await?;
        engine.run_hook(&scope, HookKind::AfterAll, Vec::new()).await?;
        Ok::<_, EngineError>(())
    }
    .await;

    if let Err(err) = result {
        log::error!("Job '{}' failed: {}", job.name, err);
    }
    scope.history().clear();
}

pub(crate) fn check_schedule(job: &Job) -> Result<Schedule, EngineError> {
    parse_schedule(&job.schedule).map_err(|reason| EngineError::InvalidSchedule {
        job: job.name.clone(),
        schedule: job.schedule.clone(),
        reason,
    })
}

/// Parses a 5-field (minute resolution) or 6/7-field (second resolution)
/// cron expression. Weekdays follow the `cron` crate: `1`-`7` from Sunday,
/// or names such as `MON-FRI`.
pub fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => return Err(format!("expected 5 to 7 fields, found {}", n)),
    };
    Schedule::from_str(&normalized).map_err(|e| e.to_string())
}

/// Builds common cron expressions, e.g. `Every(5).minutes()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Every(pub u32);

impl Every {
    pub fn seconds(self) -> String {
        format!("*/{} * * * * *", self.0)
    }

    pub fn minutes(self) -> String {
        format!("0 */{} * * * *", self.0)
    }

    pub fn hours(self) -> String {
        format!("0 0 */{} * * *", self.0)
    }

    pub fn days(self) -> String {
        format!("0 0 0 */{} * *", self.0)
    }

    pub fn months(self) -> String {
        format!("0 0 0 1 */{} *", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::Registry;
    use crate::core::testing::engine_with;
    use crate::models::{Args, Command};
    use chrono::Timelike;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    async fn noop(_args: Args) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    #[test]
    fn test_five_fields_are_normalised_to_seconds() {
        let schedule = parse_schedule("*/15 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.second(), 0);
        assert_eq!(next.minute() % 15, 0);
    }

    #[test]
    fn test_invalid_expressions_are_rejected() {
        assert!(parse_schedule("").is_err());
        assert!(parse_schedule("* *").is_err());
        assert!(parse_schedule("61 * * * * *").is_err());
        assert!(parse_schedule("every day").is_err());
    }

    #[test]
    fn test_every_helpers_parse() {
        for expression in [
            Every(10).seconds(),
            Every(5).minutes(),
            Every(2).hours(),
            Every(3).days(),
            Every(6).months(),
        ] {
            assert!(parse_schedule(&expression).is_ok(), "{}", expression);
        }
        assert_eq!(Every(5).minutes(), "0 */5 * * * *");
    }

    #[tokio::test]
    async fn test_start_and_cancel_jobs() {
        let mut registry = Registry::new();
        registry
            .register_handler("report", noop)
            .register_job(Job::new(Command::new("report", "Nightly report"), "0 0 3 * * *"));
        let (engine, _prompt) = engine_with(registry, &[]);

        let started = engine.start_jobs().unwrap();
        let first = started[0].active_trigger.unwrap();

        // Restarting replaces the trigger instead of adding a second one.
        let restarted = engine.start_job("report").unwrap();
        assert_ne!(restarted.active_trigger, Some(first));

        let cancelled = engine.cancel_jobs();
        assert_eq!(cancelled.len(), 1);
        assert!(cancelled[0].active_trigger.is_none());
        assert_eq!(engine.cancel_jobs(), cancelled);
    }

    #[tokio::test]
    async fn test_invalid_schedule_starts_nothing() {
        let mut registry = Registry::new();
        registry
            .register_handler("ok", noop)
            .register_handler("bad", noop)
            .register_job(Job::new(Command::new("ok", "Fine"), "0 * * * *"))
            .register_job(Job::new(Command::new("bad", "Broken"), "not a schedule"));
        let (engine, _prompt) = engine_with(registry, &[]);

        let err = engine.start_jobs().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule { ref job, .. } if job == "bad"));
        assert!(engine.jobs().iter().all(|j| j.active_trigger.is_none()));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (engine, _prompt) = engine_with(Registry::new(), &[]);
        assert!(matches!(engine.start_job("x"), Err(EngineError::UnknownJob(_))));
    }

    #[test]
    fn test_scheduling_requires_a_runtime() {
        let mut registry = Registry::new();
        registry
            .register_handler("tick", noop)
            .register_job(Job::new(Command::new("tick", "Ticks"), Every(1).seconds()));
        let (engine, _prompt) = engine_with(registry, &[]);
        assert!(matches!(engine.start_jobs(), Err(EngineError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_job_fires_as_its_own_run() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry
            .register_handler("tick", move |args: Args| {
                let tx = tx.clone();
                async move {
                    let history = args.context().map(|ctx| ctx.api.history()).unwrap_or_default();
                    let _ = tx.send(history);
                    Ok(Value::Null)
                }
            })
            .register_context("tick", 0)
            .register_job(Job::new(Command::new("tick", "Ticks"), Every(1).seconds()));
        let (engine, _prompt) = engine_with(registry, &[]);

        engine.start_jobs().unwrap();
        let history = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        engine.cancel_jobs();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EntryKind::Job);
        assert_eq!(history[0].name, "tick");
    }

    #[tokio::test]
    async fn test_failing_job_keeps_its_trigger_and_fires_again() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry
            .register_handler("boom", move |_args: Args| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(());
                    anyhow::bail!("nope")
                }
            })
            .register_job(Job::new(Command::new("boom", "Fails"), Every(1).seconds()));
        let (engine, _prompt) = engine_with(registry, &[]);

        let started = engine.start_jobs().unwrap()[0].active_trigger;
        assert!(started.is_some());

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(engine.jobs()[0].active_trigger, started);
        }
        engine.cancel_jobs();
    }

    #[tokio::test]
    async fn test_fire_runs_between_the_all_hooks() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let record = |step: &'static str| {
            let steps = steps.clone();
            move |_args: Args| {
                let steps = steps.clone();
                async move {
                    steps.lock().unwrap().push(step);
                    Ok(Value::Null)
                }
            }
        };

        let mut registry = Registry::new();
        registry
            .register_handler("setup", record("before"))
            .register_handler("tick", record("tick"))
            .register_handler("teardown", move |args: Args| {
                let tx = tx.clone();
                async move {
                    let history = args.context().map(|ctx| ctx.api.history()).unwrap_or_default();
                    let _ = tx.send(history);
                    Ok(Value::Null)
                }
            })
            .register_context("teardown", 0)
            .register_hook(HookKind::BeforeAll, Command::new("setup", "BEFORE_ALL"))
            .register_hook(HookKind::AfterAll, Command::new("teardown", "AFTER_ALL"))
            .register_job(Job::new(Command::new("tick", "Ticks"), Every(1).seconds()));
        let (engine, _prompt) = engine_with(registry, &[]);
        let job = engine.registry().job("tick").cloned().unwrap();

        fire(engine, job).await;

        assert_eq!(*steps.lock().unwrap(), vec!["before", "tick"]);
        let history = rx.recv().await.unwrap();
        let kinds: Vec<_> = history.iter().map(|e| (e.kind, e.name.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (EntryKind::Job, "tick"),
                (EntryKind::Hook, "setup"),
                (EntryKind::Hook, "teardown"),
            ]
        );
    }
}
