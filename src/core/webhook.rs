// src/core/webhook.rs

use crate::{
    core::engine::{Engine, EngineError, RunScope},
    models::{Argument, EntryKind, HistoryEntry, Webhook},
};
use axum::Router;
use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Server {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the HTTP server that turns POST requests into command runs.
#[derive(Debug, Default)]
pub(crate) struct WebhookDispatcher {
    server: Mutex<Option<Server>>,
}

impl WebhookDispatcher {
    fn lock(&self) -> MutexGuard<'_, Option<Server>> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn start(
        &self,
        engine: &Engine,
        host: &str,
        port: u16,
    ) -> Result<SocketAddr, EngineError> {
        if let Some(server) = self.lock().as_ref() {
            return Err(EngineError::WebhooksRunning(server.addr));
        }

        let router = build_router(engine.registry().webhooks())?.layer(Extension(engine.clone()));
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| EngineError::WebhookBind {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| EngineError::WebhookBind {
                addr: format!("{}:{}", host, port),
                source,
            })?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let graceful = async {
                let _ = signal.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                log::error!("Webhook server error: {}", e);
            }
        });

        let mut slot = self.lock();
        if let Some(server) = slot.as_ref() {
            // Lost a race with a concurrent start; keep the first server.
            let running = server.addr;
            let _ = shutdown.send(());
            return Err(EngineError::WebhooksRunning(running));
        }
        *slot = Some(Server {
            addr,
            shutdown,
            task,
        });
        log::info!("Listening for webhooks on {}", addr);
        Ok(addr)
    }

    /// Shuts the server down and waits for it to finish. Returns `false` when
    /// nothing was running.
    pub(crate) async fn stop(&self) -> bool {
        let Some(server) = self.lock().take() else {
            return false;
        };
        let _ = server.shutdown.send(());
        if let Err(e) = server.task.await {
            log::warn!("Webhook server task ended abnormally: {}", e);
        }
        log::info!("Webhooks on {} stopped", server.addr);
        true
    }

    pub(crate) fn addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|s| s.addr)
    }
}

fn build_router(webhooks: &[Webhook]) -> Result<Router, EngineError> {
    let mut seen = HashSet::new();
    let mut router = Router::new();

    for webhook in webhooks {
        check_path(&webhook.path)?;
        if !seen.insert(webhook.path.as_str()) {
            return Err(EngineError::DuplicateWebhookPath(webhook.path.clone()));
        }

        let bound = webhook.clone();
        router = router.route(
            &webhook.path,
            post(move |Extension(engine): Extension<Engine>, body: Bytes| {
                accept(engine, bound.clone(), body)
            }),
        );
        log::debug!("Webhook POST {} -> '{}'", webhook.path, webhook.command.name);
    }
    Ok(router)
}

/// Paths are matched literally, so route captures and wildcards are refused.
fn check_path(path: &str) -> Result<(), EngineError> {
    let literal = path.starts_with('/')
        && !path.contains(['{', '}'])
        && path
            .split('/')
            .all(|segment| !segment.starts_with(':') && !segment.starts_with('*'));
    if literal {
        Ok(())
    } else {
        Err(EngineError::InvalidWebhookPath(path.to_string()))
    }
}

/// Acknowledges the request at once and runs the command in the background.
async fn accept(engine: Engine, webhook: Webhook, body: Bytes) -> StatusCode {
    let payload = parse_body(&webhook.path, &body);
    tokio::spawn(dispatch(engine, webhook, payload));
    StatusCode::OK
}

fn parse_body(path: &str, body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        log::warn!("Webhook {} received a body that is not JSON: {}", path, e);
        Value::Null
    })
}

/// One webhook request, as its own top-level run. Failures end here.
async fn dispatch(engine: Engine, webhook: Webhook, body: Value) {
    let scope = RunScope::default();
    scope.history().add_entry(HistoryEntry::new(
        EntryKind::Webhook,
        &webhook.command.name,
        t!("history.webhook"),
    ));

    if let Err(err) = engine
        .run_command(&scope, &webhook.command.name, vec![Argument::Body(body)])
        .await
    {
        log::error!("Webhook {} failed: {}", webhook.path, err);
    }
    scope.history().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::registry::Registry;
    use crate::core::testing::{ScriptedPrompt, engine_with};
    use crate::models::{Args, Command, HistoryEntry};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};

    fn local_engine(registry: Registry) -> Engine {
        let mut config = AppConfig::new("test", "webhook tests");
        config.webhook_host = "127.0.0.1".into();
        Engine::new(registry, config, Arc::new(ScriptedPrompt::new(&[]))).unwrap()
    }

    type Seen = (Option<Value>, Vec<HistoryEntry>);

    fn deploy_registry(tx: mpsc::UnboundedSender<Seen>, release: Arc<Notify>) -> Registry {
        let mut registry = Registry::new();
        registry
            .register_handler("deploy", move |args: Args| {
                let tx = tx.clone();
                let release = release.clone();
                async move {
                    release.notified().await;
                    let history = args.context().map(|c| c.api.history()).unwrap_or_default();
                    let _ = tx.send((args.body().cloned(), history));
                    Ok(Value::Null)
                }
            })
            .register_body("deploy", 0)
            .register_context("deploy", 1)
            .register_webhook(Webhook::new("/deploy", Command::new("deploy", "Deploys")));
        registry
    }

    #[test]
    fn test_path_checks() {
        assert!(check_path("/deploy").is_ok());
        assert!(check_path("/hooks/deploy").is_ok());
        assert!(check_path("deploy").is_err());
        assert!(check_path("/deploy/{id}").is_err());
        assert!(check_path("/deploy/:id").is_err());
        assert!(check_path("/*rest").is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("/x", b""), Value::Null);
        assert_eq!(parse_body("/x", b"  \n"), Value::Null);
        assert_eq!(parse_body("/x", br#"{"env":"prod"}"#), json!({"env": "prod"}));
        assert_eq!(parse_body("/x", b"not json"), Value::Null);
    }

    #[test]
    fn test_duplicate_paths_are_rejected() {
        let deploy = Command::new("deploy", "Deploys");
        let hooks = vec![
            Webhook::new("/deploy", deploy.clone()),
            Webhook::new("/deploy", deploy),
        ];
        assert!(matches!(
            build_router(&hooks),
            Err(EngineError::DuplicateWebhookPath(path)) if path == "/deploy"
        ));
    }

    #[tokio::test]
    async fn test_post_is_acknowledged_before_the_command_runs() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let engine = local_engine(deploy_registry(tx, release.clone()));
        let addr = engine.start_webhooks(0).await.unwrap();
        assert_eq!(engine.webhook_addr(), Some(addr));

        let response = reqwest::Client::new()
            .post(format!("http://{}/deploy", addr))
            .json(&json!({"env": "prod"}))
            .send()
            .await
            .unwrap();
        // The handler is still parked on `release` here.
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        release.notify_one();
        let (body, history) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, Some(json!({"env": "prod"})));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EntryKind::Webhook);
        assert_eq!(history[0].name, "deploy");

        assert!(engine.stop_webhooks().await);
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = local_engine(deploy_registry(tx, Arc::new(Notify::new())));
        let addr = engine.start_webhooks(0).await.unwrap();
        let client = reqwest::Client::new();

        let missing = client.post(format!("http://{}/nope", addr)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let get = client.get(format!("http://{}/deploy", addr)).send().await.unwrap();
        assert_eq!(get.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        engine.stop_webhooks().await;
    }

    #[tokio::test]
    async fn test_failing_command_still_answers_ok() {
        let mut registry = Registry::new();
        registry
            .register_handler("explode", |_args: Args| async move { anyhow::bail!("boom") })
            .register_webhook(Webhook::new("/explode", Command::new("explode", "Fails")));
        let engine = local_engine(registry);
        let addr = engine.start_webhooks(0).await.unwrap();
        let client = reqwest::Client::new();

        for _ in 0..2 {
            let response = client
                .post(format!("http://{}/explode", addr))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
        }
        engine.stop_webhooks().await;
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (engine, _prompt) = engine_with(Registry::new(), &[]);
        assert!(!engine.stop_webhooks().await);

        let engine = local_engine(Registry::new());
        let addr = engine.start_webhooks(0).await.unwrap();
        assert!(matches!(
            engine.start_webhooks(0).await,
            Err(EngineError::WebhooksRunning(running)) if running == addr
        ));

        assert!(engine.stop_webhooks().await);
        assert!(engine.webhook_addr().is_none());
        assert!(!engine.stop_webhooks().await);

        // Restarting after a stop is allowed.
        let again = engine.start_webhooks(0).await.unwrap();
        assert!(engine.stop_webhooks().await);
        assert_ne!(again.port(), 0);
    }
}
