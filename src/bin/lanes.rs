// src/bin/lanes.rs

use anyhow::{Context, Result, bail};
use colored::*;
use lanes::{
    AppConfig, Args, Engine, Every, Registry,
    cli::parse_invocation,
    constants::CONFIG_FILENAME,
    core::validators::{IsBoolean, IsNumber, IsString},
    models::{Action, Command, HookKind, Job, Parameter, Webhook},
    system::terminal::TerminalPrompt,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

// --- Handlers ---

async fn greet(args: Args) -> Result<Value> {
    let name = args.str(0).unwrap_or("stranger");
    let greeting = match args.str(1) {
        Some(title) => format!("Hello, {} {}!", title, name),
        None => format!("Hello, {}!", name),
    };
    println!("{}", greeting.green());
    if let Some(ctx) = args.context() {
        ctx.api.add_action("greet", &greeting);
    }
    Ok(json!(greeting))
}

async fn deploy(args: Args) -> Result<Value> {
    let env = args.str(0).unwrap_or_default().to_string();
    let replicas = args.value(1).and_then(Value::as_u64).unwrap_or(1);
    let dry_run = args.value(2).and_then(Value::as_bool).unwrap_or(false);

    if env == "nowhere" {
        bail!("There is no environment called '{}'", env);
    }

    let ctx = args.context().context("deploy needs its execution context")?;
    println!(
        "{} {} replica(s) to {} from {}{}",
        "Deploying".cyan().bold(),
        replicas,
        env.bold(),
        ctx.working_directory.display(),
        if dry_run { " (dry run)".dimmed().to_string() } else { String::new() }
    );
    ctx.api
        .add_action("rollout", &format!("rolled out {} replica(s)", replicas));
    if !dry_run {
        ctx.api.run_action("notify", Vec::new()).await?;
    }
    Ok(json!({ "env": env, "replicas": replicas, "dry_run": dry_run }))
}

async fn release(args: Args) -> Result<Value> {
    let env = args
        .body()
        .and_then(|b| b.get("env"))
        .and_then(Value::as_str)
        .unwrap_or("staging")
        .to_string();
    println!("{} release requested for {}", "Webhook:".magenta().bold(), env.bold());
    if let Some(ctx) = args.context() {
        ctx.api.run_action("notify", Vec::new()).await?;
    }
    Ok(json!(env))
}

async fn notify(_args: Args) -> Result<Value> {
    println!("{}", "  -> team notified".dimmed());
    Ok(Value::Null)
}

async fn heartbeat(_args: Args) -> Result<Value> {
    log::info!("heartbeat at {}", chrono::Local::now().format("%H:%M:%S"));
    Ok(Value::Null)
}

async fn serve(args: Args) -> Result<Value> {
    let ctx = args.context().context("serve needs its execution context")?;
    let port = args
        .value(0)
        .and_then(Value::as_u64)
        .map(u16::try_from)
        .transpose()
        .context("Port out of range")?;

    let jobs = ctx.api.start_jobs()?;
    let addr = ctx.api.start_webhooks(port).await?;
    println!(
        "{} {} job(s) scheduled, webhooks on {}. Press Ctrl+C to stop.",
        "Serving:".green().bold(),
        jobs.len(),
        addr
    );

    tokio::signal::ctrl_c().await.context("Could not listen for Ctrl+C")?;
    ctx.api.cancel_jobs();
    ctx.api.stop_webhooks().await;
    println!("{}", "Stopped.".yellow());
    Ok(Value::Null)
}

async fn banner(args: Args) -> Result<Value> {
    if let Some(ctx) = args.context() {
        log::debug!("Running from {}", ctx.directory.display());
    }
    println!("{}", "lanes demo".bold());
    Ok(Value::Null)
}

async fn summary(args: Args) -> Result<Value> {
    if let Some(ctx) = args.context() {
        ctx.api.print_history();
    }
    Ok(Value::Null)
}

async fn report_error(args: Args) -> Result<Value> {
    if let Some(failure) = args.error() {
        eprintln!(
            "{} '{}' did not finish: {}",
            "Failure:".red().bold(),
            failure.command,
            failure.message
        );
    }
    Ok(Value::Null)
}

// --- Wiring ---

fn build_registry() -> Registry {
    let mut registry = Registry::new();

    registry
        .register_command(Command::new("greet", "Greets someone").with_alias("hi"), greet)
        .register_param(
            "greet",
            Parameter::new("name", 0, "What is your name?").validator(IsString),
        )
        .register_param("greet", Parameter::new("title", 1, "A title to use?").optional())
        .register_context("greet", 2);

    registry
        .register_command(Command::new("deploy", "Deploys to an environment"), deploy)
        .register_param(
            "deploy",
            Parameter::new("env", 0, "Which environment?").validator(IsString),
        )
        .register_param(
            "deploy",
            Parameter::new("replicas", 1, "How many replicas?").validator(IsNumber),
        )
        .register_param(
            "deploy",
            Parameter::new("dry_run", 2, "Dry run only?")
                .optional()
                .validator(IsBoolean),
        )
        .register_context("deploy", 3);

    registry
        .register_command(Command::new("serve", "Runs jobs and webhooks until Ctrl+C"), serve)
        .register_param(
            "serve",
            Parameter::new("port", 0, "Webhook port?")
                .optional()
                .validator(IsNumber),
        )
        .register_context("serve", 1);

    registry
        .register_handler("release", release)
        .register_body("release", 0)
        .register_context("release", 1)
        .register_webhook(Webhook::new(
            "/release",
            Command::new("release", "Releases on request"),
        ));

    registry
        .register_handler("heartbeat", heartbeat)
        .register_job(Job::new(
            Command::new("heartbeat", "Logs a heartbeat"),
            Every(30).seconds(),
        ));

    registry.register_action(
        Action {
            name: "notify".into(),
            plugin: "console".into(),
            description: "Notifies the team".into(),
        },
        notify,
    );

    registry
        .register_handler("banner", banner)
        .register_context("banner", 0)
        .register_hook(HookKind::BeforeAll, Command::new("banner", "Prints a banner"))
        .register_handler("summary", summary)
        .register_context("summary", 0)
        .register_hook(HookKind::AfterAll, Command::new("summary", "Prints the timeline"))
        .register_handler("report_error", report_error)
        .register_error("report_error", 0)
        .register_hook(HookKind::Error, Command::new("report_error", "Reports failures"));

    registry
}

fn load_config() -> Result<AppConfig> {
    let path = Path::new(CONFIG_FILENAME);
    if path.exists() {
        return AppConfig::load(path).with_context(|| format!("Failed to load {}", CONFIG_FILENAME));
    }
    let mut config = AppConfig::new("lanes", "A demo task runner built on the lanes engine.");
    config.version = Some(env!("CARGO_PKG_VERSION").to_string());
    Ok(config)
}

async fn run() -> Result<()> {
    let config = load_config()?;
    let registry = build_registry();
    let invocation = match parse_invocation(&registry, &config, std::env::args_os()) {
        Ok(invocation) => invocation,
        // Help, version and usage errors are printed by clap itself.
        Err(e) => e.exit(),
    };
    log::debug!("Invocation: {:?}", invocation);

    let engine = Engine::new(registry, config, Arc::new(TerminalPrompt))?;
    engine.run(invocation).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
