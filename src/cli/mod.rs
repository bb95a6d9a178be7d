// src/cli/mod.rs

//! The flag source: turns command-line arguments into an [`Invocation`].
//!
//! Every registered command becomes a subcommand and every parameter a
//! `--name <VAR>` option. Options are never required at parse time; a missing
//! value is resolved later by the engine, interactively if needed.

use crate::{
    core::{config::AppConfig, registry::Registry},
    models::{Invocation, SuppliedArgs},
};
use clap::builder::styling::{AnsiColor, Styles};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches};
use std::ffi::OsString;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Yellow.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Green.on_default())
}

/// Builds the `clap` command tree for everything in `registry`.
pub fn build_command(registry: &Registry, config: &AppConfig) -> clap::Command {
    let mut app = clap::Command::new(config.name.clone())
        .about(config.description.clone())
        .styles(styles())
        .disable_help_subcommand(true);
    if let Some(version) = &config.version {
        app = app.version(version.clone());
    }

    for command in registry.commands() {
        let mut sub = clap::Command::new(command.name.clone()).about(command.description().to_string());
        if let Some(alias) = &command.options.alias {
            sub = sub.visible_alias(alias.clone());
        }

        for param in registry.params_for(&command.name) {
            let arg = Arg::new(param.name.clone())
                .long(param.name.clone())
                .help(param.options.description.clone())
                .value_name("VAR")
                .action(ArgAction::Set);
            // `--flag` alone on an optional parameter reads as "true".
            let arg = if param.options.optional {
                arg.num_args(0..=1).default_missing_value("true")
            } else {
                arg.num_args(1)
            };
            sub = sub.arg(arg);
        }
        app = app.subcommand(sub);
    }
    app
}

/// Parses `args` (binary name first) into an invocation.
///
/// With `allow_unknown_options` set, unknown flags are skipped. Every other
/// parse error, such as an unknown command, is still returned.
pub fn parse_invocation<I, T>(
    registry: &Registry,
    config: &AppConfig,
    args: I,
) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let app = build_command(registry, config);

    let matches = match app.clone().try_get_matches_from(args.clone()) {
        Ok(matches) => matches,
        Err(e) if config.allow_unknown_options && e.kind() == ErrorKind::UnknownArgument => {
            log::debug!("Skipping unknown options in {:?}", args);
            app.ignore_errors(true).try_get_matches_from(args)?
        }
        Err(e) => return Err(e),
    };
    Ok(invocation_from_matches(registry, &matches))
}

fn invocation_from_matches(registry: &Registry, matches: &ArgMatches) -> Invocation {
    let Some((name, sub)) = matches.subcommand() else {
        return Invocation::default();
    };

    let mut supplied = SuppliedArgs::new();
    for param in registry.params_for(name) {
        if let Ok(Some(value)) = sub.try_get_one::<String>(&param.name) {
            supplied.insert(name, &param.name, value.clone());
        }
    }
    log::debug!("Invocation of '{}' with {:?}", name, supplied);
    Invocation::new([name]).with_supplied(supplied)
}
