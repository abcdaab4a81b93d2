//! `quill` operator binary
//!
//! - `quill validate --phase <tag> <file>` checks a saved model reply
//! - `quill health --snapshot <file>` computes pipeline health from a store
//!   snapshot and optionally publishes its alerts
//! - `quill config` prints the effective configuration

mod commands;
mod config;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use config::QuillConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cli() -> Command {
    Command::new("quill")
        .version(quill_core::VERSION)
        .about("Narrative pipeline operator tools")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (defaults apply when absent)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a model reply for a phase")
                .arg(
                    Arg::new("phase")
                        .long("phase")
                        .required(true)
                        .help(
                            "Phase tag: vision, world-bible, iterative, blueprint, scroll, scene",
                        ),
                )
                .arg(
                    Arg::new("term")
                        .long("term")
                        .action(ArgAction::Append)
                        .help("Salient term the scene reply must mention (repeatable)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the validation result as JSON"),
                )
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("File holding the raw reply"),
                ),
        )
        .subcommand(
            Command::new("health")
                .about("Compute pipeline health from a store snapshot")
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON store snapshot"),
                )
                .arg(
                    Arg::new("at")
                        .long("at")
                        .help("Evaluate as of this RFC 3339 instant instead of now"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                )
                .arg(
                    Arg::new("publish")
                        .long("publish")
                        .action(ArgAction::SetTrue)
                        .help("Publish the report's alerts to the configured endpoint"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as TOML"))
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(matches: ArgMatches) -> anyhow::Result<i32> {
    let config = QuillConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("validate", args)) => {
            let phase = args
                .get_one::<String>("phase")
                .context("--phase is required")?;
            let file = args.get_one::<PathBuf>("file").context("reply file is required")?;
            let terms: Vec<String> = args
                .get_many::<String>("term")
                .map(|t| t.cloned().collect())
                .unwrap_or_default();

            let result = commands::validate(phase, file, &terms)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", commands::render_validation(&result));
            }
            Ok(if result.is_passed() {
                commands::exit::OK
            } else {
                commands::exit::REJECTED
            })
        }
        Some(("health", args)) => {
            let snapshot = args
                .get_one::<PathBuf>("snapshot")
                .context("--snapshot is required")?;
            let at = args
                .get_one::<String>("at")
                .map(|s| DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)))
                .transpose()
                .context("--at must be an RFC 3339 timestamp")?;

            let report = commands::health(snapshot, &config, at).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", commands::render_report(&report));
            }

            if args.get_flag("publish") {
                let summary = commands::publish(&report, &config).await?;
                tracing::info!(
                    published = summary.published.len(),
                    suppressed = summary.suppressed.len(),
                    failed = summary.failures.len(),
                    "alert publication finished"
                );
            }
            Ok(commands::health_exit_code(report.status))
        }
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(commands::exit::OK)
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand '{other}'"),
        None => anyhow::bail!("a subcommand is required"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let code = run(matches).await?;
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let matches = cli()
            .try_get_matches_from([
                "quill",
                "validate",
                "--phase",
                "scene",
                "--term",
                "Hollow Market",
                "--term",
                "Ashfall",
                "reply.txt",
                "--log-json",
            ])
            .unwrap();
        assert!(matches.get_flag("log-json"));
        let (_, args) = matches.subcommand().unwrap();
        let terms: Vec<&String> = args.get_many::<String>("term").unwrap().collect();
        assert_eq!(terms.len(), 2);
    }
}
