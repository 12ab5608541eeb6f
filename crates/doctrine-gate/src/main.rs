//! Command-line front end for the doctrine enforcement gate

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use doctrine_envelope::{
    ConstructOptions, Envelope, SignatureGenerator, DEFAULT_AGENT_ID, DEFAULT_SCHEMA_VERSION,
};
use doctrine_format::{from_any_format, Target};
use doctrine_gate::{DoctrineRuntime, GateConfig, ProcessTerminator};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("doctrine-gate")
        .version(doctrine_gate::VERSION)
        .about("Envelope doctrine enforcement gate")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("check")
                .about("Validate a payload and print the sink record")
                .arg(
                    Arg::new("input")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON payload file (stdin if omitted or '-')"),
                )
                .arg(
                    Arg::new("target")
                        .long("target")
                        .short('t')
                        .required(true)
                        .value_parser(value_parser!(Target))
                        .help("Sink target: doc_store, relational or warehouse"),
                )
                .arg(
                    Arg::new("tool")
                        .long("tool")
                        .default_value("cli")
                        .help("Calling tool name"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("permissive")
                        .long("permissive")
                        .action(ArgAction::SetTrue)
                        .help("Repair invalid payloads instead of rejecting them"),
                )
                .arg(
                    Arg::new("disabled")
                        .long("disabled")
                        .action(ArgAction::SetTrue)
                        .help("Pass payloads through unchecked"),
                )
                .arg(
                    Arg::new("nuclear")
                        .long("nuclear")
                        .action(ArgAction::SetTrue)
                        .conflicts_with_all(["permissive", "disabled"])
                        .help("Zero tolerance: a violation shuts the process down"),
                ),
        )
        .subcommand(
            Command::new("normalize")
                .about("Convert a record in any sink dialect back into an envelope")
                .arg(
                    Arg::new("input")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON record file (stdin if omitted or '-')"),
                ),
        )
        .subcommand(
            Command::new("construct")
                .about("Build a fresh envelope")
                .arg(Arg::new("source").long("source").required(true).help("Source id"))
                .arg(Arg::new("process").long("process").required(true).help("Process id"))
                .arg(Arg::new("agent").long("agent").help("Agent id"))
                .arg(Arg::new("blueprint").long("blueprint").help("Blueprint id"))
                .arg(
                    Arg::new("schema-version")
                        .long("schema-version")
                        .help("Schema version"),
                )
                .arg(
                    Arg::new("data")
                        .long("data")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON object file for data_payload"),
                ),
        )
        .subcommand(
            Command::new("sign")
                .about("Print a fresh execution signature")
                .arg(
                    Arg::new("agent")
                        .long("agent")
                        .default_value(DEFAULT_AGENT_ID)
                        .help("Agent id"),
                )
                .arg(
                    Arg::new("blueprint")
                        .long("blueprint")
                        .required(true)
                        .help("Blueprint id"),
                )
                .arg(
                    Arg::new("schema-version")
                        .long("schema-version")
                        .default_value(DEFAULT_SCHEMA_VERSION)
                        .help("Schema version"),
                ),
        )
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli().get_matches();
    match run(&matches) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(matches: &ArgMatches) -> Result<ExitCode> {
    match matches.subcommand() {
        Some(("check", args)) => check(args),
        Some(("normalize", args)) => {
            let raw = read_json(args.get_one::<PathBuf>("input"))?;
            match from_any_format(&raw) {
                Ok(envelope) => {
                    print_json(&envelope.to_value())?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("invalid record: {err}");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Some(("construct", args)) => {
            let data = match args.get_one::<PathBuf>("data") {
                Some(path) => match read_json(Some(path))? {
                    Value::Object(map) => map,
                    _ => bail!("{} must contain a JSON object", path.display()),
                },
                None => Map::new(),
            };
            let mut options = ConstructOptions::new();
            if let Some(agent) = args.get_one::<String>("agent") {
                options = options.with_agent_id(agent);
            }
            if let Some(blueprint) = args.get_one::<String>("blueprint") {
                options = options.with_blueprint_id(blueprint);
            }
            if let Some(version) = args.get_one::<String>("schema-version") {
                options = options.with_schema_version(version);
            }
            let source = args.get_one::<String>("source").context("--source is required")?;
            let process = args.get_one::<String>("process").context("--process is required")?;
            let envelope = Envelope::construct(source.as_str(), process.as_str(), data, options);
            print_json(&envelope.to_value())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(("sign", args)) => {
            let agent = arg_str(args, "agent")?;
            let blueprint = arg_str(args, "blueprint")?;
            let version = arg_str(args, "schema-version")?;
            println!("{}", SignatureGenerator::sign(agent, blueprint, version));
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn check(args: &ArgMatches) -> Result<ExitCode> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => GateConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GateConfig::default(),
    };
    if args.get_flag("permissive") {
        config.strict = false;
    }
    if args.get_flag("disabled") {
        config.enabled = false;
    }

    let target = *args.get_one::<Target>("target").context("--target is required")?;
    let tool = arg_str(args, "tool")?;
    let raw = read_json(args.get_one::<PathBuf>("input"))?;

    let runtime = DoctrineRuntime::install(config, Arc::new(ProcessTerminator))?;
    let outcome = if args.get_flag("nuclear") {
        runtime.nuclear().arm()?;
        runtime
            .nuclear()
            .nuclear_database_operation(target, &raw, tool)
            .map_err(|err| err.to_string())
    } else {
        runtime
            .gate()
            .database_operation(target, &raw, tool)
            .map_err(|err| err.to_string())
    };

    let code = match outcome {
        Ok(record) => {
            print_json(&record.to_value()?)?;
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("rejected: {message}");
            ExitCode::from(1)
        }
    };
    runtime.shutdown();
    Ok(code)
}

fn arg_str<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("--{name} is required"))
}

fn read_json(path: Option<&PathBuf>) -> Result<Value> {
    let text = match path.filter(|p| p.as_path() != Path::new("-")) {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("input is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn parses_check_arguments() {
        let matches = cli()
            .try_get_matches_from(["doctrine-gate", "check", "--target", "stamped", "payload.json"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "check");
        assert_eq!(args.get_one::<Target>("target"), Some(&Target::Relational));
        assert_eq!(args.get_one::<String>("tool").map(String::as_str), Some("cli"));
    }

    #[test]
    fn nuclear_conflicts_with_permissive() {
        let args = [
            "doctrine-gate",
            "check",
            "-t",
            "warehouse",
            "--nuclear",
            "--permissive",
        ];
        assert!(cli().try_get_matches_from(args).is_err());
    }
}
