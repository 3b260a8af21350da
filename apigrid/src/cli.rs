use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use serde_json::Value;

use crate::config::{load_config_file, ApiConfig, ConfigReport};
use crate::conflicts::{validate_param_conflicts, ConflictSources, SourceLabels};
use crate::error::Error;
use crate::params::{detect_format, parse_any, special_char_warnings, to_json, to_object, to_query_string, Parameter};
use crate::response_mapping::validate_mapping;
use crate::session::{ConfigSession, ConnectionTestReport, HttpSettings};
use crate::store::{ConfigStore, DEFAULT_STORE_FILE};
use crate::url_vars::{replace_url_params, suggest_url_params, validate_url_params};

pub const EXIT_OK: i32 = 0;
pub const EXIT_PROBLEMS: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .help("Configuration file (YAML or JSON); defaults to the saved configuration")
        .num_args(1)
}

fn page_arg() -> Arg {
    Arg::new("page")
        .long("page")
        .help("Page to request (defaults to the first page)")
        .num_args(1)
        .value_parser(clap::value_parser!(u32))
}

fn param_arg() -> Arg {
    Arg::new("param")
        .long("param")
        .short('p')
        .help("URL variable value 'key=value' (repeatable)")
        .num_args(1)
        .action(ArgAction::Append)
}

fn input_arg() -> Arg {
    Arg::new("input")
        .help("Parameter text (query string or JSON array); '-' reads stdin")
        .required(true)
        .num_args(1)
}

pub fn build_cli() -> Command {
    let params_cmd = Command::new("params")
        .about("Parse and convert parameter lists")
        .subcommand_required(true)
        .subcommand(
            Command::new("convert")
                .about("Convert parameters to another format")
                .arg(input_arg())
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Output format")
                        .num_args(1)
                        .value_parser(["json", "query", "object"])
                        .default_value("json"),
                )
                .arg(
                    Arg::new("compact")
                        .long("compact")
                        .help("Single-line JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("detect")
                .about("Detect the format of parameter text")
                .arg(input_arg()),
        );

    let url_cmd = Command::new("url")
        .about("Endpoint path variables")
        .subcommand_required(true)
        .subcommand(
            Command::new("resolve")
                .about("Substitute :variables in an endpoint template")
                .arg(Arg::new("template").required(true).num_args(1))
                .arg(param_arg()),
        )
        .subcommand(
            Command::new("suggest")
                .about("List the variables that still need a value")
                .arg(Arg::new("template").required(true).num_args(1))
                .arg(param_arg()),
        );

    let mapping_cmd = Command::new("mapping")
        .about("Response mapping")
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Check item and total paths against a saved response")
                .arg(
                    Arg::new("response")
                        .long("response")
                        .short('r')
                        .help("JSON response file ('-' reads stdin)")
                        .required(true)
                        .num_args(1),
                )
                .arg(
                    Arg::new("items")
                        .long("items")
                        .help("Dot path to the items array")
                        .required(true)
                        .num_args(1),
                )
                .arg(
                    Arg::new("total")
                        .long("total")
                        .help("Dot path to the total count")
                        .num_args(1),
                ),
        );

    let conflicts_cmd = Command::new("conflicts")
        .about("Check parameter sources for duplicate keys")
        .arg(Arg::new("test").long("test").help("Test parameters").num_args(1))
        .arg(Arg::new("default").long("default").help("Default query parameters").num_args(1))
        .arg(Arg::new("pagination").long("pagination").help("Pagination parameters").num_args(1));

    let config_cmd = Command::new("config")
        .about("Show, validate and persist the configuration")
        .subcommand_required(true)
        .subcommand(Command::new("show").about("Print the configuration").arg(config_arg()))
        .subcommand(Command::new("validate").about("Validate the configuration").arg(config_arg()))
        .subcommand(
            Command::new("save")
                .about("Validate a configuration file and save it to the store")
                .arg(Arg::new("file").required(true).num_args(1)),
        )
        .subcommand(Command::new("clear").about("Remove the saved configuration"));

    Command::new("apigrid")
        .about("Configure, test and preview REST endpoints for a data grid")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-output")
                .long("json-output")
                .short('j')
                .help("Output in JSON format")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Verbose output")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("store-file")
                .long("store-file")
                .help("Local store file holding the saved configuration")
                .global(true)
                .num_args(1)
                .default_value(DEFAULT_STORE_FILE),
        )
        .arg(
            Arg::new("conn-timeout")
                .long("conn-timeout")
                .help("Connection timeout in seconds")
                .global(true)
                .default_value("30")
                .num_args(1),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .short('t')
                .help("Request timeout in seconds (after connection)")
                .global(true)
                .default_value("300")
                .num_args(1),
        )
        .arg(
            Arg::new("strict-conflicts")
                .long("strict-conflicts")
                .help("Do not send requests while parameter conflicts exist")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(params_cmd)
        .subcommand(url_cmd)
        .subcommand(mapping_cmd)
        .subcommand(conflicts_cmd)
        .subcommand(config_cmd)
        .subcommand(
            Command::new("test")
                .about("Send one request and check the response mapping")
                .arg(config_arg())
                .arg(page_arg()),
        )
        .subcommand(
            Command::new("preview")
                .about("Fetch a page and render it as a table")
                .arg(config_arg())
                .arg(page_arg()),
        )
}

fn parse_timeout(matches: &ArgMatches, arg_name: &str) -> Option<f64> {
    matches
        .get_one::<String>(arg_name)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Template variables with no usable value yet: missing, empty or disabled.
fn pending_url_params(template: &str, params: &[Parameter]) -> Vec<Parameter> {
    suggest_url_params(template, params)
        .into_iter()
        .filter(|p| p.active_key().is_none() || p.value.is_empty())
        .collect()
}

/// Split `key=value`; the value may be empty or contain further `=`.
pub fn parse_kv(s: &str) -> anyhow::Result<Parameter> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", s))?;
    if k.trim().is_empty() {
        anyhow::bail!("Empty key in '{}'", s);
    }
    Ok(Parameter::new(k.trim(), v))
}

fn collect_params(matches: &ArgMatches) -> anyhow::Result<Vec<Parameter>> {
    matches
        .get_many::<String>("param")
        .map(|vals| vals.map(|s| parse_kv(s)).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn read_input(arg: &str) -> anyhow::Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        Ok(arg.to_string())
    }
}

fn read_file_or_stdin(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        read_input(path)
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_messages(errors: &[String], warnings: &[String]) {
    for e in errors {
        println!("error: {}", e);
    }
    for w in warnings {
        println!("warning: {}", w);
    }
}

fn load_session(
    matches: &ArgMatches,
    store: &ConfigStore,
    http: HttpSettings,
) -> anyhow::Result<ConfigSession> {
    match matches.get_one::<String>("config") {
        Some(path) => {
            let cfg = load_config_file(Path::new(path))
                .with_context(|| format!("Failed to load configuration: {}", path))?;
            Ok(ConfigSession::new(cfg, http))
        }
        None => Ok(ConfigSession::load(store, http)),
    }
}

pub fn drive_command(matches: &ArgMatches, user_agent: &str) -> anyhow::Result<i32> {
    let json_output = matches.get_flag("json-output");
    let store_path = matches
        .get_one::<String>("store-file")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE));
    let store = ConfigStore::new(store_path);
    let http = HttpSettings {
        connect_timeout_secs: parse_timeout(matches, "conn-timeout"),
        request_timeout_secs: parse_timeout(matches, "timeout"),
        user_agent: user_agent.to_string(),
        strict_conflicts: matches.get_flag("strict-conflicts"),
    };

    match matches.subcommand() {
        Some(("params", sub)) => run_params(sub, json_output),
        Some(("url", sub)) => run_url(sub, json_output),
        Some(("mapping", sub)) => run_mapping(sub, json_output),
        Some(("conflicts", sub)) => run_conflicts(sub, json_output),
        Some(("config", sub)) => run_config(sub, &store, http, json_output),
        Some(("test", sub)) => {
            let session = load_session(sub, &store, http)?;
            let page = sub
                .get_one::<u32>("page")
                .copied()
                .unwrap_or(session.config().pagination.first_page);
            let report = session.test_connection(page);
            if json_output {
                print_json(&report)?;
            } else {
                print_test_report(&report);
            }
            Ok(if report.is_success() { EXIT_OK } else { EXIT_PROBLEMS })
        }
        Some(("preview", sub)) => {
            let session = load_session(sub, &store, http)?;
            let page = sub
                .get_one::<u32>("page")
                .copied()
                .unwrap_or(session.config().pagination.first_page);
            let preview = session.preview(page);
            if json_output {
                print_json(&preview)?;
            } else if preview.report.is_success() {
                print!("{}", preview.table);
                println!("{}", preview.summary);
            } else {
                print_test_report(&preview.report);
            }
            Ok(if preview.report.is_success() { EXIT_OK } else { EXIT_PROBLEMS })
        }
        _ => {
            let _ = build_cli().print_help();
            println!();
            Ok(EXIT_USAGE)
        }
    }
}

fn run_params(matches: &ArgMatches, json_output: bool) -> anyhow::Result<i32> {
    match matches.subcommand() {
        Some(("convert", sub)) => {
            let text = read_input(sub.get_one::<String>("input").map_or("", String::as_str))?;
            let outcome = parse_any(&text);
            if !outcome.errors.is_empty() {
                if json_output {
                    print_json(&outcome)?;
                } else {
                    print_messages(&outcome.errors, &[]);
                }
                return Ok(EXIT_PROBLEMS);
            }
            let warnings = special_char_warnings(&outcome.params);
            let target = sub.get_one::<String>("to").map_or("json", String::as_str);
            let compact = sub.get_flag("compact");
            let rendered = match target {
                "query" => to_query_string(&outcome.params),
                "object" => {
                    let obj = to_object(&outcome.params);
                    if compact {
                        serde_json::to_string(&obj)?
                    } else {
                        serde_json::to_string_pretty(&obj)?
                    }
                }
                _ => to_json(&outcome.params, !compact),
            };
            if json_output {
                print_json(&serde_json::json!({
                    "format": outcome.format,
                    "to": target,
                    "output": rendered,
                    "warnings": warnings,
                }))?;
            } else {
                println!("{}", rendered);
                for w in &warnings {
                    eprintln!("warning: {}", w);
                }
            }
            Ok(EXIT_OK)
        }
        Some(("detect", sub)) => {
            let text = read_input(sub.get_one::<String>("input").map_or("", String::as_str))?;
            let format = detect_format(&text);
            if json_output {
                print_json(&serde_json::json!({ "format": format }))?;
            } else {
                println!("{}", format);
            }
            Ok(EXIT_OK)
        }
        _ => Ok(EXIT_USAGE),
    }
}

fn run_url(matches: &ArgMatches, json_output: bool) -> anyhow::Result<i32> {
    let Some((name, sub)) = matches.subcommand() else {
        return Ok(EXIT_USAGE);
    };
    let template = sub.get_one::<String>("template").cloned().unwrap_or_default();
    let params = match collect_params(sub) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_USAGE);
        }
    };
    match name {
        "resolve" => {
            let resolution = replace_url_params(&template, &params);
            let validation = validate_url_params(&template, &params);
            if json_output {
                print_json(&serde_json::json!({
                    "resolution": resolution,
                    "validation": validation,
                }))?;
            } else {
                if resolution.errors.is_empty() {
                    println!("{}", resolution.url);
                }
                print_messages(&validation.errors, &validation.warnings);
            }
            Ok(if validation.valid { EXIT_OK } else { EXIT_PROBLEMS })
        }
        "suggest" => {
            let pending = pending_url_params(&template, &params);
            if json_output {
                print_json(&pending)?;
            } else if pending.is_empty() {
                println!("All URL variables have a value");
            } else {
                for p in &pending {
                    println!(":{}", p.key.trim());
                }
            }
            Ok(EXIT_OK)
        }
        _ => Ok(EXIT_USAGE),
    }
}

fn run_mapping(matches: &ArgMatches, json_output: bool) -> anyhow::Result<i32> {
    let Some(("check", sub)) = matches.subcommand() else {
        return Ok(EXIT_USAGE);
    };
    let path = sub.get_one::<String>("response").map_or("-", String::as_str);
    let text = read_file_or_stdin(path)?;
    let response: Value = serde_json::from_str(&text)
        .with_context(|| format!("Response file is not valid JSON: {}", path))?;
    let items = sub.get_one::<String>("items").map_or("", String::as_str);
    let total = sub.get_one::<String>("total").map_or("", String::as_str);
    let result = validate_mapping(Some(&response), items, total);
    if json_output {
        print_json(&result)?;
    } else {
        if result.items_is_array {
            println!("items: {} found at '{}'", result.items_count, items);
        }
        if let Some(t) = result.total_value {
            println!("total: {}", t);
        }
        print_messages(&result.errors, &result.warnings);
    }
    Ok(if result.is_valid() { EXIT_OK } else { EXIT_PROBLEMS })
}

fn run_conflicts(matches: &ArgMatches, json_output: bool) -> anyhow::Result<i32> {
    let mut sources: Vec<Vec<Parameter>> = Vec::with_capacity(3);
    let mut parse_errors = Vec::new();
    for name in ["test", "default", "pagination"] {
        let text = matches.get_one::<String>(name).map_or("", String::as_str);
        let outcome = parse_any(text);
        parse_errors.extend(outcome.errors.iter().map(|e| format!("--{}: {}", name, e)));
        sources.push(outcome.params);
    }
    if !parse_errors.is_empty() {
        print_messages(&parse_errors, &[]);
        return Ok(EXIT_PROBLEMS);
    }

    let labels = SourceLabels::default();
    let validation = validate_param_conflicts(ConflictSources {
        test_params: &sources[0],
        default_params: &sources[1],
        pagination_params: &sources[2],
        labels: &labels,
    });
    if json_output {
        print_json(&validation)?;
    } else if validation.valid && validation.warnings.is_empty() {
        println!("No conflicts");
    } else {
        print_messages(&validation.errors, &validation.warnings);
    }
    Ok(if validation.valid { EXIT_OK } else { EXIT_PROBLEMS })
}

fn run_config(
    matches: &ArgMatches,
    store: &ConfigStore,
    http: HttpSettings,
    json_output: bool,
) -> anyhow::Result<i32> {
    match matches.subcommand() {
        Some(("show", sub)) => {
            let session = load_session(sub, store, http)?;
            print_config(session.config(), json_output)?;
            Ok(EXIT_OK)
        }
        Some(("validate", sub)) => {
            let session = load_session(sub, store, http)?;
            let report = session.config().validate();
            print_config_report(&report, json_output)?;
            Ok(if report.valid { EXIT_OK } else { EXIT_PROBLEMS })
        }
        Some(("save", sub)) => {
            let path = sub.get_one::<String>("file").map_or("", String::as_str);
            let cfg = load_config_file(Path::new(path))
                .with_context(|| format!("Failed to load configuration: {}", path))?;
            let session = ConfigSession::new(cfg, http);
            let report = session.config().validate();
            match session.save(store) {
                Ok(()) => {
                    print_config_report(&report, json_output)?;
                    if !json_output {
                        println!("Saved to {}", store.path().display());
                    }
                    Ok(EXIT_OK)
                }
                Err(Error::ConfigValidation(_)) => {
                    print_config_report(&report, json_output)?;
                    Ok(EXIT_PROBLEMS)
                }
                Err(e) => Err(e).context("Failed to save configuration"),
            }
        }
        Some(("clear", _)) => {
            let removed = store.clear().context("Failed to clear configuration")?;
            if json_output {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else if removed {
                println!("Saved configuration removed");
            } else {
                println!("No saved configuration");
            }
            Ok(EXIT_OK)
        }
        _ => Ok(EXIT_USAGE),
    }
}

fn print_config(config: &ApiConfig, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        print_json(config)
    } else {
        print!("{}", serde_yaml::to_string(config)?);
        Ok(())
    }
}

fn print_config_report(report: &ConfigReport, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        return print_json(report);
    }
    print_messages(&report.errors, &report.warnings);
    if report.valid {
        println!("Configuration is valid");
    }
    Ok(())
}

fn print_test_report(report: &ConnectionTestReport) {
    println!("{} {}", report.request.method, report.request.display_url());
    if let Some(status) = report.status {
        println!(
            "status: {} ({} ms)",
            status,
            report.elapsed_ms.unwrap_or_default()
        );
    }
    for w in &report.request.conflicts.errors {
        println!("warning: {}", w);
    }
    if let Some(err) = &report.error {
        println!("error: {}", err);
    }
    if let Some(mapping) = &report.mapping {
        print_messages(&mapping.errors, &mapping.warnings);
    }
    if report.fetched && report.error.is_none() {
        println!(
            "items: {}  total: {}",
            report.items.len(),
            report.total.unwrap_or_default()
        );
        if !report.suggested_columns.is_empty() {
            let keys: Vec<&str> = report.suggested_columns.iter().map(|c| c.key.as_str()).collect();
            println!("suggested columns: {}", keys.join(", "));
        }
    }
}
