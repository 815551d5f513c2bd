//! Command-line interface for mdscan
//! Parses one markdown document under a security profile and prints the extraction result
//! as JSON.
//!
//! Usage:
//!   mdscan `<path>` [--profile `<name>`] [--config `<file>`] [--compact]   - Extract a document
//!   mdscan --list-profiles                                                   - List profiles
//!
//! `<path>` may be `-` to read standard input. The exit code is 0 on success, 1 on error and
//! 2 when the parse ran out of time. The hidden `worker` subcommand is the tokenizer worker
//! that profiles with process isolation start; it speaks JSON on stdin/stdout.

use clap::{Arg, ArgAction, ArgMatches, Command};
use mdscan_config::{Loader, ScanConfig};
use mdscan_extract::{
    worker, ExtractError, ExtractOptions, Extractor, ParseOutcome, WorkerCommand,
};
use std::io::Read;
use std::process::exit;

const EXIT_ERROR: i32 = 1;
const EXIT_TIMEOUT: i32 = 2;

fn main() {
    let matches = Command::new("mdscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extract links, headings, tables and more from untrusted markdown")
        .arg_required_else_help(true)
        .args_conflicts_with_subcommands(true)
        .subcommand_negates_reqs(true)
        .arg(
            Arg::new("path")
                .help("Markdown file to scan, or '-' for standard input")
                .required_unless_present("list-profiles")
                .index(1),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .short('p')
                .help("Security profile (default: the configuration's default_profile)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("TOML file layered over the built-in profiles"),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .help("Print JSON on a single line")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log debug output to stderr")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-profiles")
                .long("list-profiles")
                .help("List available security profiles")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("worker")
                .about("Tokenize one request from stdin (used by process isolation)")
                .hide(true)
                .arg(
                    Arg::new("stack-bytes")
                        .long("stack-bytes")
                        .help("Stack size of the tokenizer thread")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .get_matches();

    init_logging(matches.get_flag("verbose"));

    if let Some(worker_matches) = matches.subcommand_matches("worker") {
        handle_worker_command(worker_matches.get_one::<usize>("stack-bytes").copied());
        return;
    }

    let config = load_config(&matches);
    if matches.get_flag("list-profiles") {
        handle_list_profiles_command(&config);
        return;
    }

    let path = matches
        .get_one::<String>("path")
        .map(String::as_str)
        .unwrap_or("-");
    let profile = matches
        .get_one::<String>("profile")
        .cloned()
        .unwrap_or_else(|| config.default_profile.clone());
    let code = handle_extract_command(&config, &profile, path, matches.get_flag("compact"));
    exit(code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> ScanConfig {
    let mut loader = Loader::new();
    if let Some(path) = matches.get_one::<String>("config") {
        loader = loader.with_file(path);
    }
    loader.build().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        exit(EXIT_ERROR);
    })
}

/// Handle the extract command. Returns the exit code.
fn handle_extract_command(config: &ScanConfig, profile: &str, path: &str, compact: bool) -> i32 {
    let options = ExtractOptions::from_config(config, profile).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(EXIT_ERROR);
    });

    let source = read_source(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path, e);
        exit(EXIT_ERROR);
    });

    let mut extractor = Extractor::new(options);
    if extractor.options().process_isolation {
        match WorkerCommand::current_exe() {
            Ok(command) => {
                let stack = extractor.options().worker_stack_bytes.to_string();
                extractor = extractor.with_worker(command.arg("--stack-bytes").arg(stack));
            }
            Err(e) => log::warn!("cannot locate own executable for worker processes: {}", e),
        }
    }

    let outcome = extractor.extract_default(&source).unwrap_or_else(|e| {
        eprintln!("Extraction error: {}", e);
        exit(EXIT_ERROR);
    });

    let rendered = if compact {
        serde_json::to_string(&outcome)
    } else {
        serde_json::to_string_pretty(&outcome)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error formatting result: {}", e);
            return EXIT_ERROR;
        }
    }

    match outcome {
        ParseOutcome::Completed(_) => 0,
        ParseOutcome::TimedOut(report) => {
            eprintln!(
                "Timed out during {:?} after {:.0}ms (budget {:.0}ms)",
                report.stage, report.elapsed_ms, report.budget_ms
            );
            EXIT_TIMEOUT
        }
    }
}

fn read_source(path: &str) -> std::io::Result<String> {
    if path == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(path)
    }
}

/// Handle the worker subcommand
///
/// With `--stack-bytes` the request is served on a thread of that stack size, the same
/// stack the profile gives the in-process worker thread.
fn handle_worker_command(stack_bytes: Option<usize>) {
    let serve = || worker::serve(std::io::stdin().lock(), std::io::stdout().lock());
    let result = match stack_bytes {
        Some(bytes) => std::thread::Builder::new()
            .name("mdscan-tokenizer".to_string())
            .stack_size(bytes)
            .spawn(serve)
            .map_err(ExtractError::from)
            .and_then(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(ExtractError::WorkerPanicked(
                        "tokenizer thread panicked".to_string(),
                    ))
                })
            }),
        None => serve(),
    };
    if let Err(e) = result {
        eprintln!("Worker error: {}", e);
        exit(EXIT_ERROR);
    }
}

/// Handle the list-profiles command
fn handle_list_profiles_command(config: &ScanConfig) {
    println!("Available security profiles:\n");
    for name in config.profile_names() {
        let Ok(profile) = config.profile(&name) else {
            continue;
        };
        let marker = if name == config.default_profile {
            " (default)"
        } else {
            ""
        };
        println!("  {}{}", name, marker);
        println!(
            "    timeout {}s, process isolation {}, html {}",
            profile.timeout_secs,
            if profile.process_isolation { "on" } else { "off" },
            if profile.allow_html { "allowed" } else { "dropped" },
        );
        println!();
    }
}
