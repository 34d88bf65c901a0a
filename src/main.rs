//! stackrun CLI Entry Point
//!
//! Runs as a CI step. All action inputs come from `INPUT_*` environment
//! variables; the command line only controls logging and dry runs.
//!
//! # Usage
//!
//! ```bash
//! # Install the CLI and run the configured command
//! INPUT_COMMAND=up INPUT_STACK-NAME=dev stackrun
//!
//! # Install-only mode (no command input)
//! INPUT_PULUMI-VERSION=^3 stackrun
//!
//! # Dry run mode (log CLI invocations instead of running them)
//! stackrun --dry-run
//! ```

use std::env;
use std::process::ExitCode;

use log::info;

use stackrun::action::exec::{CommandRunner, DryRunRunner, SystemRunner};
use stackrun::action::inputs::{self, EnvInputs, Mode};
use stackrun::action::{ActionConfig, ActionRunner};
use stackrun::environment::{HttpVersionSource, Installer};
use stackrun::github::{GithubClient, GithubEnv, WorkflowCommands};
use stackrun::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    dry_run: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Pulumi Stack Runner");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stackrun [OPTIONS]");
    println!();
    println!("Action inputs are read from INPUT_* environment variables,");
    println!("e.g. INPUT_COMMAND, INPUT_STACK-NAME, INPUT_PULUMI-VERSION.");
    println!();
    println!("Options:");
    println!("  --dry-run           Log CLI invocations without running them");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => config.dry_run = true,
            "--verbose" | "-v" => config.verbose = true,
            other => return Err(format!("Unknown option: {}", other)),
        }
    }

    Ok(config)
}

/// Installs the requested CLI unless the runner already has it.
fn install_cli(range: &str, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        info!("Dry run: skipping Pulumi CLI installation for {}", range);
        return Ok(());
    }

    let source = HttpVersionSource::new();
    let installer = Installer::new(&SystemRunner, &source);
    if let Some(bin_dir) = installer.ensure(range)? {
        WorkflowCommands::from_env().add_path(&bin_dir)?;
    }
    Ok(())
}

/// Runs the configured stack operation.
fn run_action(
    config: &ActionConfig,
    runner: &dyn CommandRunner,
) -> Result<(), Box<dyn std::error::Error>> {
    let github = GithubEnv::from_env();

    let client = match (&config.github_token, config.comment_on_pr) {
        (Some(token), true) => {
            let (owner, repo) = github.repo()?;
            Some(GithubClient::new(&github.api_url, owner, repo, token))
        }
        _ => None,
    };

    let mut action = ActionRunner::new(config, &github, runner, WorkflowCommands::from_env());
    if let Some(client) = &client {
        action.set_pr_api(client);
    }

    let report = action.run()?;
    info!(
        "pulumi {} on {}/{} finished with {} outputs",
        config.command,
        report.project,
        config.stack_name,
        report.outputs.len()
    );
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    if config.dry_run {
        info!("Mode: DRY RUN (CLI commands will not execute)");
        println!();
    }

    let mode = inputs::load(&EnvInputs)?;
    install_cli(mode.pulumi_version(), config.dry_run)?;

    let Mode::Run(action_config) = mode else {
        info!("No command given, installation only");
        return Ok(());
    };

    if config.dry_run {
        run_action(&action_config, &DryRunRunner)
    } else {
        run_action(&action_config, &SystemRunner)
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Err(write_err) = WorkflowCommands::from_env().error(&e.to_string()) {
                eprintln!("Error: {}", write_err);
            }
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
