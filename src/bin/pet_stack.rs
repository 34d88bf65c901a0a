//! pet-stack: random pet test stack
//!
//! Runs the random-pet program against a local provider and prints its
//! outputs as JSON. Configuration comes from `PULUMI_CONFIG`.
//!
//! # Usage
//!
//! ```bash
//! PULUMI_CONFIG='{"pet-stack:name":"my-pet"}' pet-stack --flavor nodejs
//! ```

use std::env;
use std::process::ExitCode;

use stackrun::program::{run_program, Config, LocalProvider, PetStack};

const DEFAULT_PROJECT: &str = "pet-stack";
const DEFAULT_STACK: &str = "dev";

#[derive(Debug)]
struct Args {
    flavor: PetStack,
    seed: Option<u64>,
    verbose: bool,
}

fn print_usage() {
    println!("Usage: pet-stack [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --flavor NAME   Program flavor: python, nodejs, dotnet (default: python)");
    println!("  --seed N        Seed the pet name generator");
    println!("  --verbose       Enable debug logging");
    println!("  --help          Show this help message");
}

fn parse_arguments(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        flavor: PetStack::default(),
        seed: None,
        verbose: false,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--verbose" | "-v" => parsed.verbose = true,
            "--flavor" => {
                i += 1;
                let name = args.get(i).ok_or("--flavor requires a name")?;
                parsed.flavor =
                    PetStack::flavor(name).ok_or_else(|| format!("Unknown flavor: {}", name))?;
            }
            "--seed" => {
                i += 1;
                let raw = args.get(i).ok_or("--seed requires a number")?;
                parsed.seed = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid seed value: {}", raw))?,
                );
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 1;
    }

    Ok(parsed)
}

/// Default log filter; `RUST_LOG` still overrides it.
fn log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = env::args().collect();
    let args = parse_arguments(&argv).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level(args.verbose)),
    )
    .init();

    let project = env::var("PULUMI_PROJECT").unwrap_or_else(|_| DEFAULT_PROJECT.to_string());
    let stack = env::var("PULUMI_STACK").unwrap_or_else(|_| DEFAULT_STACK.to_string());

    let config = Config::from_env(project.as_str())?;
    let mut provider = match args.seed {
        Some(seed) => LocalProvider::with_seed(project.as_str(), stack.as_str(), seed),
        None => LocalProvider::new(project.as_str(), stack.as_str()),
    };

    let outputs = run_program(&args.flavor, &config, &mut provider)?;
    println!("{}", serde_json::to_string_pretty(&outputs.to_json())?);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
