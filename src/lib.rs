//! stackrun - Pulumi Stack Runner for CI
//!
//! Runs Pulumi stack operations from CI inputs and reports the results
//! back to the workflow, the job summary and the pull request. Ships
//! with a random-pet test stack for exercising the runner end to end.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`action`]: Input handling, CLI wrapper and the run itself
//! - [`environment`]: CLI installation and plugin caching
//! - [`github`]: Workflow commands, summaries and PR comments
//! - [`program`]: The random-pet test stack
//!
//! # Example
//!
//! ```rust,no_run
//! use stackrun::action::{inputs, ActionRunner, Mode, SystemRunner};
//! use stackrun::github::{GithubEnv, WorkflowCommands};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Read INPUT_* variables
//!     let Mode::Run(config) = inputs::load(&inputs::EnvInputs)? else {
//!         return Ok(());
//!     };
//!
//!     let github = GithubEnv::from_env();
//!     let mut runner = ActionRunner::new(&config, &github, &SystemRunner, WorkflowCommands::from_env());
//!     let report = runner.run()?;
//!     println!("{} outputs", report.outputs.len());
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod environment;
pub mod github;
pub mod program;

// Re-export commonly used types
pub use action::{ActionConfig, ActionRunner, Command, Mode};
pub use environment::Installer;
pub use github::{GithubEnv, WorkflowCommands};
pub use program::{run_program, Config, LocalProvider, PetStack, StackOutputs};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "stackrun";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "stackrun");
    }

    #[test]
    fn test_module_exports_command() {
        assert_eq!(Command::Up.as_str(), "up");
        assert_eq!(Command::Destroy.to_string(), "destroy");
    }

    #[test]
    fn test_module_exports_program() {
        let config = Config::from_map("pets", [("name", "my-pet")]);
        let mut provider = LocalProvider::with_seed("pets", "dev", 7);
        let outputs = run_program(&PetStack::default(), &config, &mut provider).unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
