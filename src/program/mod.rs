//! Stack Program Module
//!
//! The random-pet test stack used to check that the runner can load a
//! stack, pass it configuration, and capture what it exports.
//!
//! # Structure
//!
//! - [`config`]: Project-namespaced configuration values
//! - [`random_pet`]: The random pet resource and its local provider
//! - [`outputs`]: Exported stack outputs
//!
//! # Example
//!
//! ```rust
//! use stackrun::program::{run_program, Config, LocalProvider, PetStack};
//!
//! let config = Config::from_map("pets", [("name", "my-pet")]);
//! let mut provider = LocalProvider::with_seed("pets", "dev", 1);
//! let outputs = run_program(&PetStack::nodejs(), &config, &mut provider).unwrap();
//! assert!(outputs.get("petName").is_some());
//! ```

pub mod config;
pub mod outputs;
pub mod random_pet;

use log::{debug, info};
use thiserror::Error;

pub use config::{Config, ConfigError};
pub use outputs::{OutputValue, StackOutputs};
pub use random_pet::{LocalProvider, ProviderError, RandomPet, RandomPetArgs, ResourceProvider};

/// Errors that abort a stack program.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Everything a program may touch while it runs.
pub struct StackContext<'a> {
    pub config: &'a Config,
    pub provider: &'a mut dyn ResourceProvider,
    pub outputs: StackOutputs,
}

impl<'a> StackContext<'a> {
    pub fn new(config: &'a Config, provider: &'a mut dyn ResourceProvider) -> Self {
        Self {
            config,
            provider,
            outputs: StackOutputs::new(),
        }
    }
}

/// A stack program body.
pub trait Program {
    fn run(&self, ctx: &mut StackContext<'_>) -> Result<(), ProgramError>;
}

/// The random-pet test stack.
///
/// Reads the required `name` value, creates one random pet named after
/// it, and exports the pet's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetStack {
    /// Output key the pet id is exported under
    pub export_key: String,
    /// Word count for the pet name (provider default when unset)
    pub length: Option<u32>,
    /// Whether to emit the debug line after creation
    pub debug_log: bool,
}

impl PetStack {
    /// Exports `name` and logs the created pet.
    pub fn python() -> Self {
        Self {
            export_key: "name".to_string(),
            length: None,
            debug_log: true,
        }
    }

    /// Exports `petName`.
    pub fn nodejs() -> Self {
        Self {
            export_key: "petName".to_string(),
            length: None,
            debug_log: false,
        }
    }

    /// Exports `petName` using the provider's default length.
    pub fn dotnet() -> Self {
        Self {
            export_key: "petName".to_string(),
            length: None,
            debug_log: false,
        }
    }

    /// Looks up a flavor by name.
    pub fn flavor(name: &str) -> Option<Self> {
        match name {
            "python" => Some(Self::python()),
            "nodejs" => Some(Self::nodejs()),
            "dotnet" => Some(Self::dotnet()),
            _ => None,
        }
    }
}

impl Default for PetStack {
    fn default() -> Self {
        Self::python()
    }
}

impl Program for PetStack {
    fn run(&self, ctx: &mut StackContext<'_>) -> Result<(), ProgramError> {
        let name = ctx.config.require("name")?;

        let mut args = RandomPetArgs::default();
        if let Some(length) = ctx.config.get_parsed::<u32>("length")?.or(self.length) {
            args = args.with_length(length);
        }

        let pet = ctx.provider.create_random_pet(name, &args)?;

        if self.debug_log {
            debug!("I'm a random pet: {} ({})", pet.id, pet.urn);
        }

        ctx.outputs.export(self.export_key.as_str(), pet.id);
        Ok(())
    }
}

/// Runs a program to completion and returns its outputs.
pub fn run_program(
    program: &dyn Program,
    config: &Config,
    provider: &mut dyn ResourceProvider,
) -> Result<StackOutputs, ProgramError> {
    info!("Running stack program for project '{}'", config.project());

    let mut ctx = StackContext::new(config, provider);
    program.run(&mut ctx)?;

    info!("Program finished with {} outputs", ctx.outputs.len());
    Ok(ctx.outputs)
}
