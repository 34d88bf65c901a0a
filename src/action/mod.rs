//! CI Action Module
//!
//! Drives the Pulumi CLI from CI inputs.
//!
//! # Structure
//!
//! - [`inputs`]: Typed action inputs and mode selection
//! - [`exec`]: Process execution behind a swappable runner
//! - [`pulumi`]: Typed CLI operations
//! - [`runner`]: The end-to-end run

pub mod exec;
pub mod inputs;
pub mod pulumi;
pub mod runner;

pub use exec::{CommandRunner, DryRunRunner, SystemRunner};
pub use inputs::{ActionConfig, Command, InputError, Mode};
pub use pulumi::{Pulumi, PulumiError};
pub use runner::{ActionError, ActionRunner, RunReport};
