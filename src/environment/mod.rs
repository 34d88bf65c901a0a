//! Tool Environment Module
//!
//! Getting the right Pulumi CLI onto the runner and keeping its plugins
//! around between runs.

pub mod installer;
pub mod plugin_cache;
pub mod versions;

pub use installer::{InstallError, Installer};
pub use versions::{HttpVersionSource, VersionInfo, VersionSource};
