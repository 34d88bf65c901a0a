//! Pulumi CLI Installation
//!
//! Makes sure a CLI matching the requested range is on PATH.
//!
//! # Resolution Order
//!
//! 1. A CLI already on the runner that satisfies the range is used as is
//! 2. Otherwise the matching release is downloaded into `~/.pulumi/bin`
//!    and that directory is prepended to PATH

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use thiserror::Error;

use super::versions::{self, VersionError, VersionSource};
use crate::action::exec::{args, CommandRunner, ExecOptions};

/// Root of the CLI's home directory (`~/.pulumi`).
pub static PULUMI_HOME: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(home) = std::env::var_os("PULUMI_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pulumi")
});

/// Installation errors.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Unsupported operating system - Pulumi CLI is only released for Darwin (x64, arm64), Linux (x64, arm64) and Windows (x64)")]
    UnsupportedPlatform,

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Release {version} has no download for {platform}")]
    NoDownload { version: String, platform: String },

    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Extracting {archive} failed: {message}")]
    Extract { archive: String, message: String },

    #[error("Installed version '{installed}' did not satisfy the resolved version {expected}")]
    VersionMismatch { installed: String, expected: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Release platform name for an OS/architecture pair.
pub fn platform_for(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Some("linux-x64"),
        ("linux", "aarch64") => Some("linux-arm64"),
        ("macos", "x86_64") => Some("darwin-x64"),
        ("macos", "aarch64") => Some("darwin-arm64"),
        ("windows", "x86_64") => Some("windows-x64"),
        _ => None,
    }
}

/// Release platform name for this machine.
pub fn current_platform() -> Option<&'static str> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Installs the CLI when needed.
pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    source: &'a dyn VersionSource,
    home: PathBuf,
    platform: Option<&'static str>,
}

impl<'a> Installer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, source: &'a dyn VersionSource) -> Self {
        Self {
            runner,
            source,
            home: PULUMI_HOME.clone(),
            platform: current_platform(),
        }
    }

    /// Overrides the install root (defaults to [`PULUMI_HOME`]).
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Overrides the detected platform.
    pub fn with_platform(mut self, platform: Option<&'static str>) -> Self {
        self.platform = platform;
        self
    }

    /// Directory the CLI binaries end up in.
    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    /// Version reported by the `pulumi` on PATH, if any.
    pub fn installed_version(&self) -> Option<String> {
        self.version_of("pulumi")
    }

    fn version_of(&self, binary: &str) -> Option<String> {
        match self.runner.run(binary, &args(["version"]), &ExecOptions::silent()) {
            Ok(res) if res.success && res.stderr.is_empty() => Some(res.stdout),
            Ok(res) => {
                debug!("'{} version' failed: {}", binary, res.stderr);
                None
            }
            Err(e) => {
                debug!("'{} version' could not run: {}", binary, e);
                None
            }
        }
    }

    /// Ensures a CLI satisfying `range` is available.
    ///
    /// Returns the directory that was added to PATH, or `None` when the
    /// runner's CLI already matched.
    pub fn ensure(&self, range: &str) -> Result<Option<PathBuf>, InstallError> {
        let platform = self.platform.ok_or(InstallError::UnsupportedPlatform)?;
        debug!("Platform: {}", platform);
        info!("Configured range: {}", range);

        match self.installed_version() {
            Some(current) if range != "dev" && versions::satisfies(&current, range) => {
                info!("Runner version {} matched. Skipping Pulumi CLI download", current);
                return Ok(None);
            }
            Some(current) => {
                info!("Pulumi CLI {} on the runner does not match. Proceeding to download", current)
            }
            None => info!("Pulumi CLI not installed on the runner. Proceeding to download"),
        }

        let release = versions::resolve(range, self.source)?;
        info!("Matched version: {}", release.version);

        if versions::satisfies(&release.version, "<3.0.0") {
            warn!(
                "Using Pulumi CLI version less than 3.0.0 may cause unexpected behavior. \
                 Please consider migrating to 3.0.0 or higher."
            );
        }

        let url = release
            .download_for(platform)
            .ok_or_else(|| InstallError::NoDownload {
                version: release.version.clone(),
                platform: platform.to_string(),
            })?;

        fs::create_dir_all(&self.home)?;
        let archive = self.download(url)?;

        let bin_dir = self.bin_dir();
        if bin_dir.exists() {
            fs::remove_dir_all(&bin_dir)?;
            info!("Deleted pre-existing {}", bin_dir.display());
        }

        self.extract(&archive, platform)?;
        if let Err(e) = fs::remove_file(&archive) {
            warn!("Failed to clean up {}: {}", archive.display(), e);
        }

        let binary = bin_dir.join(if platform.starts_with("windows") { "pulumi.exe" } else { "pulumi" });
        let installed = self
            .version_of(&binary.to_string_lossy())
            .unwrap_or_default();
        debug!("Installed CLI reports version {}", installed);

        if !versions::satisfies(&installed, &release.version) {
            return Err(InstallError::VersionMismatch {
                installed,
                expected: release.version,
            });
        }

        info!("Installed Pulumi CLI {} into {}", release.version, bin_dir.display());
        Ok(Some(bin_dir))
    }

    fn download(&self, url: &str) -> Result<PathBuf, InstallError> {
        let file_name = url.rsplit('/').next().unwrap_or("pulumi-archive");
        let target = self.home.join(file_name);
        info!("Downloading {}", url);

        let download_err = |source| InstallError::Download {
            url: url.to_string(),
            source,
        };
        let mut response = Client::new()
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?;

        let mut file = File::create(&target)?;
        response.copy_to(&mut file).map_err(download_err)?;
        file.flush()?;

        debug!("Downloaded {} to {}", url, target.display());
        Ok(target)
    }

    /// Unpacks the archive so binaries land in `bin/`.
    ///
    /// Unix archives contain `pulumi/<binaries>`; Windows archives
    /// contain `pulumi/bin/<binaries>`.
    fn extract(&self, archive: &Path, platform: &str) -> Result<(), InstallError> {
        let archive_str = archive.to_string_lossy().to_string();
        let home_str = self.home.to_string_lossy().to_string();

        let (program, argv, nested) = if platform.starts_with("windows") {
            ("unzip", args(["-o", "-q", archive_str.as_str(), "-d", home_str.as_str()]), self.home.join("pulumi").join("bin"))
        } else {
            ("tar", args(["-xzf", archive_str.as_str(), "-C", home_str.as_str()]), self.home.join("pulumi"))
        };

        let result = self
            .runner
            .run(program, &argv, &ExecOptions::silent())?;
        if !result.success {
            return Err(InstallError::Extract {
                archive: archive_str,
                message: result.stderr,
            });
        }

        fs::rename(&nested, self.bin_dir())?;
        debug!("Moved {} to {}", nested.display(), self.bin_dir().display());

        let leftover = self.home.join("pulumi");
        if leftover.exists() {
            fs::remove_dir_all(&leftover)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::exec::ExecResult;
    use crate::environment::versions::VersionInfo;
    use std::cell::RefCell;

    struct FakeRunner {
        version: Option<&'static str>,
        calls: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, argv: &[String], _opts: &ExecOptions) -> io::Result<ExecResult> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), argv.to_vec()));
            match self.version {
                Some(v) => Ok(ExecResult::ok(v)),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "pulumi not found")),
            }
        }
    }

    struct EmptySource;

    impl VersionSource for EmptySource {
        fn versions(&self) -> Result<Vec<VersionInfo>, VersionError> {
            Ok(Vec::new())
        }

        fn latest_dev(&self) -> Result<String, VersionError> {
            Ok("3.0.0".to_string())
        }
    }

    #[test]
    fn test_platform_mapping() {
        assert_eq!(platform_for("linux", "x86_64"), Some("linux-x64"));
        assert_eq!(platform_for("linux", "aarch64"), Some("linux-arm64"));
        assert_eq!(platform_for("macos", "x86_64"), Some("darwin-x64"));
        assert_eq!(platform_for("macos", "aarch64"), Some("darwin-arm64"));
        assert_eq!(platform_for("windows", "x86_64"), Some("windows-x64"));
        assert_eq!(platform_for("windows", "aarch64"), None);
        assert_eq!(platform_for("freebsd", "x86_64"), None);
    }

    #[test]
    fn test_skips_download_when_runner_matches() {
        let runner = FakeRunner {
            version: Some("v3.100.0"),
            calls: RefCell::new(Vec::new()),
        };
        let installer = Installer::new(&runner, &EmptySource).with_platform(Some("linux-x64"));

        assert_eq!(installer.ensure("^3").unwrap(), None);
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_unsupported_platform() {
        let runner = FakeRunner {
            version: None,
            calls: RefCell::new(Vec::new()),
        };
        let installer = Installer::new(&runner, &EmptySource).with_platform(None);

        assert!(matches!(
            installer.ensure("^3"),
            Err(InstallError::UnsupportedPlatform)
        ));
    }

    #[test]
    fn test_no_matching_release() {
        let temp_dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner {
            version: None,
            calls: RefCell::new(Vec::new()),
        };
        let installer = Installer::new(&runner, &EmptySource)
            .with_platform(Some("linux-x64"))
            .with_home(temp_dir.path());

        assert!(matches!(
            installer.ensure("^3"),
            Err(InstallError::Version(VersionError::NoMatch(_)))
        ));
    }

    #[test]
    fn test_bin_dir() {
        let runner = FakeRunner {
            version: None,
            calls: RefCell::new(Vec::new()),
        };
        let installer = Installer::new(&runner, &EmptySource).with_home("/opt/pulumi");
        assert_eq!(installer.bin_dir(), PathBuf::from("/opt/pulumi/bin"));
    }

    #[test]
    fn test_extract_moves_unix_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let home = temp_dir.path().to_path_buf();
        // Simulate what `tar` leaves behind.
        fs::create_dir_all(home.join("pulumi")).unwrap();
        fs::write(home.join("pulumi").join("pulumi"), "bin").unwrap();

        let runner = FakeRunner {
            version: Some(""),
            calls: RefCell::new(Vec::new()),
        };
        let installer = Installer::new(&runner, &EmptySource).with_home(&home);
        installer
            .extract(&home.join("pulumi.tar.gz"), "linux-x64")
            .unwrap();

        assert!(home.join("bin").join("pulumi").exists());
        assert!(!home.join("pulumi").exists());
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].0, "tar");
        assert_eq!(calls[0].1[0], "-xzf");
    }
}
