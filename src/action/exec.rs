//! External Command Execution
//!
//! Runs the CLI and system tools, capturing trimmed stdout/stderr and
//! the exit status. Non-zero exit codes are reported in the result, not
//! as errors; callers decide what a failure means.

use std::io;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, info};

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Directory to run in
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Suppress echoing of output to the log
    pub silent: bool,
}

impl ExecOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(dir.into()),
            ..Self::default()
        }
    }
}

/// Something that can run a program with arguments.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String], opts: &ExecOptions) -> io::Result<ExecResult>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], opts: &ExecOptions) -> io::Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);

        if let Some(dir) = &opts.cwd {
            cmd.current_dir(dir);
            debug!("Executing in directory: {}", dir.display());
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        debug!("Running: {} {}", program, display_args(args));
        let output = cmd.output()?;

        let result = ExecResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if !opts.silent {
            if !result.stdout.is_empty() {
                info!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                info!("{}", result.stderr);
            }
        }

        Ok(result)
    }
}

/// Logs commands instead of running them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, program: &str, args: &[String], opts: &ExecOptions) -> io::Result<ExecResult> {
        match &opts.cwd {
            Some(dir) => info!("[dry-run] ({}) {} {}", dir.display(), program, display_args(args)),
            None => info!("[dry-run] {} {}", program, display_args(args)),
        }
        Ok(ExecResult::ok(""))
    }
}

/// Converts string literals into an owned argument vector.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Joins arguments for logging, hiding the value that follows `--secret`.
pub fn display_args(args: &[String]) -> String {
    let mut shown = Vec::with_capacity(args.len());
    let mut secret_next = false;
    for arg in args {
        if secret_next {
            let key = arg.split_once('=').map_or(arg.as_str(), |(k, _)| k);
            shown.push(format!("{}=***", key));
        } else {
            shown.push(arg.clone());
        }
        secret_next = arg == "--secret";
    }
    shown.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_args_hides_secret_values() {
        let argv = args([
            "config", "set-all", "--stack", "dev", "--plaintext", "region=us-east-1", "--secret",
            "token=hunter2",
        ]);
        let shown = display_args(&argv);
        assert!(!shown.contains("hunter2"));
        assert!(shown.ends_with("--secret token=***"));
        assert!(shown.contains("--plaintext region=us-east-1"));
    }

    #[test]
    fn test_system_runner_captures_trimmed_stdout() {
        let result = SystemRunner
            .run("echo", &args(["  hello  "]), &ExecOptions::silent())
            .unwrap();
        assert!(result.success);
        assert_eq!(result.code, Some(0));
        assert_eq!(result.stdout, "hello");
    }

    #[test]
    fn test_system_runner_reports_failure() {
        let result = SystemRunner
            .run("sh", &args(["-c", "echo oops >&2; exit 3"]), &ExecOptions::silent())
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(3));
        assert_eq!(result.stderr, "oops");
    }

    #[test]
    fn test_system_runner_missing_program() {
        let result = SystemRunner.run(
            "definitely-not-a-real-binary-xyz",
            &[],
            &ExecOptions::silent(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_system_runner_cwd_and_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut opts = ExecOptions::in_dir(temp_dir.path());
        opts.env.push(("STACKRUN_TEST_VAR".to_string(), "value".to_string()));
        opts.silent = true;

        let result = SystemRunner
            .run("sh", &args(["-c", "echo $STACKRUN_TEST_VAR; pwd"]), &opts)
            .unwrap();
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines[0], "value");
        let expected = temp_dir.path().canonicalize().unwrap();
        let actual = std::path::Path::new(lines[1]).canonicalize().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_dry_run_runner_succeeds() {
        let result = DryRunRunner
            .run("pulumi", &args(["up", "--yes"]), &ExecOptions::default())
            .unwrap();
        assert!(result.success);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_exec_result_constructors() {
        assert!(ExecResult::ok("x").success);
        let failed = ExecResult::failed(2, "bad");
        assert!(!failed.success);
        assert_eq!(failed.code, Some(2));
        assert_eq!(failed.stderr, "bad");
    }
}
