//! Pulumi CLI Wrapper
//!
//! Typed operations over the `pulumi` binary. Every call goes through a
//! [`CommandRunner`], so the same code drives real runs, dry runs and
//! tests.

use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::exec::{args, CommandRunner, ExecOptions, ExecResult};
use super::inputs::{Command, ConfigMap, OperationOptions};
use crate::program::StackOutputs;

const PULUMI_BIN: &str = "pulumi";

/// Placeholder the CLI prints for secret outputs when not revealing them.
const SECRET_SENTINEL: &str = "[secret]";

/// Project files the CLI recognises, in lookup order.
const PROJECT_FILES: &[&str] = &["Pulumi.yaml", "Pulumi.yml", "Pulumi.json"];

/// CLI invocation errors.
#[derive(Debug, Error)]
pub enum PulumiError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'pulumi {command}' failed with exit code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("No Pulumi project file found in {0}")]
    ProjectNotFound(PathBuf),

    #[error("Failed to read project file {path}: {message}")]
    ProjectInvalid { path: PathBuf, message: String },

    #[error("Unexpected stack output from CLI: {0}")]
    InvalidOutputs(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ProjectSettings {
    name: String,
}

/// Handle to the CLI bound to one stack and working directory.
pub struct Pulumi<'r> {
    runner: &'r dyn CommandRunner,
    work_dir: PathBuf,
    stack: String,
}

impl<'r> Pulumi<'r> {
    pub fn new(
        runner: &'r dyn CommandRunner,
        work_dir: impl Into<PathBuf>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            work_dir: work_dir.into(),
            stack: stack.into(),
        }
    }

    fn options(&self, silent: bool) -> ExecOptions {
        ExecOptions {
            cwd: Some(self.work_dir.clone()),
            env: Vec::new(),
            silent,
        }
    }

    fn exec(&self, argv: Vec<String>, silent: bool) -> Result<ExecResult, PulumiError> {
        self.runner
            .run(PULUMI_BIN, &argv, &self.options(silent))
            .map_err(|source| PulumiError::Spawn {
                program: PULUMI_BIN.to_string(),
                source,
            })
    }

    fn checked(&self, argv: Vec<String>, silent: bool) -> Result<ExecResult, PulumiError> {
        let label = argv
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let result = self.exec(argv, silent)?;
        if result.success {
            Ok(result)
        } else {
            Err(PulumiError::Failed {
                command: label,
                code: result.code,
                stderr: result.stderr,
            })
        }
    }

    /// Whether the CLI can be launched at all.
    pub fn is_available(&self) -> bool {
        matches!(self.exec(args(["version"]), true), Ok(r) if r.success)
    }

    /// Version string reported by the CLI, e.g. `v3.100.0`.
    pub fn version(&self) -> Result<String, PulumiError> {
        self.checked(args(["version"]), true).map(|r| r.stdout)
    }

    /// Logs into the given backend, or the default cloud backend.
    pub fn login(&self, cloud_url: Option<&str>) -> Result<(), PulumiError> {
        let mut argv = args(["login"]);
        match cloud_url {
            Some(url) => {
                info!("Logging into {}", url);
                argv.push(url.to_string());
            }
            None => info!("Logging into the Pulumi Cloud backend."),
        }
        argv.push("--non-interactive".to_string());
        self.checked(argv, true).map(|_| ())
    }

    /// Selects the stack, creating it first when `create` is set.
    pub fn select_stack(
        &self,
        create: bool,
        secrets_provider: Option<&str>,
    ) -> Result<(), PulumiError> {
        let mut argv = args(["stack", "select", "--stack", self.stack.as_str()]);
        if create {
            argv.push("--create".to_string());
        }
        if let Some(provider) = secrets_provider {
            argv.push("--secrets-provider".to_string());
            argv.push(provider.to_string());
        }
        argv.push("--non-interactive".to_string());
        debug!("Selecting stack {} (create: {})", self.stack, create);
        self.checked(argv, true).map(|_| ())
    }

    /// Reads the project name from the project file in the work dir.
    pub fn project_name(&self) -> Result<String, PulumiError> {
        let path = PROJECT_FILES
            .iter()
            .map(|f| self.work_dir.join(f))
            .find(|p| p.exists())
            .ok_or_else(|| PulumiError::ProjectNotFound(self.work_dir.clone()))?;

        let invalid = |message: String| PulumiError::ProjectInvalid {
            path: path.clone(),
            message,
        };

        let content = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let settings: ProjectSettings = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?
        };
        Ok(settings.name)
    }

    /// Applies every entry of a config map to the stack.
    pub fn set_all_config(&self, config: &ConfigMap) -> Result<(), PulumiError> {
        if config.is_empty() {
            return Ok(());
        }
        let mut argv = args(["config", "set-all", "--stack", self.stack.as_str()]);
        for (key, entry) in config {
            argv.push(if entry.secret { "--secret" } else { "--plaintext" }.to_string());
            argv.push(format!("{}={}", key, entry.value));
        }
        info!("Setting {} configuration values", config.len());
        self.checked(argv, true).map(|_| ())
    }

    /// Refreshes the stack state ahead of the main operation.
    pub fn refresh(&self, options: &OperationOptions) -> Result<String, PulumiError> {
        self.run_operation(Command::Refresh, options)
    }

    /// Runs the operation and returns its stdout.
    pub fn run_operation(
        &self,
        command: Command,
        options: &OperationOptions,
    ) -> Result<String, PulumiError> {
        let argv = operation_args(command, &self.stack, options);
        let result = self.checked(argv, false)?;
        Ok(result.stdout)
    }

    /// Reads the stack outputs, flagging secrets.
    ///
    /// Secret values are detected by comparing the masked listing with
    /// the revealed one.
    pub fn stack_outputs(&self) -> Result<StackOutputs, PulumiError> {
        let masked = self.checked(
            args(["stack", "output", "--json", "--stack", self.stack.as_str()]),
            true,
        )?;
        let revealed = self.checked(
            args(["stack", "output", "--json", "--show-secrets", "--stack", self.stack.as_str()]),
            true,
        )?;
        parse_outputs(&masked.stdout, &revealed.stdout)
    }

    /// Deletes the stack and its configuration.
    pub fn remove_stack(&self) -> Result<(), PulumiError> {
        info!("Removing stack {}", self.stack);
        self.checked(args(["stack", "rm", "--yes", self.stack.as_str()]), true)
            .map(|_| ())
    }
}

/// Builds the CLI arguments for one operation.
pub fn operation_args(command: Command, stack: &str, options: &OperationOptions) -> Vec<String> {
    let mut argv: Vec<String> = match command {
        Command::Up | Command::Update => args(["up", "--yes", "--skip-preview"]),
        Command::Refresh => args(["refresh", "--yes", "--skip-preview"]),
        Command::Destroy => args(["destroy", "--yes", "--skip-preview"]),
        Command::Preview => args(["preview"]),
        Command::Output => return args(["stack", "output", "--stack", stack]),
    };
    argv.push("--stack".to_string());
    argv.push(stack.to_string());
    argv.push("--non-interactive".to_string());

    let mut flag = |name: &str, value: Option<&str>| {
        argv.push(format!("--{}", name));
        if let Some(v) = value {
            argv.push(v.to_string());
        }
    };

    if let Some(parallel) = options.parallel {
        flag("parallel", Some(&parallel.to_string()));
    }
    if let Some(message) = &options.message {
        flag("message", Some(message.as_str()));
    }
    if options.diff {
        flag("diff", None);
    }
    if options.expect_no_changes && command != Command::Preview {
        flag("expect-no-changes", None);
    }
    for target in &options.target {
        flag("target", Some(target.as_str()));
    }
    if options.target_dependents && command != Command::Refresh {
        flag("target-dependents", None);
    }
    if let Some(color) = options.color {
        flag("color", Some(color.as_str()));
    }
    if options.suppress_outputs {
        flag("suppress-outputs", None);
    }
    if options.suppress_progress {
        flag("suppress-progress", None);
    }

    match command {
        Command::Up | Command::Update | Command::Preview => {
            for urn in &options.replace {
                flag("replace", Some(urn.as_str()));
            }
            for pack in &options.policy_packs {
                flag("policy-pack", Some(pack.as_str()));
            }
            for config in &options.policy_pack_configs {
                flag("policy-pack-config", Some(config.as_str()));
            }
            if let Some(plan) = &options.plan {
                let name = if command == Command::Preview { "save-plan" } else { "plan" };
                flag(name, Some(plan.as_str()));
            }
        }
        Command::Destroy => {
            if options.exclude_protected {
                flag("exclude-protected", None);
            }
        }
        Command::Refresh | Command::Output => {}
    }

    argv
}

/// Merges masked and revealed `stack output --json` listings.
pub fn parse_outputs(masked: &str, revealed: &str) -> Result<StackOutputs, PulumiError> {
    let masked = parse_object(masked)?;
    let revealed = parse_object(revealed)?;

    let mut outputs = StackOutputs::new();
    for (key, value) in revealed {
        let secret = matches!(masked.get(&key), Some(Value::String(s)) if s == SECRET_SENTINEL)
            && value != Value::String(SECRET_SENTINEL.to_string());
        if secret {
            outputs.export_secret(key, value);
        } else {
            outputs.export(key, value);
        }
    }
    Ok(outputs)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, PulumiError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::inputs::{Color, ConfigValue};
    use serde_json::json;
    use std::cell::RefCell;
    use std::io;

    /// Records invocations and answers from a list of canned results.
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
        responses: Vec<(&'static str, ExecResult)>,
    }

    impl Recorder {
        fn new(responses: Vec<(&'static str, ExecResult)>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                responses,
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, _program: &str, argv: &[String], _opts: &ExecOptions) -> io::Result<ExecResult> {
            self.calls.borrow_mut().push(argv.to_vec());
            let joined = argv.join(" ");
            Ok(self
                .responses
                .iter()
                .find(|(prefix, _)| joined.starts_with(prefix))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| ExecResult::ok("")))
        }
    }

    #[test]
    fn test_version_and_availability() {
        let runner = Recorder::new(vec![("version", ExecResult::ok("v3.100.0"))]);
        let pulumi = Pulumi::new(&runner, "/work", "dev");
        assert!(pulumi.is_available());
        assert_eq!(pulumi.version().unwrap(), "v3.100.0");

        let broken = Recorder::new(vec![("version", ExecResult::failed(127, "not found"))]);
        let pulumi = Pulumi::new(&broken, "/work", "dev");
        assert!(!pulumi.is_available());
        assert!(matches!(pulumi.version(), Err(PulumiError::Failed { .. })));
    }

    #[test]
    fn test_up_args_basic() {
        let argv = operation_args(Command::Up, "dev", &OperationOptions::default());
        assert_eq!(
            argv,
            vec!["up", "--yes", "--skip-preview", "--stack", "dev", "--non-interactive"]
        );
    }

    #[test]
    fn test_update_is_up() {
        let opts = OperationOptions::default();
        assert_eq!(
            operation_args(Command::Update, "dev", &opts),
            operation_args(Command::Up, "dev", &opts)
        );
    }

    #[test]
    fn test_preview_flags() {
        let opts = OperationOptions {
            diff: true,
            expect_no_changes: true,
            plan: Some("plan.json".to_string()),
            replace: vec!["urn:a".to_string()],
            color: Some(Color::Always),
            ..Default::default()
        };
        let argv = operation_args(Command::Preview, "prod", &opts);
        assert!(argv.contains(&"--diff".to_string()));
        assert!(!argv.contains(&"--expect-no-changes".to_string()));
        assert!(argv.windows(2).any(|w| w == ["--save-plan", "plan.json"]));
        assert!(argv.windows(2).any(|w| w == ["--replace", "urn:a"]));
        assert!(argv.windows(2).any(|w| w == ["--color", "always"]));
    }

    #[test]
    fn test_up_uses_plan() {
        let opts = OperationOptions {
            plan: Some("plan.json".to_string()),
            ..Default::default()
        };
        let argv = operation_args(Command::Up, "dev", &opts);
        assert!(argv.windows(2).any(|w| w == ["--plan", "plan.json"]));
    }

    #[test]
    fn test_exclude_protected_only_for_destroy() {
        let opts = OperationOptions {
            exclude_protected: true,
            ..Default::default()
        };
        assert!(operation_args(Command::Destroy, "dev", &opts)
            .contains(&"--exclude-protected".to_string()));
        assert!(!operation_args(Command::Up, "dev", &opts)
            .contains(&"--exclude-protected".to_string()));
    }

    #[test]
    fn test_refresh_skips_replace_and_target_dependents() {
        let opts = OperationOptions {
            replace: vec!["urn:a".to_string()],
            target: vec!["urn:b".to_string()],
            target_dependents: true,
            parallel: Some(2),
            ..Default::default()
        };
        let argv = operation_args(Command::Refresh, "dev", &opts);
        assert!(!argv.contains(&"--replace".to_string()));
        assert!(!argv.contains(&"--target-dependents".to_string()));
        assert!(argv.windows(2).any(|w| w == ["--target", "urn:b"]));
        assert!(argv.windows(2).any(|w| w == ["--parallel", "2"]));
    }

    #[test]
    fn test_output_command() {
        let opts = OperationOptions {
            diff: true,
            ..Default::default()
        };
        assert_eq!(
            operation_args(Command::Output, "dev", &opts),
            vec!["stack", "output", "--stack", "dev"]
        );
    }

    #[test]
    fn test_parse_outputs_detects_secrets() {
        let masked = r#"{"petName": "calm-yak", "token": "[secret]"}"#;
        let revealed = r#"{"petName": "calm-yak", "token": "abc123"}"#;
        let outputs = parse_outputs(masked, revealed).unwrap();

        assert!(!outputs.get("petName").unwrap().secret);
        let token = outputs.get("token").unwrap();
        assert!(token.secret);
        assert_eq!(token.value, json!("abc123"));
    }

    #[test]
    fn test_parse_outputs_empty() {
        assert!(parse_outputs("", "").unwrap().is_empty());
        assert!(parse_outputs("{}", "{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_outputs_invalid_json() {
        assert!(matches!(
            parse_outputs("{", "{"),
            Err(PulumiError::InvalidOutputs(_))
        ));
    }

    #[test]
    fn test_login_args() {
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");

        pulumi.login(Some("file://~")).unwrap();
        pulumi.login(None).unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(calls[0], vec!["login", "file://~", "--non-interactive"]);
        assert_eq!(calls[1], vec!["login", "--non-interactive"]);
    }

    #[test]
    fn test_select_stack_with_create_and_secrets() {
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");

        pulumi.select_stack(true, Some("passphrase")).unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(
            calls[0],
            vec![
                "stack",
                "select",
                "--stack",
                "dev",
                "--create",
                "--secrets-provider",
                "passphrase",
                "--non-interactive"
            ]
        );
    }

    #[test]
    fn test_failed_command_is_error() {
        let recorder = Recorder::new(vec![("stack select", ExecResult::failed(255, "no stack named 'dev'"))]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");

        let err = pulumi.select_stack(false, None).unwrap_err();
        match err {
            PulumiError::Failed { command, code, stderr } => {
                assert_eq!(command, "stack select");
                assert_eq!(code, Some(255));
                assert!(stderr.contains("no stack"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_set_all_config() {
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");
        let mut map = ConfigMap::new();
        map.insert(
            "name".to_string(),
            ConfigValue {
                value: "rex".to_string(),
                secret: false,
            },
        );
        map.insert(
            "token".to_string(),
            ConfigValue {
                value: "abc".to_string(),
                secret: true,
            },
        );

        pulumi.set_all_config(&map).unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(
            calls[0],
            vec![
                "config", "set-all", "--stack", "dev", "--plaintext", "name=rex", "--secret",
                "token=abc"
            ]
        );
    }

    #[test]
    fn test_set_all_config_empty_is_noop() {
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");
        pulumi.set_all_config(&ConfigMap::new()).unwrap();
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn test_stack_outputs_via_runner() {
        let recorder = Recorder::new(vec![
            (
                "stack output --json --show-secrets",
                ExecResult::ok(r#"{"name": "bold-owl", "key": "k"}"#),
            ),
            (
                "stack output --json",
                ExecResult::ok(r#"{"name": "bold-owl", "key": "[secret]"}"#),
            ),
        ]);
        let pulumi = Pulumi::new(&recorder, "/work", "dev");

        let outputs = pulumi.stack_outputs().unwrap();
        assert_eq!(outputs.get("name").unwrap().value, json!("bold-owl"));
        assert!(outputs.get("key").unwrap().secret);
    }

    #[test]
    fn test_project_name_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join("Pulumi.yaml"),
            "name: pet-project\nruntime: nodejs\n",
        )
        .unwrap();
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, temp_dir.path(), "dev");

        assert_eq!(pulumi.project_name().unwrap(), "pet-project");
    }

    #[test]
    fn test_project_name_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(vec![]);
        let pulumi = Pulumi::new(&recorder, temp_dir.path(), "dev");

        assert!(matches!(
            pulumi.project_name(),
            Err(PulumiError::ProjectNotFound(_))
        ));
    }
}
