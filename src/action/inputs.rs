//! Action Inputs
//!
//! Reads and validates the step inputs. The CI runtime hands each
//! input to the process as `INPUT_<NAME>` (upper-cased, spaces replaced
//! by underscores), always as a string.
//!
//! An empty `command` selects install-only mode: the CLI is installed
//! and nothing else runs.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version range used when none is given.
pub const DEFAULT_VERSION_RANGE: &str = "^3";

/// Plugins directory cached between runs by default.
pub const DEFAULT_PLUGINS_PATH: &str = "~/.pulumi/plugins";

/// Comment id used to find an earlier PR comment when none is given.
pub const DEFAULT_COMMENT_ID: &str = "default";

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input required and not supplied: {0}")]
    Required(String),

    #[error("Input '{name}' does not meet YAML 1.2 \"Core Schema\" specification: {value}\nSupport boolean input list: `true | True | TRUE | false | False | FALSE`")]
    InvalidBoolean { name: String, value: String },

    #[error("Input '{name}' is not a valid number: {value}")]
    InvalidNumber { name: String, value: String },

    #[error("Input '{name}' must be one of [{allowed}], got '{value}'")]
    InvalidChoice {
        name: String,
        value: String,
        allowed: String,
    },

    #[error("Only one of 'pulumi-version' or 'pulumi-version-file' should be provided, got both")]
    ConflictingVersion,

    #[error("pulumi-version-file '{0}' does not exist")]
    VersionFileMissing(String),

    #[error("Failed to read pulumi-version-file '{path}': {source}")]
    VersionFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input 'config-map' is not valid YAML: {0}")]
    InvalidConfigMap(#[from] serde_yaml::Error),
}

/// Where input values come from.
pub trait InputSource {
    /// Raw value for an input name, if set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads `INPUT_*` variables from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvInputs;

impl EnvInputs {
    /// Environment variable name for an input.
    pub fn var_name(name: &str) -> String {
        format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
    }
}

impl InputSource for EnvInputs {
    fn get(&self, name: &str) -> Option<String> {
        env::var(Self::var_name(name)).ok()
    }
}

impl InputSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Typed accessors over an [`InputSource`].
pub struct Inputs<'a> {
    source: &'a dyn InputSource,
}

impl<'a> Inputs<'a> {
    pub fn new(source: &'a dyn InputSource) -> Self {
        Self { source }
    }

    /// Trimmed value, empty when unset.
    pub fn input(&self, name: &str) -> String {
        self.source
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    /// Trimmed value, `None` when unset or empty.
    pub fn optional(&self, name: &str) -> Option<String> {
        Some(self.input(name)).filter(|v| !v.is_empty())
    }

    /// Trimmed value, error when unset or empty.
    pub fn required(&self, name: &str) -> Result<String, InputError> {
        self.optional(name)
            .ok_or_else(|| InputError::Required(name.to_string()))
    }

    /// YAML 1.2 core boolean. Empty is `false`.
    pub fn boolean(&self, name: &str) -> Result<bool, InputError> {
        let value = self.input(name);
        match value.as_str() {
            "" => Ok(false),
            "true" | "True" | "TRUE" => Ok(true),
            "false" | "False" | "FALSE" => Ok(false),
            _ => Err(InputError::InvalidBoolean {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Parsed number, `None` when empty.
    pub fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, InputError> {
        let Some(value) = self.optional(name) else {
            return Ok(None);
        };
        value
            .parse::<T>()
            .map(Some)
            .map_err(|_| InputError::InvalidNumber {
                name: name.to_string(),
                value,
            })
    }

    /// Non-empty trimmed lines.
    pub fn multiline(&self, name: &str) -> Vec<String> {
        self.input(name)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Lines further split on `;`.
    pub fn semicolon_list(&self, name: &str) -> Vec<String> {
        split_semicolons(&self.multiline(name))
    }

    /// Value parsed into one of a closed set of choices.
    pub fn choice<T: Choice>(&self, name: &str) -> Result<Option<T>, InputError> {
        let Some(value) = self.optional(name) else {
            return Ok(None);
        };
        T::from_choice(&value).map(Some).ok_or_else(|| InputError::InvalidChoice {
            name: name.to_string(),
            value,
            allowed: T::CHOICES.join(", "),
        })
    }
}

/// Splits each entry on `;`, trimming and dropping empty parts.
pub fn split_semicolons(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| line.split(';'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A closed set of string values.
pub trait Choice: Sized {
    const CHOICES: &'static [&'static str];
    fn from_choice(value: &str) -> Option<Self>;
}

/// Stack operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Up,
    Update,
    Refresh,
    Destroy,
    Preview,
    Output,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Update => "update",
            Self::Refresh => "refresh",
            Self::Destroy => "destroy",
            Self::Preview => "preview",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Choice for Command {
    const CHOICES: &'static [&'static str] =
        &["up", "update", "refresh", "destroy", "preview", "output"];

    fn from_choice(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "update" => Some(Self::Update),
            "refresh" => Some(Self::Refresh),
            "destroy" => Some(Self::Destroy),
            "preview" => Some(Self::Preview),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

/// Terminal color mode passed to the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Always,
    Never,
    Raw,
    Auto,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Raw => "raw",
            Self::Auto => "auto",
        }
    }
}

impl Choice for Color {
    const CHOICES: &'static [&'static str] = &["always", "never", "raw", "auto"];

    fn from_choice(value: &str) -> Option<Self> {
        match value {
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            "raw" => Some(Self::Raw),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// One entry of the `config-map` input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

/// Stack configuration to apply before the operation.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Flags forwarded to the stack operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    pub parallel: Option<u32>,
    pub message: Option<String>,
    pub expect_no_changes: bool,
    pub diff: bool,
    pub replace: Vec<String>,
    pub target: Vec<String>,
    pub target_dependents: bool,
    pub policy_packs: Vec<String>,
    pub policy_pack_configs: Vec<String>,
    pub color: Option<Color>,
    pub exclude_protected: bool,
    pub plan: Option<String>,
    pub suppress_outputs: bool,
    pub suppress_progress: bool,
}

/// Plugin cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCacheSettings {
    pub enabled: bool,
    pub plugins_path: String,
    /// Directory holding cache entries; platform default when unset
    pub cache_dir: Option<String>,
}

/// Inputs for install-only mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationConfig {
    pub pulumi_version: String,
}

/// Inputs for a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfig {
    pub command: Command,
    pub stack_name: String,
    pub pulumi_version: String,
    pub work_dir: String,
    pub secrets_provider: Option<String>,
    pub cloud_url: Option<String>,
    pub github_token: Option<String>,
    pub comment_on_pr: bool,
    pub comment_on_pr_number: Option<u64>,
    pub comment_on_summary: bool,
    pub upsert: bool,
    pub remove: bool,
    pub config_map: Option<ConfigMap>,
    pub edit_pr_comment: bool,
    pub comment_id: String,
    pub always_include_summary: bool,
    pub refresh: bool,
    pub plugin_cache: PluginCacheSettings,
    pub options: OperationOptions,
}

/// What the action was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Install(InstallationConfig),
    Run(Box<ActionConfig>),
}

impl Mode {
    /// Version range to install in either mode.
    pub fn pulumi_version(&self) -> &str {
        match self {
            Self::Install(c) => &c.pulumi_version,
            Self::Run(c) => &c.pulumi_version,
        }
    }
}

/// Loads and validates all inputs.
pub fn load(source: &dyn InputSource) -> Result<Mode, InputError> {
    let inputs = Inputs::new(source);
    let pulumi_version = resolve_version_input(&inputs)?;

    let Some(command) = inputs.choice::<Command>("command")? else {
        debug!("No command given, running in install-only mode");
        return Ok(Mode::Install(InstallationConfig { pulumi_version }));
    };

    let work_dir = inputs
        .optional("working-directory")
        .or_else(|| inputs.optional("work-dir"))
        .unwrap_or_else(|| "./".to_string());

    let config_map = match inputs.optional("config-map") {
        Some(raw) => Some(serde_yaml::from_str::<ConfigMap>(&raw)?),
        None => None,
    };

    let options = OperationOptions {
        parallel: inputs.number("parallel")?,
        message: inputs.optional("message"),
        expect_no_changes: inputs.boolean("expect-no-changes")?,
        diff: inputs.boolean("diff")?,
        replace: inputs.semicolon_list("replace"),
        target: inputs.semicolon_list("target"),
        target_dependents: inputs.boolean("target-dependents")?,
        policy_packs: inputs.semicolon_list("policyPacks"),
        policy_pack_configs: inputs.semicolon_list("policyPackConfigs"),
        color: inputs.choice("color")?,
        exclude_protected: inputs.boolean("exclude-protected")?,
        plan: inputs.optional("plan"),
        suppress_outputs: inputs.boolean("suppress-outputs")?,
        suppress_progress: inputs.boolean("suppress-progress")?,
    };

    let config = ActionConfig {
        command,
        stack_name: inputs.required("stack-name")?,
        pulumi_version,
        work_dir,
        secrets_provider: inputs.optional("secrets-provider"),
        cloud_url: inputs.optional("cloud-url"),
        github_token: inputs.optional("github-token"),
        comment_on_pr: inputs.boolean("comment-on-pr")?,
        comment_on_pr_number: inputs.number("comment-on-pr-number")?,
        comment_on_summary: inputs.boolean("comment-on-summary")?,
        upsert: inputs.boolean("upsert")?,
        remove: inputs.boolean("remove")?,
        config_map,
        edit_pr_comment: inputs.boolean("edit-pr-comment")?,
        comment_id: inputs
            .optional("comment-on-pr-id")
            .unwrap_or_else(|| DEFAULT_COMMENT_ID.to_string()),
        always_include_summary: inputs.boolean("always-include-summary")?,
        refresh: inputs.boolean("refresh")?,
        plugin_cache: PluginCacheSettings {
            enabled: inputs.boolean("cache-plugins")?,
            plugins_path: inputs
                .optional("plugins-path")
                .unwrap_or_else(|| DEFAULT_PLUGINS_PATH.to_string()),
            cache_dir: inputs.optional("plugins-cache-dir"),
        },
        options,
    };

    debug!(
        "Loaded configuration: command={}, stack={}",
        config.command, config.stack_name
    );
    Ok(Mode::Run(Box::new(config)))
}

/// Resolves `pulumi-version` / `pulumi-version-file` into a range.
fn resolve_version_input(inputs: &Inputs<'_>) -> Result<String, InputError> {
    let version = inputs.optional("pulumi-version");
    let version_file = inputs.optional("pulumi-version-file");

    match (version, version_file) {
        (Some(_), Some(_)) => Err(InputError::ConflictingVersion),
        (Some(version), None) => Ok(version),
        (None, Some(file)) => {
            if !Path::new(&file).exists() {
                return Err(InputError::VersionFileMissing(file));
            }
            let content = fs::read_to_string(&file).map_err(|source| {
                InputError::VersionFileRead {
                    path: file.clone(),
                    source,
                }
            })?;
            Ok(content.trim().to_string())
        }
        (None, None) => Ok(DEFAULT_VERSION_RANGE.to_string()),
    }
}
