//! Action Runner
//!
//! Orchestrates one stack operation from login to published results.
//!
//! # Flow
//!
//! 1. Log into the backend and select (or create) the stack
//! 2. Apply the config map and restore the plugin cache
//! 3. Optionally refresh, then run the requested command
//! 4. Publish step outputs, PR comment and job summary
//! 5. Remove the stack after a destroy when asked, save the plugin cache

use std::io::Write;
use std::path::PathBuf;

use log::{debug, info, warn};
use thiserror::Error;

use super::exec::CommandRunner;
use super::inputs::{ActionConfig, Command};
use super::pulumi::{Pulumi, PulumiError};
use crate::environment::plugin_cache::{self, LocalCache};
use crate::github::pr::{handle_pull_request_message, CommentRequest};
use crate::github::{summary, GithubEnv, GithubError, PullRequestApi, WorkflowCommands};
use crate::program::StackOutputs;

/// Errors that fail the action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Pulumi(#[from] PulumiError),

    #[error(transparent)]
    Github(#[from] GithubError),

    #[error("Failed to write workflow command: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub project: String,
    pub work_dir: PathBuf,
    pub output: String,
    pub outputs: StackOutputs,
}

/// Runs configured stack operations.
pub struct ActionRunner<'a, W: Write> {
    config: &'a ActionConfig,
    github: &'a GithubEnv,
    runner: &'a dyn CommandRunner,
    commands: WorkflowCommands<W>,
    pr_api: Option<&'a dyn PullRequestApi>,
    cache: Option<LocalCache>,
}

impl<'a, W: Write> ActionRunner<'a, W> {
    pub fn new(
        config: &'a ActionConfig,
        github: &'a GithubEnv,
        runner: &'a dyn CommandRunner,
        commands: WorkflowCommands<W>,
    ) -> Self {
        Self {
            config,
            github,
            runner,
            commands,
            pr_api: None,
            cache: None,
        }
    }

    /// Sets the API used for PR comments.
    pub fn set_pr_api(&mut self, api: &'a dyn PullRequestApi) {
        self.pr_api = Some(api);
    }

    /// Overrides the plugin cache store.
    pub fn set_cache(&mut self, cache: LocalCache) {
        self.cache = Some(cache);
    }

    /// Returns the workflow command writer.
    pub fn into_commands(self) -> WorkflowCommands<W> {
        self.commands
    }

    /// Executes the configured operation.
    pub fn run(&mut self) -> Result<RunReport, ActionError> {
        let config = self.config;

        let work_dir = self.github.resolve(&config.work_dir);
        debug!("Working directory resolved at {}", work_dir.display());

        let pulumi = Pulumi::new(self.runner, work_dir.clone(), config.stack_name.as_str());

        if !pulumi.is_available() {
            warn!("Pulumi CLI did not answer 'pulumi version'; commands will likely fail");
        }

        pulumi.login(config.cloud_url.as_deref())?;
        pulumi.select_stack(config.upsert, config.secrets_provider.as_deref())?;
        let project = pulumi.project_name()?;
        info!("Project {} / stack {}", project, config.stack_name);

        if let Some(config_map) = &config.config_map {
            for entry in config_map.values().filter(|e| e.secret) {
                self.commands.set_secret(&entry.value)?;
            }
            pulumi.set_all_config(config_map)?;
        }

        let cache = self
            .cache
            .clone()
            .unwrap_or_else(|| LocalCache::from_settings(&config.plugin_cache));
        let cache_key = plugin_cache::cache_key(
            &config.stack_name,
            &work_dir.to_string_lossy(),
            &config.pulumi_version,
        );
        let restored = plugin_cache::restore_plugins_cache(&config.plugin_cache, &cache, &cache_key);

        if config.refresh && config.command != Command::Refresh {
            self.commands
                .start_group(&format!("Refresh stack on {}", config.stack_name))?;
            let refreshed = pulumi.refresh(&config.options);
            self.commands.end_group()?;
            refreshed?;
        }

        self.commands
            .start_group(&format!("pulumi {} on {}", config.command, config.stack_name))?;
        let result = self.run_command(&pulumi, &project);
        self.commands.end_group()?;
        let (output, outputs) = result?;

        if config.remove && config.command == Command::Destroy {
            pulumi.remove_stack()?;
        }

        plugin_cache::save_plugins_cache(
            &config.plugin_cache,
            &cache,
            &cache_key,
            restored.as_deref(),
        );

        Ok(RunReport {
            project,
            work_dir,
            output,
            outputs,
        })
    }

    fn run_command(
        &mut self,
        pulumi: &Pulumi<'_>,
        project: &str,
    ) -> Result<(String, StackOutputs), ActionError> {
        let config = self.config;

        debug!("Running action {}", config.command);
        let output = pulumi.run_operation(config.command, &config.options)?;
        debug!("Done running action {}", config.command);

        self.commands.set_output("output", &output)?;

        let outputs = pulumi.stack_outputs()?;
        for (key, value) in outputs.iter() {
            let rendered = match &value.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if value.secret {
                self.commands.set_secret(&rendered)?;
            }
            self.commands.set_output(key, &rendered)?;
        }

        if config.comment_on_pr {
            self.comment_on_pr(project, &output)?;
        }

        if config.comment_on_summary {
            summary::handle_summary_message(
                self.github.summary_file.as_deref(),
                project,
                &config.stack_name,
                &output,
                config.always_include_summary,
            )?;
        }

        Ok((output, outputs))
    }

    fn comment_on_pr(&mut self, project: &str, output: &str) -> Result<(), ActionError> {
        let config = self.config;
        let event_pr_number = self.github.pull_request_number();

        if config.comment_on_pr_number.is_none() && event_pr_number.is_none() {
            self.commands
                .warning("comment-on-pr is set but this is not a pull request run, skipping")?;
            return Ok(());
        }

        let api = self.pr_api.ok_or(GithubError::MissingToken)?;
        let request = CommentRequest {
            command: config.command,
            project,
            stack: &config.stack_name,
            output,
            pr_number: config.comment_on_pr_number,
            event_pr_number,
            edit: config.edit_pr_comment,
            comment_id: &config.comment_id,
            always_include_summary: config.always_include_summary,
        };
        handle_pull_request_message(api, &request)?;
        Ok(())
    }
}
