//! Workflow Commands
//!
//! The CI runner reads specially formatted lines from stdout
//! (`::add-mask::`, `::group::`, ...) and key files named by
//! environment variables (`GITHUB_OUTPUT`, `GITHUB_PATH`).

use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Writes workflow commands and updates the runner's key files.
pub struct WorkflowCommands<W: Write> {
    out: W,
    output_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
}

impl WorkflowCommands<io::Stdout> {
    /// Commands on stdout, key files taken from the environment.
    pub fn from_env() -> Self {
        Self::new(
            io::stdout(),
            env::var_os("GITHUB_OUTPUT").map(PathBuf::from),
            env::var_os("GITHUB_PATH").map(PathBuf::from),
        )
    }
}

impl<W: Write> WorkflowCommands<W> {
    pub fn new(out: W, output_file: Option<PathBuf>, path_file: Option<PathBuf>) -> Self {
        Self {
            out,
            output_file,
            path_file,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn issue(&mut self, command: &str, properties: &str, message: &str) -> io::Result<()> {
        if properties.is_empty() {
            writeln!(self.out, "::{}::{}", command, escape_data(message))
        } else {
            writeln!(self.out, "::{} {}::{}", command, properties, escape_data(message))
        }
    }

    /// Sets a step output.
    pub fn set_output(&mut self, name: &str, value: &str) -> io::Result<()> {
        match &self.output_file {
            Some(path) => {
                let entry = heredoc_entry(name, value, &random_delimiter())?;
                append(path, &entry)
            }
            None => self.issue("set-output", &format!("name={}", escape_property(name)), value),
        }
    }

    /// Masks a value in all later log output.
    pub fn set_secret(&mut self, value: &str) -> io::Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.issue("add-mask", "", value)
    }

    /// Opens a collapsible log group.
    pub fn start_group(&mut self, name: &str) -> io::Result<()> {
        self.issue("group", "", name)
    }

    /// Closes the current log group.
    pub fn end_group(&mut self) -> io::Result<()> {
        self.issue("endgroup", "", "")
    }

    pub fn warning(&mut self, message: &str) -> io::Result<()> {
        self.issue("warning", "", message)
    }

    /// Marks the step as failed with a message.
    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.issue("error", "", message)
    }

    /// Prepends a directory to PATH for this process and later steps.
    pub fn add_path(&mut self, dir: &Path) -> io::Result<()> {
        if let Some(path_file) = &self.path_file {
            append(path_file, &format!("{}\n", dir.display()))?;
        }

        let current = env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![dir.to_path_buf()];
        paths.extend(env::split_paths(&current));
        let joined = env::join_paths(paths).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        env::set_var("PATH", joined);
        debug!("Added {} to PATH", dir.display());
        Ok(())
    }
}

/// Escapes a command message.
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escapes a command property value.
pub fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// Formats a `name<<DELIM` block for a key file.
fn heredoc_entry(name: &str, value: &str, delimiter: &str) -> io::Result<String> {
    if name.contains(delimiter) || value.contains(delimiter) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Unexpected input: value should not contain the delimiter \"{}\"", delimiter),
        ));
    }
    Ok(format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter))
}

fn random_delimiter() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("ghadelimiter_{}", suffix)
}

fn append(path: &Path, content: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn commands() -> WorkflowCommands<Vec<u8>> {
        WorkflowCommands::new(Vec::new(), None, None)
    }

    fn written(cmds: WorkflowCommands<Vec<u8>>) -> String {
        String::from_utf8(cmds.into_inner()).unwrap()
    }

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("a%b\r\nc"), "a%25b%0D%0Ac");
    }

    #[test]
    fn test_escape_property() {
        assert_eq!(escape_property("a:b,c"), "a%3Ab%2Cc");
    }

    #[test]
    fn test_mask_and_groups() {
        let mut cmds = commands();
        cmds.set_secret("hunter2").unwrap();
        cmds.set_secret("").unwrap();
        cmds.start_group("pulumi up on dev").unwrap();
        cmds.end_group().unwrap();

        assert_eq!(
            written(cmds),
            "::add-mask::hunter2\n::group::pulumi up on dev\n::endgroup::\n"
        );
    }

    #[test]
    fn test_error_is_escaped() {
        let mut cmds = commands();
        cmds.error("line1\nline2").unwrap();
        assert_eq!(written(cmds), "::error::line1%0Aline2\n");
    }

    #[test]
    fn test_set_output_legacy_command() {
        let mut cmds = commands();
        cmds.set_output("petName", "calm-yak").unwrap();
        assert_eq!(written(cmds), "::set-output name=petName::calm-yak\n");
    }

    #[test]
    fn test_set_output_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_file = temp_dir.path().join("output");

        let mut cmds = WorkflowCommands::new(Vec::new(), Some(output_file.clone()), None);
        cmds.set_output("output", "line1\nline2").unwrap();
        cmds.set_output("name", "bold-owl").unwrap();

        let content = fs::read_to_string(&output_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("output<<ghadelimiter_"));
        assert_eq!(lines[1], "line1");
        assert_eq!(lines[2], "line2");
        assert!(lines[3].starts_with("ghadelimiter_"));
        assert!(lines[4].starts_with("name<<ghadelimiter_"));
        assert_eq!(lines[5], "bold-owl");
        assert!(written(cmds).is_empty());
    }

    #[test]
    fn test_heredoc_rejects_delimiter_in_value() {
        assert!(heredoc_entry("k", "x DELIM y", "DELIM").is_err());
        assert_eq!(heredoc_entry("k", "v", "D").unwrap(), "k<<D\nv\nD\n");
    }

    #[test]
    fn test_add_path_writes_path_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path_file = temp_dir.path().join("path");
        let bin = temp_dir.path().join("bin");

        let mut cmds = WorkflowCommands::new(Vec::new(), None, Some(path_file.clone()));
        cmds.add_path(&bin).unwrap();

        let content = fs::read_to_string(&path_file).unwrap();
        assert_eq!(content, format!("{}\n", bin.display()));
        let path_var = env::var_os("PATH").unwrap();
        assert!(env::split_paths(&path_var).any(|p| p == bin));
    }
}
