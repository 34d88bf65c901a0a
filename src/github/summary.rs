//! Job Summary
//!
//! Renders the operation output as a Markdown/HTML block for the job
//! summary page. The page does not render ANSI colors and caps its size
//! at 1 MiB, so output is cleaned and trimmed first.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use super::GithubError;

/// Summary size cap, below the 1 MiB hard limit to leave room for markup.
pub const MAX_SUMMARY_SIZE_BYTES: usize = 1_000_000;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI pattern")
});

static LEADING_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ ").expect("valid leading-space pattern"));

/// Removes ANSI escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Trims `message` to at most `max_bytes`, keeping the tail when
/// `keep_end` is set and the head otherwise. Cuts land on char
/// boundaries, so the result may be a few bytes shorter than the cap.
///
/// Returns the trimmed text and whether anything was removed.
pub fn trim_output(message: &str, max_bytes: usize, keep_end: bool) -> (&str, bool) {
    if message.len() <= max_bytes {
        return (message, false);
    }

    if keep_end {
        let mut start = message.len() - max_bytes;
        while !message.is_char_boundary(start) {
            start += 1;
        }
        (&message[start..], true)
    } else {
        let mut end = max_bytes;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        (&message[..end], true)
    }
}

/// Builds the summary block for one run.
pub fn format_summary(
    project: &str,
    stack: &str,
    output: &str,
    always_include_summary: bool,
) -> String {
    let cleaned = strip_ansi(output);
    let cleaned = LEADING_SPACE.replace_all(&cleaned, "&nbsp;");

    let (message, trimmed) = trim_output(&cleaned, MAX_SUMMARY_SIZE_BYTES, always_include_summary);

    let mut heading = format!("Pulumi {}/{} results", project, stack);
    if trimmed && always_include_summary {
        heading.push_str(" :warning: **Warn**: The output was too long and trimmed from the front.");
    } else if trimmed {
        heading.push_str(" :warning: **Warn**: The output was too long and trimmed.");
    }

    format!(
        "<h1>{}</h1>\n<pre lang=\"diff\"><code>{}</code></pre>\n",
        heading, message
    )
}

/// Appends to the summary file, which must already exist.
pub fn write_summary(summary_file: Option<&Path>, content: &str) -> Result<(), GithubError> {
    let path = summary_file.ok_or(GithubError::MissingSummaryFile)?;
    if !path.exists() {
        return Err(GithubError::SummaryFileNotFound(path.to_path_buf()));
    }

    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Formats and writes the summary in one step.
pub fn handle_summary_message(
    summary_file: Option<&Path>,
    project: &str,
    stack: &str,
    output: &str,
    always_include_summary: bool,
) -> Result<(), GithubError> {
    let summary = format_summary(project, stack, output, always_include_summary);
    write_summary(summary_file, &summary)?;
    info!("Job summary written for {}/{}", project, stack);
    Ok(())
}
