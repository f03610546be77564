// src/tool.rs

//! Spawning of external command-line tools.
//!
//! Every invocation goes through [`ToolInvoker::run`], which captures stdout
//! and stderr and decides from the stderr text whether the call failed.
//! This is the only place that string-matches on tool output.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// How text on the tool's error channel is interpreted
#[derive(Debug, Clone, Copy)]
pub enum ErrorPolicy<'a> {
    /// Any error output fails the call
    Strict,
    /// Error output containing one of these substrings is a no-op
    AllowList(&'a [String]),
}

impl ErrorPolicy<'_> {
    /// Returns the first benign pattern matching `stderr`, if the output is
    /// acceptable under this policy.
    fn accepts<'s>(&'s self, stderr: &str) -> Option<&'s str> {
        match self {
            ErrorPolicy::Strict => None,
            ErrorPolicy::AllowList(patterns) => patterns
                .iter()
                .find(|p| stderr.contains(p.as_str()))
                .map(String::as_str),
        }
    }
}

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    /// Error output that was classified as benign, if any
    pub ignored_stderr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolInvoker {
    name: String,
    program: PathBuf,
    envs: Vec<(String, String)>,
}

impl ToolInvoker {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), program: program.into(), envs: Vec::new() }
    }

    /// Sets `key` for every invocation unless the parent environment already has it
    pub fn env_default(mut self, key: &str, value: &str) -> Self {
        if std::env::var_os(key).is_none() {
            self.envs.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn run<I, S>(&self, args: I, cwd: Option<&Path>, policy: ErrorPolicy<'_>) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let command_line = self.describe(&args);
        debug!("Running {}", command_line);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|source| Error::Spawn { tool: self.name.clone(), source })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stderr.is_empty() {
            if !output.status.success() {
                return Err(Error::Tool {
                    tool: self.name.clone(),
                    command: command_line,
                    stderr: format!("exited with {}", output.status),
                });
            }
            return Ok(ToolOutput { stdout, ignored_stderr: None });
        }

        match policy.accepts(&stderr) {
            Some(pattern) => {
                warn!("{} reported a benign error (matched {:?}): {}", self.name, pattern, stderr);
                Ok(ToolOutput { stdout, ignored_stderr: Some(stderr) })
            }
            None => Err(Error::Tool { tool: self.name.clone(), command: command_line, stderr }),
        }
    }

    fn describe(&self, args: &[OsString]) -> String {
        let mut line = self.program.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> ToolInvoker {
        ToolInvoker::new("sh", "sh")
    }

    #[test]
    fn test_clean_run_returns_stdout() {
        let out = sh().run(["-c", "echo hello"], None, ErrorPolicy::Strict).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert!(out.ignored_stderr.is_none());
    }

    #[test]
    fn test_strict_policy_fails_on_stderr() {
        let err = sh().run(["-c", "echo boom >&2"], None, ErrorPolicy::Strict).unwrap_err();
        match err {
            Error::Tool { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_allow_list_swallows_benign_error() {
        let patterns = vec!["No element named".to_string()];
        let out = sh()
            .run(["-c", "echo 'No element named /./x' >&2; exit 1"], None, ErrorPolicy::AllowList(&patterns))
            .unwrap();
        assert_eq!(out.ignored_stderr.as_deref(), Some("No element named /./x"));
    }

    #[test]
    fn test_allow_list_rejects_unknown_error() {
        let patterns = vec!["is defunct".to_string()];
        let result = sh().run(["-c", "echo 'Not authenticated' >&2"], None, ErrorPolicy::AllowList(&patterns));
        assert!(matches!(result, Err(Error::Tool { .. })));
    }

    #[test]
    fn test_silent_failure_is_an_error() {
        let patterns = vec!["anything".to_string()];
        assert!(sh().run(["-c", "exit 3"], None, ErrorPolicy::AllowList(&patterns)).is_err());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let tool = ToolInvoker::new("nope", "/definitely/not/here");
        let result = tool.run(["x"], None, ErrorPolicy::Strict);
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }
}
