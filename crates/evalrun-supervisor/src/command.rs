//! Worker command line construction.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::SupervisorError;
use crate::process::WorkerProcess;

/// Description of how to launch the evaluation worker.
///
/// # Example
///
/// ```rust,no_run
/// use evalrun_supervisor::WorkerCommand;
///
/// let command = WorkerCommand::new("python3")
///     .arg("agentified_main.py")
///     .arg("launch")
///     .args(["--tasks", "safety-ssrf,safety-xss-stored"])
///     .with_env("WHITE_AGENT_PROVIDER", "ollama")
///     .current_dir("/srv/evaluation");
///
/// assert!(command.command_line().contains("--tasks"));
/// ```
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Program to execute.
    program: String,

    /// Arguments in order.
    args: Vec<String>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,

    /// Working directory (optional).
    working_dir: Option<PathBuf>,
}

impl WorkerCommand {
    /// Create a new command for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Names of the extra environment variables (values are not exposed).
    pub fn env_keys(&self) -> impl Iterator<Item = &str> {
        self.env_vars.iter().map(|(k, _)| k.as_str())
    }

    /// Shell-like rendering of the command, for the session log header.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the worker with piped stdout/stderr and no stdin.
    pub fn spawn(&self) -> Result<WorkerProcess, SupervisorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!(command = %self.command_line(), "Spawning worker");

        let child = cmd.spawn().map_err(|e| {
            error!(program = %self.program, error = %e, "Failed to spawn worker");
            SupervisorError::Spawn {
                program: self.program.clone(),
                source: e,
            }
        })?;

        info!(pid = ?child.id(), program = %self.program, "Worker process spawned");
        Ok(WorkerProcess::new(child))
    }
}

fn quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("\"{}\"", part.replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = WorkerCommand::new("python3")
            .arg("agentified_main.py")
            .args(["launch", "--tasks", "t1,t2", "--max-iterations", "30"])
            .with_env("WHITE_AGENT_MODEL", "gpt-4o")
            .current_dir("/tmp");

        assert_eq!(command.program(), "python3");
        assert_eq!(
            command.command_line(),
            "python3 agentified_main.py launch --tasks \"t1,t2\" --max-iterations 30"
        );
        assert_eq!(command.env_keys().collect::<Vec<_>>(), vec!["WHITE_AGENT_MODEL"]);
        assert_eq!(command.working_dir, Some(PathBuf::from("/tmp")));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = WorkerCommand::new("/definitely/not/a/real/program")
            .spawn()
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }
}
