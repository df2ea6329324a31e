//! External process execution.
//!
//! Every installer and git invocation goes through [`CommandRunner`] so the
//! pipeline can be driven by a fake in tests. Calls block until the child
//! exits; there is no timeout.

use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when the child was killed by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("command line is empty")]
    EmptyCommand,

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {}: {stderr}", describe_status(.exit_code))]
    Failed {
        command: String,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },
}

fn describe_status(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Capability to run an external program.
pub trait CommandRunner {
    /// Run `argv[0]` with the remaining arguments inside `cwd`.
    fn run(
        &self,
        argv: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, RunnerError>;

    /// Run and turn a non-zero exit status into [`RunnerError::Failed`].
    fn run_checked(
        &self,
        argv: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, RunnerError> {
        let output = self.run(argv, cwd, env)?;
        if output.success() {
            Ok(output)
        } else {
            Err(RunnerError::Failed {
                command: argv.join(" "),
                stdout: output.stdout_lossy().trim().to_string(),
                stderr: output.stderr_lossy().trim().to_string(),
                exit_code: output.status,
            })
        }
    }
}

/// Runs commands on the host with [`std::process::Command`].
///
/// Child output is always captured. In verbose mode it is echoed to stderr
/// once the child exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        argv: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, RunnerError> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        tracing::debug!(command = %argv.join(" "), cwd = %cwd.display(), "spawning");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| RunnerError::Spawn {
                program: (*program).to_string(),
                source,
            })?;

        let output = CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        };

        if self.verbose {
            eprint!("{}", output.stdout_lossy());
            eprint!("{}", output.stderr_lossy());
        }
        tracing::debug!(command = %program, status = ?output.status, "finished");

        Ok(output)
    }
}
