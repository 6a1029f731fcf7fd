/// Child-process client for the conversational CLI assistant.
///
/// One invocation is one child process: the prompt goes in on stdin, stdout and stderr are
/// collected as text once the child exits. The only bound on a run is its timeout; a timed-out
/// child is killed and nothing it printed is kept. There are no retries.
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Flags that make the assistant run unattended: no prompts, every tool pre-approved.
pub const UNATTENDED_FLAGS: [&str; 2] = ["--no-interactive", "--trust-all-tools"];

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    /// Executable to spawn, e.g. "q".
    pub program: String,
    /// Arguments placed before the persona flags, e.g. `["chat"]`.
    pub args: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            program: "q".to_string(),
            args: vec!["chat".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("failed to spawn assistant `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("assistant i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("assistant timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{stderr}")]
    Process { stderr: String },
}

/// Outcome of one finished assistant run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    /// Applies the stderr policy: with `stderr_fatal`, any stderr output fails the run
    /// regardless of exit status.
    pub fn checked(self, stderr_fatal: bool) -> Result<Self, AssistantError> {
        if self.stderr.is_empty() {
            return Ok(self);
        }
        if stderr_fatal {
            return Err(AssistantError::Process {
                stderr: self.stderr,
            });
        }
        warn!(stderr = %self.stderr, "assistant wrote to stderr, continuing");
        Ok(self)
    }
}

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Run the assistant once with `prompt` on stdin.
    ///
    /// `persona` selects a named agent and switches on the unattended flags; `None` runs the
    /// bare chat command.
    async fn invoke(
        &self,
        prompt: &str,
        persona: Option<&str>,
        timeout: Duration,
    ) -> Result<Invocation, AssistantError>;
}

#[derive(Clone, Debug)]
pub struct CliAssistant {
    config: AssistantConfig,
}

impl CliAssistant {
    pub fn new(config: AssistantConfig) -> Self {
        Self { config }
    }

    fn command(&self, persona: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if let Some(persona) = persona {
            cmd.arg("--agent").arg(persona).args(UNATTENDED_FLAGS);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Assistant for CliAssistant {
    async fn invoke(
        &self,
        prompt: &str,
        persona: Option<&str>,
        timeout: Duration,
    ) -> Result<Invocation, AssistantError> {
        let mut child = self
            .command(persona)
            .spawn()
            .map_err(|source| AssistantError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        // Feed stdin from its own task so a chatty child can't deadlock on a full stdout pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let mut input = prompt.as_bytes().to_vec();
            input.push(b'\n');
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "assistant closed stdin early");
                }
            });
        }

        // Dropping the future on timeout drops the child, and kill_on_drop reaps it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(AssistantError::Timeout(timeout)),
        };

        let invocation = Invocation {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            persona = persona.unwrap_or("-"),
            exit_code = ?invocation.exit_code,
            stdout_len = invocation.stdout.len(),
            stderr_len = invocation.stderr.len(),
            "assistant finished"
        );
        Ok(invocation)
    }
}
