// ABOUTME: Terminal seam for fire-and-forget command injection.
// ABOUTME: ShellTerminal pipes lines into a spawned shell; no exit feedback exists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// A terminal the orchestrator can write command lines into.
///
/// This is the best-effort execution surface: writes either land or fail,
/// and nothing reports whether the commands themselves succeeded. The
/// process-mode runner is the path that observes exit codes.
#[async_trait]
pub trait TerminalSink: Send {
    fn name(&self) -> &str;

    /// Whether the underlying terminal still accepts input.
    fn is_alive(&mut self) -> bool;

    /// Write one command line. The line is executed as soon as the shell
    /// reads it; there is no completion signal.
    async fn send_line(&mut self, line: &str) -> Result<()>;
}

/// Creates terminals on demand. Host editors implement this against their
/// own terminal panes; the default spawns a shell subprocess.
pub trait TerminalLauncher: Send + Sync {
    fn launch(&self, name: &str) -> Result<Box<dyn TerminalSink>>;
}

/// A shell subprocess with piped stdin.
pub struct ShellTerminal {
    name: String,
    child: Child,
    stdin: ChildStdin,
}

#[async_trait]
impl TerminalSink for ShellTerminal {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("terminal write failed")?;
        self.stdin
            .write_all(b"\n")
            .await
            .context("terminal write failed")?;
        self.stdin.flush().await.context("terminal flush failed")?;
        Ok(())
    }
}

/// Launches [`ShellTerminal`]s running the configured shell.
pub struct ShellLauncher {
    shell: String,
}

impl ShellLauncher {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl TerminalLauncher for ShellLauncher {
    fn launch(&self, name: &str) -> Result<Box<dyn TerminalSink>> {
        let mut child = Command::new(&self.shell)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn shell `{}`", self.shell))?;
        let stdin = child
            .stdin
            .take()
            .context("shell stdin was not captured")?;

        tracing::info!(shell = %self.shell, name = %name, "terminal created");
        Ok(Box::new(ShellTerminal {
            name: name.to_string(),
            child,
            stdin,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
