use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_util::codec::{BytesCodec, FramedRead};

use super::CommandExecutor;
use crate::log::*;

/// Host utilities every run depends on. Checked before anything touches a
/// workload.
pub const REQUIRED_HOST_TOOLS: &[&str] = &["vim-cmd", "esxcli"];

#[derive(Error, Debug)]
#[error("required host utility `{tool}` is not on PATH")]
pub struct MissingTool {
    pub tool: String,
}

/// Check that the given utilities resolve on PATH. The orchestration is not
/// worth starting on a host that can't answer its own management commands.
pub fn preflight(tools: &[&str]) -> Result<(), MissingTool> {
    for tool in tools {
        if which::which(tool).is_err() {
            return Err(MissingTool {
                tool: tool.to_string(),
            });
        }
    }
    Ok(())
}

/// Runs commands on the host this process lives on.
///
/// Output is streamed chunk-by-chunk into the debug log while the full
/// transcript accumulates. The profile update can run for minutes, and its
/// progress has to be visible before the command returns.
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    async fn spawn_and_capture(&self, command: &str) -> color_eyre::eyre::Result<String> {
        let words = shell_words::split(command)?;
        let (head, args) = words
            .split_first()
            .ok_or_else(|| eyre!("empty command"))?;

        let mut child = Command::new(head)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = FramedRead::new(child.stdout.take().unwrap(), BytesCodec::new());
        let mut stderr = FramedRead::new(child.stderr.take().unwrap(), BytesCodec::new());

        let mut transcript = String::new();
        loop {
            tokio::select! {
                Some(next) = stdout.next() => {
                    if let Ok(bytes) = next {
                        let chunk = String::from_utf8_lossy(&bytes);
                        debug!("{}: {}", head, chunk.trim_end());
                        transcript.push_str(&chunk);
                    }
                }
                Some(next) = stderr.next() => {
                    if let Ok(bytes) = next {
                        let chunk = String::from_utf8_lossy(&bytes);
                        debug!("{} (stderr): {}", head, chunk.trim_end());
                        transcript.push_str(&chunk);
                    }
                }
                else => {
                    break;
                }
            }
        }

        let status = child.wait().await?;
        debug!("command '{}' exited with {}", command, status);

        Ok(transcript)
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    #[tracing::instrument(skip(self))]
    async fn execute(&mut self, command: &str) -> String {
        match self.spawn_and_capture(command).await {
            Ok(transcript) => transcript,
            Err(err) => {
                // Unreachable commands come back as empty output on
                // purpose; the facts layer turns that into `Unknown` and
                // callers take the conservative branch.
                warn!("command '{}' could not be run: {}", command, err);
                String::new()
            }
        }
    }
}
