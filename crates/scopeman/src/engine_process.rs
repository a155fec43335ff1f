// engine_process.rs - Analysis engine subprocess transport
//
// The engine runs as a child process and speaks newline-delimited JSON:
// one EngineRequest per line on its stdin, one engine message per line on
// its stdout. Anything it writes to stderr is forwarded to the debug log.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{EngineMessage, EngineRequest};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Both directions of an engine connection.
pub struct EngineLink {
    pub outbound: mpsc::UnboundedSender<EngineRequest>,
    pub inbound: mpsc::UnboundedReceiver<EngineMessage>,
    /// `None` for a detached link
    pub process: Option<EngineProcess>,
}

impl EngineLink {
    /// A link with no engine behind it. Both directions are already closed:
    /// sends fail, so completion requests end with `HintError::EngineGone`,
    /// and the inbound loop stops at once.
    pub fn detached() -> Self {
        let (outbound, _) = mpsc::unbounded_channel();
        let (_, inbound) = mpsc::unbounded_channel();
        Self {
            outbound,
            inbound,
            process: None,
        }
    }
}

pub struct EngineProcess {
    child: Child,
    program: String,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineProcess {
    /// Start `command[0]` with the remaining elements as arguments.
    pub fn spawn(command: &[String]) -> Result<EngineLink> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("Engine command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn analysis engine `{}`", program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Engine stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Engine stderr was not captured"))?;

        let (outbound, requests) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            if let Err(e) = write_requests(stdin, requests).await {
                log::warn!("Writing to analysis engine failed: {:#}", e);
            }
        });
        let reader = tokio::spawn(async move {
            match read_messages(stdout, inbound_tx).await {
                Ok(count) => log::info!("Analysis engine output closed after {} messages", count),
                Err(e) => log::warn!("Reading from analysis engine failed: {:#}", e),
            }
        });
        let stderr_task = tokio::spawn(forward_stderr(stderr));

        log::info!(
            "Started analysis engine `{}` (pid {:?})",
            command.join(" "),
            child.id()
        );

        Ok(EngineLink {
            outbound,
            inbound,
            process: Some(Self {
                child,
                program: program.clone(),
                tasks: vec![writer, reader, stderr_task],
            }),
        })
    }

    /// Kill the engine and wait briefly for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        for task in &self.tasks {
            task.abort();
        }
        if let Err(e) = self.child.start_kill() {
            // Already exited.
            log::trace!("Engine `{}` kill: {}", self.program, e);
        }
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to reap analysis engine")?;
                log::info!("Analysis engine `{}` exited: {}", self.program, status);
                Ok(())
            }
            Err(_) => Err(anyhow!(
                "Analysis engine `{}` did not exit within {:?}",
                self.program,
                SHUTDOWN_TIMEOUT
            )),
        }
    }
}

/// Write each request as one JSON line until `requests` closes.
pub async fn write_requests<W>(
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<EngineRequest>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("sending {} message", request.kind()))?;
        writer.flush().await?;
    }
    Ok(())
}

/// Decode one engine message per line and forward it. Undecodable lines are
/// logged and skipped. Returns the number of messages forwarded.
pub async fn read_messages<R>(
    reader: R,
    messages: mpsc::UnboundedSender<EngineMessage>,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message = match EngineMessage::from_line(line) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Skipping undecodable engine message: {}", e);
                continue;
            }
        };
        if messages.send(message).is_err() {
            log::trace!("Engine message receiver dropped; stopping reader");
            break;
        }
        count += 1;
    }
    Ok(count)
}

async fn forward_stderr<R>(reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log::debug!("[engine stderr] {}", line),
            Ok(None) => break,
            Err(e) => {
                log::trace!("Engine stderr closed: {}", e);
                break;
            }
        }
    }
}
