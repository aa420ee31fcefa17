//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::transport::{ChannelHandle, Signal, Transport};

/// Local command transport
///
/// Runs literal command lines through the system shell on this machine.
#[derive(Debug, Default)]
pub struct LocalTransport {
    connected: AtomicBool,
}

impl LocalTransport {
    /// Create a new local transport
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    #[cfg(unix)]
    fn command(command_line: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        // Own process group so signals reach the whole pipeline
        cmd.process_group(0);
        cmd
    }

    #[cfg(not(unix))]
    fn command(command_line: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    }
}

type LineReceiver = mpsc::UnboundedReceiver<Result<String, ExecError>>;

/// Forward lines from a pipe into a channel until EOF
async fn pump_lines<R>(reader: R, tx: mpsc::UnboundedSender<Result<String, ExecError>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).to_string();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.into()));
                break;
            }
        }
    }
}

/// Channel to a locally spawned child
struct LocalChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: LineReceiver,
    stderr: LineReceiver,
}

async fn next_line(rx: &mut LineReceiver) -> Result<Option<String>, ExecError> {
    rx.recv().await.transpose()
}

#[async_trait]
impl ChannelHandle for LocalChannel {
    async fn read_stdout_line(&mut self) -> Result<Option<String>, ExecError> {
        next_line(&mut self.stdout).await
    }

    async fn read_stderr_line(&mut self) -> Result<Option<String>, ExecError> {
        next_line(&mut self.stderr).await
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), ExecError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExecError::usage("standard input is closed"))?;

        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<(), ExecError> {
        if let Some(mut stdin) = self.stdin.take() {
            // The child may already be gone, nothing left to close then
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "failed to shut down stdin");
            }
        }
        Ok(())
    }

    async fn wait_exit(&mut self) -> Result<i32, ExecError> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn send_signal(&mut self, signal: Signal) -> Result<(), ExecError> {
        deliver_signal(&mut self.child, signal)?;
        debug!(signal = %signal, "signal delivered");
        Ok(())
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        // kill_on_drop only reaches the shell, not the rest of its group
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(e) = deliver_signal(&mut self.child, Signal::Kill) {
                debug!(error = %e, "failed to kill dropped process group");
            }
        }
    }
}

#[cfg(unix)]
fn deliver_signal(child: &mut Child, signal: Signal) -> Result<(), ExecError> {
    let pid = child
        .id()
        .ok_or_else(|| ExecError::IoError("process has already exited".to_string()))?;
    let pgid =
        libc::pid_t::try_from(pid).map_err(|_| ExecError::IoError(format!("invalid pid {pid}")))?;

    let signum = match signal {
        Signal::Hup => libc::SIGHUP,
        Signal::Int => libc::SIGINT,
        Signal::Quit => libc::SIGQUIT,
        Signal::Kill => libc::SIGKILL,
        Signal::Usr1 => libc::SIGUSR1,
        Signal::Usr2 => libc::SIGUSR2,
        Signal::Term => libc::SIGTERM,
    };

    // SAFETY: kill(2) has no memory safety requirements
    let rc = unsafe { libc::kill(-pgid, signum) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn deliver_signal(child: &mut Child, signal: Signal) -> Result<(), ExecError> {
    match signal {
        Signal::Kill | Signal::Term => Ok(child.start_kill()?),
        other => Err(ExecError::usage(format!(
            "{other} is not supported on this platform"
        ))),
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(), ExecError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, command_line), level = "debug")]
    async fn start(
        &self,
        command_line: &str,
        want_stdin: bool,
    ) -> Result<Box<dyn ChannelHandle>, ExecError> {
        if !self.is_connected() {
            return Err(ExecError::NotConnected);
        }

        debug!(command = %command_line, "starting local command");

        let mut child = Self::command(command_line)
            .stdin(if want_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();

        match child.stdout.take() {
            Some(out) => {
                tokio::spawn(pump_lines(out, stdout_tx));
            }
            None => warn!("child stdout is not piped"),
        }
        match child.stderr.take() {
            Some(err) => {
                tokio::spawn(pump_lines(err, stderr_tx));
            }
            None => warn!("child stderr is not piped"),
        }

        let stdin = child.stdin.take();

        Ok(Box::new(LocalChannel {
            child,
            stdin,
            stdout: stdout_rx,
            stderr: stderr_rx,
        }))
    }

    fn transport_type(&self) -> &'static str {
        "local"
    }
}
