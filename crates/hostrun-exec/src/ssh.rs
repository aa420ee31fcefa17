//! SSH transport using russh crate

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect, Sig, client};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::transport::{ChannelHandle, Signal, Transport};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// Connection information for SSH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Username
    pub user: String,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
        }
    }
}

/// SSH transport
///
/// Owns one SSH session; every started command gets its own channel, so
/// several commands can run over the same session at once.
pub struct SshTransport {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// Resolved SSH key
    key: ResolvedKey,
    /// SSH session (established by `connect`)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
    /// Mirrors whether `session` holds a handle
    connected: AtomicBool,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("conn_info", &self.conn_info)
            .field("key", &self.key)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshTransport {
    /// Create a new SSH transport
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(conn_info: ConnectionInfo, key_source: &KeySource) -> Result<Self, ExecError> {
        let key = key_source
            .resolve()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        Ok(Self {
            conn_info,
            key,
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    async fn authenticate(
        &self,
        session: &mut client::Handle<SshClientHandler>,
    ) -> Result<(), ExecError> {
        let Some(key_path) = self.key.path() else {
            return Err(ExecError::AuthenticationFailed(
                "SSH agent authentication is not supported, configure a key".to_string(),
            ));
        };

        let key_pair =
            load_secret_key(key_path, None).map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                &self.conn_info.user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication failed".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SshTransport {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        self.authenticate(&mut session).await?;

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            self.connected.store(false, Ordering::SeqCst);
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, command_line), fields(host = %self.conn_info.host))]
    async fn start(
        &self,
        command_line: &str,
        want_stdin: bool,
    ) -> Result<Box<dyn ChannelHandle>, ExecError> {
        let mut channel = {
            let session_lock = self.session.lock().await;
            let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

            session
                .channel_open_session()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?
        };

        debug!(command = %command_line, "starting remote command");

        channel
            .exec(true, command_line)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut handle = SshChannel::spawn(channel);
        if !want_stdin {
            handle.close_stdin().await?;
        }

        Ok(Box::new(handle))
    }

    fn transport_type(&self) -> &'static str {
        "ssh"
    }
}

/// Request forwarded to the task that owns the channel
#[derive(Debug)]
enum ChannelRequest {
    Data(Vec<u8>),
    Eof,
    Signal(Sig),
}

/// Splits raw channel data into lines
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, data: &[u8], tx: &mpsc::UnboundedSender<String>) {
        self.pending.extend_from_slice(data);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let _ = tx.send(String::from_utf8_lossy(&line).to_string());
        }
    }

    fn flush(&mut self, tx: &mpsc::UnboundedSender<String>) {
        if !self.pending.is_empty() {
            let _ = tx.send(String::from_utf8_lossy(&self.pending).to_string());
            self.pending.clear();
        }
    }
}

fn to_russh_sig(signal: Signal) -> Sig {
    match signal {
        Signal::Hup => Sig::HUP,
        Signal::Int => Sig::INT,
        Signal::Quit => Sig::QUIT,
        Signal::Kill => Sig::KILL,
        Signal::Usr1 => Sig::USR1,
        Signal::Usr2 => Sig::Custom("USR2".to_string()),
        Signal::Term => Sig::TERM,
    }
}

/// Drive one SSH channel until the server closes it
///
/// Dropping the request sender closes the channel.
async fn pump_channel(
    mut channel: Channel<client::Msg>,
    mut requests: mpsc::UnboundedReceiver<ChannelRequest>,
    stdout: mpsc::UnboundedSender<String>,
    stderr: mpsc::UnboundedSender<String>,
    exit: oneshot::Sender<i32>,
) {
    let mut out = LineBuffer::default();
    let mut err = LineBuffer::default();
    let mut status = -1;

    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => out.push(&data, &stdout),
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        err.push(&data, &stderr);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    debug!(signal = ?signal_name, "remote command killed by signal");
                }
                Some(ChannelMsg::Close) | None => break,
                _ => {}
            },
            request = requests.recv() => {
                let result = match request {
                    Some(ChannelRequest::Data(data)) => channel.data(&data[..]).await,
                    Some(ChannelRequest::Eof) => channel.eof().await,
                    Some(ChannelRequest::Signal(sig)) => channel.signal(sig).await,
                    None => {
                        debug!("channel handle dropped, closing channel");
                        let _ = channel.close().await;
                        break;
                    }
                };
                if let Err(e) = result {
                    warn!(error = %e, "channel request failed");
                }
            }
        }
    }

    out.flush(&stdout);
    err.flush(&stderr);
    let _ = exit.send(status);
}

/// Channel to a command started over SSH
struct SshChannel {
    requests: mpsc::UnboundedSender<ChannelRequest>,
    stdin_open: bool,
    stdout: mpsc::UnboundedReceiver<String>,
    stderr: mpsc::UnboundedReceiver<String>,
    exit: Option<oneshot::Receiver<i32>>,
    status: Option<i32>,
}

impl SshChannel {
    fn spawn(channel: Channel<client::Msg>) -> Self {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(pump_channel(channel, req_rx, out_tx, err_tx, exit_tx));

        Self {
            requests: req_tx,
            stdin_open: true,
            stdout: out_rx,
            stderr: err_rx,
            exit: Some(exit_rx),
            status: None,
        }
    }

    fn request(&self, request: ChannelRequest) -> Result<(), ExecError> {
        self.requests
            .send(request)
            .map_err(|_| ExecError::IoError("SSH channel is closed".to_string()))
    }
}

#[async_trait]
impl ChannelHandle for SshChannel {
    async fn read_stdout_line(&mut self) -> Result<Option<String>, ExecError> {
        Ok(self.stdout.recv().await)
    }

    async fn read_stderr_line(&mut self) -> Result<Option<String>, ExecError> {
        Ok(self.stderr.recv().await)
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), ExecError> {
        if !self.stdin_open {
            return Err(ExecError::usage("standard input is closed"));
        }
        // The channel task is gone once the remote command closed the channel
        self.requests
            .send(ChannelRequest::Data(data.to_vec()))
            .map_err(|_| ExecError::StdinClosed)
    }

    async fn close_stdin(&mut self) -> Result<(), ExecError> {
        if self.stdin_open {
            self.stdin_open = false;
            // The server may have closed the channel already
            let _ = self.request(ChannelRequest::Eof);
        }
        Ok(())
    }

    async fn wait_exit(&mut self) -> Result<i32, ExecError> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let exit = self
            .exit
            .take()
            .ok_or_else(|| ExecError::IoError("exit status is lost".to_string()))?;
        let status = exit
            .await
            .map_err(|_| ExecError::IoError("SSH channel task ended unexpectedly".to_string()))?;

        self.status = Some(status);
        Ok(status)
    }

    async fn send_signal(&mut self, signal: Signal) -> Result<(), ExecError> {
        debug!(signal = %signal, "sending signal to remote command");
        self.request(ChannelRequest::Signal(to_russh_sig(signal)))
    }
}

/// Builder for `SshTransport`
pub struct SshTransportBuilder {
    conn_info: ConnectionInfo,
    key_source: KeySource,
}

impl SshTransportBuilder {
    /// Create builder with required fields
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            conn_info: ConnectionInfo::new(host, user),
            key_source: KeySource::Agent,
        }
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.key_source = KeySource::Path(path.into());
        self
    }

    /// Set key source directly
    #[must_use]
    pub fn with_key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.conn_info.port = port;
        self
    }

    /// Build the transport
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn build(self) -> Result<SshTransport, ExecError> {
        SshTransport::new(self.conn_info, &self.key_source)
    }
}
