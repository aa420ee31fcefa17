//! Error types for hostrun-exec

use thiserror::Error;

use crate::result::ProcessError;

/// Errors that can occur while connecting to a host or running commands
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// API used out of order or with invalid arguments
    #[error("usage error: {0}")]
    Usage(String),

    /// `throw()` called on a result that carries no error
    #[error("no error is set")]
    NoError,

    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Command exited with non-zero return code
    #[error("{0}")]
    Process(Box<ProcessError>),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// The command closed its standard input
    #[error("standard input was closed by the command")]
    StdinClosed,

    /// I/O error while talking to the process
    #[error("I/O error: {0}")]
    IoError(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl ExecError {
    /// Shorthand for a usage error
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        ExecError::Usage(msg.into())
    }

    /// Return code of the failed command, if this is a command failure
    #[must_use]
    pub fn rc(&self) -> Option<i32> {
        match self {
            ExecError::Process(err) => Some(err.rc),
            _ => None,
        }
    }

    /// Check if the error was caused by calling the API incorrectly
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, ExecError::Usage(_) | ExecError::NoError)
    }

    /// Check if the error comes from establishing the session
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
                | ExecError::NotConnected
        )
    }
}

impl From<ProcessError> for ExecError {
    fn from(err: ProcessError) -> Self {
        ExecError::Process(Box::new(err))
    }
}

impl From<std::io::Error> for ExecError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => ExecError::StdinClosed,
            _ => ExecError::IoError(err.to_string()),
        }
    }
}
