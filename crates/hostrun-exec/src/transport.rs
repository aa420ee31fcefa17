//! Transport capability traits
//!
//! A transport establishes a session with a host and starts literal command
//! lines on it. Everything above this seam (shell quoting, process lifecycle,
//! logging) is shared by all transports.

use std::fmt;

use async_trait::async_trait;

use crate::error::ExecError;

/// Signals that can be delivered to a running command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Hup,
    Int,
    Quit,
    Kill,
    Usr1,
    Usr2,
    Term,
}

impl Signal {
    /// Signal name without the `SIG` prefix
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Signal::Hup => "HUP",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Kill => "KILL",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Term => "TERM",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

/// Live channel to one started command
///
/// Output readers return `Ok(None)` once the stream reached EOF and keep
/// doing so on further calls.
#[async_trait]
pub trait ChannelHandle: Send {
    /// Read the next line of standard output, without the line terminator
    async fn read_stdout_line(&mut self) -> Result<Option<String>, ExecError>;

    /// Read the next line of standard error output
    async fn read_stderr_line(&mut self) -> Result<Option<String>, ExecError>;

    /// Write raw bytes to standard input
    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), ExecError>;

    /// Close standard input; closing twice is a no-op
    async fn close_stdin(&mut self) -> Result<(), ExecError>;

    /// Wait for the command to exit and return its return code
    async fn wait_exit(&mut self) -> Result<i32, ExecError>;

    /// Deliver a signal to the command
    async fn send_signal(&mut self, signal: Signal) -> Result<(), ExecError>;
}

/// Session with a host that can start commands
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the session; no-op if already connected
    async fn connect(&self) -> Result<(), ExecError>;

    /// Tear down the session; no-op if not connected
    async fn disconnect(&self) -> Result<(), ExecError>;

    /// Whether the session is established
    fn is_connected(&self) -> bool;

    /// Start a literal command line
    ///
    /// Returns once the command has been started; it does not wait for the
    /// command to finish.
    async fn start(
        &self,
        command_line: &str,
        want_stdin: bool,
    ) -> Result<Box<dyn ChannelHandle>, ExecError>;

    /// Short transport name used in logs
    fn transport_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::Term.to_string(), "SIGTERM");
        assert_eq!(Signal::Usr1.name(), "USR1");
    }
}
