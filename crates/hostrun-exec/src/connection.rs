//! High-level command API on top of a transport

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::local::LocalTransport;
use crate::logging::{ProcessLogger, TracingLogger};
use crate::process::{Process, RunOptions};
use crate::result::ProcessResult;
use crate::shell::{Shell, join_args};
use crate::transport::Transport;

/// Options for [`Connection::expect`] and [`Connection::expect_nobody`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectOptions {
    /// Enable expect debug output (`-d`)
    pub verbose: bool,
    /// Fail on non-zero return code
    pub raise_on_error: bool,
}

impl Default for ExpectOptions {
    fn default() -> Self {
        // Expect scripts often report results through the exit code
        Self {
            verbose: true,
            raise_on_error: false,
        }
    }
}

/// Connection to a host
///
/// Every high-level call connects first, so calling [`connect`] explicitly
/// is optional. Cloning is cheap and clones share the transport session.
///
/// ```no_run
/// # async fn demo() -> Result<(), hostrun_exec::ExecError> {
/// use hostrun_exec::{Connection, RunOptions, Shell};
///
/// let conn = Connection::local(Shell::BASH);
/// let result = conn.run("echo Hello World", RunOptions::default()).await?;
/// assert_eq!(result.stdout(), "Hello World");
///
/// let mut process = conn.async_run("cat", RunOptions::default()).await?;
/// process.stdin()?.write("Hello World\n").await?;
/// process.send_eof().await?;
/// let result = process.wait(true).await?;
/// assert_eq!(result.stdout_lines(), ["Hello World"]);
/// # Ok(())
/// # }
/// ```
///
/// Setting `HOSTRUN_CONNECTION_DEBUG=yes` logs every process with
/// [`LogLevel::Full`](crate::LogLevel::Full), whatever level was requested.
///
/// [`connect`]: Connection::connect
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    shell: Shell,
    logger: Arc<dyn ProcessLogger>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport.transport_type())
            .field("shell", &self.shell)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a new connection
    pub fn new(transport: Arc<dyn Transport>, shell: Shell, logger: Arc<dyn ProcessLogger>) -> Self {
        Self {
            transport,
            shell,
            logger,
        }
    }

    /// Connection to this machine, logging through `tracing`
    #[must_use]
    pub fn local(shell: Shell) -> Self {
        Self::new(
            Arc::new(LocalTransport::new()),
            shell,
            Arc::new(TracingLogger::new("localhost")),
        )
    }

    /// Shell used to run commands and scripts
    #[must_use]
    pub fn shell(&self) -> Shell {
        self.shell
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether the session is established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connect to the host; no-op if already connected
    ///
    /// # Errors
    /// Returns a connection error if the session can not be established
    pub async fn connect(&self) -> Result<(), ExecError> {
        self.transport.connect().await
    }

    /// Disconnect from the host; no-op if not connected
    ///
    /// # Errors
    /// Returns the transport error if the session can not be closed cleanly
    pub async fn disconnect(&self) -> Result<(), ExecError> {
        self.transport.disconnect().await
    }

    /// Create a new process that is not yet running
    #[must_use]
    pub fn create_process(&self, command: &str, options: RunOptions, blocking: bool) -> Process {
        Process::new(
            Arc::clone(&self.transport),
            self.shell,
            Arc::clone(&self.logger),
            command,
            options,
            blocking,
        )
    }

    /// Blocking command call
    ///
    /// Runs the command in the connection's shell and waits for it to
    /// finish.
    ///
    /// # Errors
    /// Returns `ExecError::Process` if `options.raise_on_error` is set and
    /// the command exited with non-zero return code, or a connection or
    /// transport error
    #[instrument(skip(self, options), level = "debug")]
    pub async fn run(&self, command: &str, options: RunOptions) -> Result<ProcessResult, ExecError> {
        self.connect().await?;

        let raise_on_error = options.raise_on_error;
        let mut process = self.create_process(command, options, true);
        process.run().await?;
        process.wait(raise_on_error).await
    }

    /// Non-blocking command call
    ///
    /// Starts the command and returns the running process without waiting
    /// for it. `options.raise_on_error` is ignored; pass the flag to
    /// [`Process::wait`] instead.
    ///
    /// # Errors
    /// Returns a connection or transport error if the command can not be
    /// started
    #[instrument(skip(self, options), level = "debug")]
    pub async fn async_run(&self, command: &str, options: RunOptions) -> Result<Process, ExecError> {
        self.connect().await?;

        let mut process = self.create_process(command, options, false);
        process.run().await?;
        Ok(process)
    }

    /// Blocking call of an argument vector
    ///
    /// Every argument is stringified and quoted, so it reaches the command
    /// as exactly one argument.
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if `argv` is empty, otherwise the same
    /// errors as [`run`](Self::run)
    pub async fn exec<I, S>(&self, argv: I, options: RunOptions) -> Result<ProcessResult, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let command = argv_command(argv, "run() instead of exec()")?;
        self.run(&command, options).await
    }

    /// Non-blocking call of an argument vector
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if `argv` is empty, otherwise the same
    /// errors as [`async_run`](Self::async_run)
    pub async fn async_exec<I, S>(&self, argv: I, options: RunOptions) -> Result<Process, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let command = argv_command(argv, "async_run() instead of async_exec()")?;
        self.async_run(&command, options).await
    }

    /// Run an expect script
    ///
    /// # Errors
    /// Returns `ExecError::Process` only if `options.raise_on_error` is set
    /// and the script exited with non-zero return code
    pub async fn expect(
        &self,
        script: &str,
        options: ExpectOptions,
    ) -> Result<ProcessResult, ExecError> {
        let mut argv = vec!["/bin/expect"];
        if options.verbose {
            argv.push("-d");
        }

        self.exec(
            argv,
            RunOptions::default()
                .with_input(script)
                .with_raise_on_error(options.raise_on_error),
        )
        .await
    }

    /// Run an expect script as user `nobody`
    ///
    /// Keeps the script from running as root when the session belongs to
    /// root.
    ///
    /// # Errors
    /// Returns `ExecError::Process` only if `options.raise_on_error` is set
    /// and the script exited with non-zero return code
    pub async fn expect_nobody(
        &self,
        script: &str,
        options: ExpectOptions,
    ) -> Result<ProcessResult, ExecError> {
        let args = if options.verbose { " -d" } else { "" };

        self.run(
            &format!("su --shell /bin/sh nobody -c \"/bin/expect{args}\""),
            RunOptions::default()
                .with_input(script)
                .with_raise_on_error(options.raise_on_error),
        )
        .await
    }

    /// Run `f` with a connected clone of this connection
    ///
    /// The connection is disconnected afterwards whether `f` succeeded or
    /// not. An error from `f` takes precedence over a disconnect error.
    ///
    /// # Errors
    /// Returns the connection error, the error of `f`, or the disconnect
    /// error, in that order of precedence
    pub async fn scoped<F, Fut, T>(&self, f: F) -> Result<T, ExecError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, ExecError>>,
    {
        self.connect().await?;

        let result = f(self.clone()).await;
        let disconnected = self.disconnect().await;

        match (result, disconnected) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(disconnect_err)) => {
                warn!(error = %disconnect_err, "disconnect failed after error");
                Err(e)
            }
        }
    }
}

fn argv_command<I, S>(argv: I, hint: &str) -> Result<String, ExecError>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    let argv: Vec<String> = argv.into_iter().map(|arg| arg.to_string()).collect();
    if argv.is_empty() {
        return Err(ExecError::usage(format!(
            "argv is empty, did you mean {hint}?"
        )));
    }

    let command = join_args(&argv);
    debug!(command = %command, "joined argv");
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_command() {
        assert_eq!(argv_command(["echo", "a b"], "x").unwrap(), "echo 'a b'");
        assert_eq!(argv_command([1, 2], "x").unwrap(), "1 2");
        assert!(argv_command(Vec::<String>::new(), "x").unwrap_err().is_usage());
    }

    #[test]
    fn test_expect_defaults() {
        let options = ExpectOptions::default();
        assert!(options.verbose);
        assert!(!options.raise_on_error);
    }

    #[tokio::test]
    async fn test_run_connects_implicitly() {
        let conn = Connection::local(Shell::SH);
        assert!(!conn.is_connected());

        let result = conn.run("echo hello", RunOptions::default()).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(result.stdout_lines(), ["hello"]);
    }

    #[tokio::test]
    async fn test_create_process_is_not_started() {
        let conn = Connection::local(Shell::SH);
        let process = conn.create_process("true", RunOptions::default(), true);

        assert!(!process.in_progress());
        assert!(process.is_blocking());
        assert_eq!(process.full_command_line(), "/bin/sh -c 'true'");
    }
}
