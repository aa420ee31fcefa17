//! Lifecycle of a single command execution
//!
//! A [`Process`] is created by [`Connection::create_process`], started with
//! [`Process::run`] and completed by exactly one [`Process::wait`]. While it
//! runs, the caller can write to its standard input, pull output line by
//! line and send signals.
//!
//! [`Connection::create_process`]: crate::connection::Connection::create_process

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::debug;

use crate::error::ExecError;
use crate::logging::{
    Highlight, LogData, LogLevel, ProcessLogger, debug_override, effective_level,
};
use crate::result::{ProcessError, ProcessResult};
use crate::shell::Shell;
use crate::transport::{ChannelHandle, Signal, Transport};

/// Process-wide id sequence, shared by all connections
static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

fn next_process_id() -> u64 {
    NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-invocation settings of a command
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory, `None` keeps the default one
    pub cwd: Option<String>,
    /// Additional environment variables
    pub env: BTreeMap<String, String>,
    /// Content written to standard input right after start
    pub input: Option<String>,
    /// Log level
    pub log_level: LogLevel,
    /// Fail on non-zero return code (blocking calls only)
    pub raise_on_error: bool,
    /// Extra fields added to every log record of the process
    pub metadata: LogData,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            input: None,
            log_level: LogLevel::Full,
            raise_on_error: true,
            metadata: LogData::new(),
        }
    }
}

impl RunOptions {
    /// Set working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable; the value is stringified
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.insert(key.into(), value.to_string());
        self
    }

    /// Set standard input content
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set log level
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Set whether a non-zero return code fails the call
    #[must_use]
    pub fn with_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    /// Add a field to the log records of the process
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, not yet started
    Created,
    /// Started and not yet waited on
    Running,
    /// Waited on
    Completed,
}

/// Output stream of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Pull sequence over the lines of one output stream
///
/// Each call to [`next_line`] waits until a line is available. Once EOF is
/// reached it yields `None` for good. Lines taken here are not part of the
/// result returned by [`Process::wait`].
///
/// [`next_line`]: OutputLines::next_line
pub struct OutputLines<'a> {
    handle: &'a mut dyn ChannelHandle,
    stream: Stream,
    done: bool,
}

impl fmt::Debug for OutputLines<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputLines")
            .field("stream", &self.stream)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl OutputLines<'_> {
    /// Next line of output, or `None` after EOF
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if reading from the channel fails
    pub async fn next_line(&mut self) -> Result<Option<String>, ExecError> {
        if self.done {
            return Ok(None);
        }

        let line = match self.stream {
            Stream::Stdout => self.handle.read_stdout_line().await?,
            Stream::Stderr => self.handle.read_stderr_line().await?,
        };

        if line.is_none() {
            self.done = true;
        }
        Ok(line)
    }

    /// Read all remaining lines until EOF
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if reading from the channel fails
    pub async fn collect_remaining(mut self) -> Result<Vec<String>, ExecError> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }
}

/// Write access to the standard input of a running process
pub struct ProcessInput<'a> {
    handle: &'a mut dyn ChannelHandle,
}

impl fmt::Debug for ProcessInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInput").finish_non_exhaustive()
    }
}

impl ProcessInput<'_> {
    /// Write data to standard input
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the input was already closed,
    /// `ExecError::StdinClosed` if the command stopped reading, or an I/O
    /// error from the transport
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> Result<(), ExecError> {
        self.handle.write_stdin(data.as_ref()).await
    }
}

/// One command execution over a transport
pub struct Process {
    id: u64,
    command: String,
    cwd: Option<String>,
    env: BTreeMap<String, String>,
    input: Option<String>,
    log_level: LogLevel,
    blocking: bool,
    metadata: LogData,
    shell: Shell,
    full_command_line: String,
    logger: Arc<dyn ProcessLogger>,
    transport: Arc<dyn Transport>,
    state: ProcessState,
    handle: Option<Box<dyn ChannelHandle>>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("shell", &self.shell.name())
            .field("transport", &self.transport.transport_type())
            .field("log_level", &self.log_level)
            .field("blocking", &self.blocking)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Process {
    /// Create a new process that is not yet running
    pub fn new(
        transport: Arc<dyn Transport>,
        shell: Shell,
        logger: Arc<dyn ProcessLogger>,
        command: &str,
        options: RunOptions,
        blocking: bool,
    ) -> Self {
        Self::with_debug_override(
            transport,
            shell,
            logger,
            command,
            options,
            blocking,
            debug_override(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_debug_override(
        transport: Arc<dyn Transport>,
        shell: Shell,
        logger: Arc<dyn ProcessLogger>,
        command: &str,
        options: RunOptions,
        blocking: bool,
        debug: bool,
    ) -> Self {
        let command = normalize_script(command);
        let full_command_line =
            shell.build_command_line(&command, options.cwd.as_deref(), &options.env);
        let log_level = effective_level(options.log_level, debug);

        Self {
            id: next_process_id(),
            command,
            cwd: options.cwd,
            env: options.env,
            input: options.input,
            log_level,
            blocking,
            metadata: options.metadata,
            shell,
            full_command_line,
            logger,
            transport,
            state: ProcessState::Created,
            handle: None,
        }
    }

    /// Process id, unique and increasing within this OS process
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Normalized command (dedented and trimmed)
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Working directory
    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Additional environment variables
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Shell that executes the command
    #[must_use]
    pub fn shell(&self) -> Shell {
        self.shell
    }

    /// Effective log level, after the debug override
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Whether this process backs a blocking call
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Literal command line passed to the transport
    #[must_use]
    pub fn full_command_line(&self) -> &str {
        &self.full_command_line
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the process has been started and not yet waited on
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.state == ProcessState::Running
    }

    fn running_handle(&mut self, action: &str) -> Result<&mut dyn ChannelHandle, ExecError> {
        match (self.state, self.handle.as_deref_mut()) {
            (ProcessState::Running, Some(handle)) => Ok(handle),
            _ => Err(ExecError::usage(format!(
                "{action} requires a running process (process #{} is {:?})",
                self.id, self.state
            ))),
        }
    }

    /// Start the command
    ///
    /// Returns as soon as the transport started the command, also for
    /// blocking calls.
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process was already started, or the
    /// transport error if the command can not be started
    pub async fn run(&mut self) -> Result<&mut Self, ExecError> {
        if self.state != ProcessState::Created {
            return Err(ExecError::usage(format!(
                "process #{} has already been started",
                self.id
            )));
        }

        if matches!(self.log_level, LogLevel::Short | LogLevel::Full) {
            self.logger
                .info(&self.msg_execution(), Some(&self.context_data()));
        }

        let mut handle = self.transport.start(&self.full_command_line, true).await?;

        if let Some(input) = &self.input {
            match handle.write_stdin(input.as_bytes()).await {
                Ok(()) => {}
                Err(ExecError::StdinClosed) => {
                    debug!(id = self.id, "command closed stdin before reading all input");
                }
                Err(e) => return Err(e),
            }
            handle.close_stdin().await?;
        }

        debug!(id = self.id, transport = self.transport.transport_type(), "process started");

        self.handle = Some(handle);
        self.state = ProcessState::Running;
        Ok(self)
    }

    /// Standard output, line by line
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process is not running
    pub fn stdout(&mut self) -> Result<OutputLines<'_>, ExecError> {
        Ok(OutputLines {
            handle: self.running_handle("reading stdout")?,
            stream: Stream::Stdout,
            done: false,
        })
    }

    /// Standard error output, line by line
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process is not running
    pub fn stderr(&mut self) -> Result<OutputLines<'_>, ExecError> {
        Ok(OutputLines {
            handle: self.running_handle("reading stderr")?,
            stream: Stream::Stderr,
            done: false,
        })
    }

    /// Standard input; call [`send_eof`](Self::send_eof) when done writing
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process is not running
    pub fn stdin(&mut self) -> Result<ProcessInput<'_>, ExecError> {
        Ok(ProcessInput {
            handle: self.running_handle("writing stdin")?,
        })
    }

    /// Close standard input to signal that no more data will come
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process is not running
    pub async fn send_eof(&mut self) -> Result<(), ExecError> {
        self.running_handle("sending EOF")?.close_stdin().await
    }

    /// Send a signal to the running command
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process is not running, or the
    /// transport error if the signal can not be delivered
    pub async fn send_signal(&mut self, signal: Signal) -> Result<(), ExecError> {
        self.running_handle("sending a signal")?
            .send_signal(signal)
            .await
    }

    /// Wait for the command to finish
    ///
    /// Standard input is closed first, then both output streams are drained
    /// to EOF and the return code is collected.
    ///
    /// # Errors
    /// Returns `ExecError::Usage` if the process was not started,
    /// `ExecError::Process` if `raise_on_error` is set and the command
    /// exited with non-zero return code, or a transport error
    pub async fn wait(mut self, raise_on_error: bool) -> Result<ProcessResult, ExecError> {
        self.running_handle("waiting")?;
        let Some(mut handle) = self.handle.take() else {
            return Err(ExecError::usage("process has no channel"));
        };

        handle.close_stdin().await?;

        let mut stdout = Vec::new();
        while let Some(line) = handle.read_stdout_line().await? {
            stdout.push(line);
        }
        let mut stderr = Vec::new();
        while let Some(line) = handle.read_stderr_line().await? {
            stderr.push(line);
        }

        let rc = handle.wait_exit().await?;
        self.state = ProcessState::Completed;

        debug!(id = self.id, rc, "process completed");

        let error = ProcessError::new(
            self.id,
            self.command.clone(),
            rc,
            self.cwd.clone(),
            self.env.clone(),
            self.input.clone(),
            stdout.clone(),
            stderr.clone(),
        );
        let result = ProcessResult::new(rc, stdout, stderr, Some(error));

        self.log_completion(&result);

        if raise_on_error {
            result.check()?;
        }

        Ok(result)
    }

    fn log_completion(&self, result: &ProcessResult) {
        let rc = result.rc();

        if self.log_level == LogLevel::Error && rc != 0 {
            let mut data = self.context_data();
            add_output(&mut data, result);
            self.logger.error(&self.msg_completed_async(rc), Some(&data));
        }

        match (self.blocking, self.log_level) {
            (true, LogLevel::Short) => {
                self.logger.info(&self.msg_completed_sync(rc), None);
            }
            (true, LogLevel::Full) => {
                let mut data = LogData::new();
                add_output(&mut data, result);
                self.logger.info(&self.msg_completed_sync(rc), Some(&data));
            }
            (false, LogLevel::Short) => {
                self.logger
                    .info(&self.msg_completed_async(rc), Some(&self.context_data()));
            }
            (false, LogLevel::Full) => {
                let mut data = self.context_data();
                add_output(&mut data, result);
                self.logger.info(&self.msg_completed_async(rc), Some(&data));
            }
            _ => {}
        }
    }

    fn context_data(&self) -> LogData {
        let mut data = self.metadata.clone();
        data.insert("Shell".into(), json!(self.shell.launcher()));
        data.insert("Command".into(), json!(self.command));
        data.insert("Input".into(), json!(self.input));
        data.insert("Working directory".into(), json!(self.cwd));
        data.insert("Extra environment".into(), json!(self.env));
        data
    }

    fn msg_id(&self) -> String {
        self.logger
            .highlight(&format!("#{}", self.id), Highlight::Id)
    }

    fn msg_rc(&self, rc: i32) -> String {
        let style = if rc == 0 {
            Highlight::Success
        } else {
            Highlight::Failure
        };
        self.logger.highlight(&rc.to_string(), style)
    }

    fn msg_execution(&self) -> String {
        format!(
            "{} {}",
            self.logger.highlight("Executing command", Highlight::Bold),
            self.msg_id()
        )
    }

    fn msg_completed_sync(&self, rc: i32) -> String {
        format!("Previous command completed with exit code {}", self.msg_rc(rc))
    }

    fn msg_completed_async(&self, rc: i32) -> String {
        format!(
            "{}{}{}{}",
            self.logger.highlight("Command ", Highlight::Bold),
            self.msg_id(),
            self.logger
                .highlight(" completed with exit code ", Highlight::Bold),
            self.msg_rc(rc)
        )
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!(id = self.id, "running process dropped, releasing its channel");
        }
    }
}

fn add_output(data: &mut LogData, result: &ProcessResult) {
    data.insert("Output".into(), json!(result.stdout()));
    data.insert("Error output".into(), json!(result.stderr()));
}

/// Remove common leading indentation and surrounding blank space
fn normalize_script(script: &str) -> String {
    let indent = script
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start().len()])
        .reduce(|common, current| {
            let len = common
                .char_indices()
                .zip(current.chars())
                .take_while(|((_, a), b)| a == b)
                .last()
                .map_or(0, |((i, a), _)| i + a.len_utf8());
            &common[..len]
        })
        .unwrap_or("");

    script
        .lines()
        .map(|line| line.strip_prefix(indent).unwrap_or(line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::local::LocalTransport;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        error: bool,
        message: String,
        data: Option<LogData>,
    }

    #[derive(Default)]
    struct RecordingLogger {
        records: Mutex<Vec<Record>>,
    }

    impl RecordingLogger {
        fn records(&self) -> Vec<Record> {
            self.records.lock().unwrap().clone()
        }
    }

    impl ProcessLogger for RecordingLogger {
        fn info(&self, message: &str, data: Option<&LogData>) {
            self.records.lock().unwrap().push(Record {
                error: false,
                message: message.to_string(),
                data: data.cloned(),
            });
        }

        fn error(&self, message: &str, data: Option<&LogData>) {
            self.records.lock().unwrap().push(Record {
                error: true,
                message: message.to_string(),
                data: data.cloned(),
            });
        }
    }

    async fn process(
        command: &str,
        options: RunOptions,
        blocking: bool,
    ) -> (Process, Arc<RecordingLogger>) {
        let transport = Arc::new(LocalTransport::new());
        transport.connect().await.unwrap();
        let logger = Arc::new(RecordingLogger::default());
        let process = Process::new(transport, Shell::SH, logger.clone(), command, options, blocking);
        (process, logger)
    }

    #[test]
    fn test_normalize_script() {
        assert_eq!(normalize_script("\n    echo a\n      echo b\n    "), "echo a\n  echo b");
        assert_eq!(normalize_script("echo a\n  echo b"), "echo a\n  echo b");
        assert_eq!(normalize_script("\techo x\n\n\techo y\n"), "echo x\n\necho y");
        assert_eq!(normalize_script(""), "");
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let (first, _) = process("true", RunOptions::default(), true).await;
        let (second, _) = process("true", RunOptions::default(), true).await;

        assert!(second.id() > first.id());
        assert_eq!(first.state(), ProcessState::Created);
    }

    #[tokio::test]
    async fn test_usage_errors_before_run() {
        let (mut process, logger) = process("cat", RunOptions::default(), false).await;

        assert!(process.stdin().unwrap_err().is_usage());
        assert!(process.stdout().unwrap_err().is_usage());
        assert!(process.send_eof().await.unwrap_err().is_usage());
        assert!(process.send_signal(Signal::Term).await.unwrap_err().is_usage());
        assert!(process.wait(true).await.unwrap_err().is_usage());
        assert!(logger.records().is_empty());
    }

    #[tokio::test]
    async fn test_run_twice() {
        let (mut process, _) = process("true", RunOptions::default(), true).await;

        process.run().await.unwrap();
        assert!(process.in_progress());
        assert!(process.run().await.unwrap_err().is_usage());
        assert_eq!(process.wait(true).await.unwrap().rc(), 0);
    }

    #[tokio::test]
    async fn test_input_payload() {
        let options = RunOptions::default().with_input("one\ntwo\n");
        let (mut process, _) = process("cat", options, true).await;

        process.run().await.unwrap();
        let result = process.wait(true).await.unwrap();

        assert_eq!(result.stdout_lines(), ["one", "two"]);
    }

    #[tokio::test]
    async fn test_stream_then_wait() {
        let (mut process, _) = process("echo a; echo b; echo c", RunOptions::default(), false).await;
        process.run().await.unwrap();

        let mut stdout = process.stdout().unwrap();
        assert_eq!(stdout.next_line().await.unwrap().as_deref(), Some("a"));

        let result = process.wait(true).await.unwrap();
        assert_eq!(result.stdout_lines(), ["b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_eof_is_sticky() {
        let (mut process, _) = process("echo only", RunOptions::default(), false).await;
        process.run().await.unwrap();

        let mut stdout = process.stdout().unwrap();
        assert_eq!(stdout.next_line().await.unwrap().as_deref(), Some("only"));
        assert_eq!(stdout.next_line().await.unwrap(), None);
        assert_eq!(stdout.next_line().await.unwrap(), None);

        let stderr = process.stderr().unwrap().collect_remaining().await.unwrap();
        assert!(stderr.is_empty());
        process.wait(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_raise_on_error() {
        let (mut process, _) = process("exit 3", RunOptions::default(), true).await;
        process.run().await.unwrap();

        let err = process.wait(true).await.unwrap_err();
        assert_eq!(err.rc(), Some(3));
    }

    #[tokio::test]
    async fn test_no_raise_keeps_error() {
        let (mut process, _) = process("echo out; exit 4", RunOptions::default(), true).await;
        process.run().await.unwrap();

        let result = process.wait(false).await.unwrap();
        assert_eq!(result.rc(), 4);
        let err = result.error().unwrap();
        assert_eq!(err.stdout_lines, ["out"]);
        assert_eq!(err.command, "echo out; exit 4");
    }

    #[tokio::test]
    async fn test_blocking_full_logging() {
        let (mut process, logger) = process("echo hi", RunOptions::default(), true).await;
        let id = process.id();
        process.run().await.unwrap();
        process.wait(true).await.unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, format!("Executing command #{id}"));
        let context = records[0].data.as_ref().unwrap();
        assert_eq!(context["Command"], json!("echo hi"));
        assert_eq!(context["Shell"], json!("/bin/sh -c"));
        assert_eq!(context["Input"], Value::Null);

        assert_eq!(records[1].message, "Previous command completed with exit code 0");
        let output = records[1].data.as_ref().unwrap();
        assert_eq!(output["Output"], json!("hi"));
        assert!(!output.contains_key("Command"));
    }

    #[tokio::test]
    async fn test_blocking_short_logging() {
        let options = RunOptions::default().with_log_level(LogLevel::Short);
        let (mut process, logger) = process("echo hi", options, true).await;
        process.run().await.unwrap();
        process.wait(true).await.unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].data, None);
    }

    #[tokio::test]
    async fn test_async_logging_carries_context() {
        let options = RunOptions::default()
            .with_log_level(LogLevel::Short)
            .with_metadata("Test", "logging");
        let (mut process, logger) = process("echo hi", options, false).await;
        let id = process.id();
        process.run().await.unwrap();
        process.wait(true).await.unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, format!("Command #{id} completed with exit code 0"));
        let data = records[1].data.as_ref().unwrap();
        assert_eq!(data["Command"], json!("echo hi"));
        assert_eq!(data["Test"], json!("logging"));
        assert!(!data.contains_key("Output"));
    }

    #[tokio::test]
    async fn test_error_level_logs_failures_only() {
        let options = RunOptions::default().with_log_level(LogLevel::Error);
        let (mut ok, logger) = process("true", options.clone(), true).await;
        ok.run().await.unwrap();
        ok.wait(true).await.unwrap();
        assert!(logger.records().is_empty());

        let (mut failing, logger) = process("echo boom >&2; exit 2", options, true).await;
        failing.run().await.unwrap();
        failing.wait(false).await.unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].error);
        assert_eq!(records[0].data.as_ref().unwrap()["Error output"], json!("boom"));
    }

    #[tokio::test]
    async fn test_silent() {
        let options = RunOptions::default().with_log_level(LogLevel::Silent);
        let (mut process, logger) = process("exit 1", options, true).await;
        process.run().await.unwrap();
        process.wait(false).await.unwrap();

        assert!(logger.records().is_empty());
    }

    #[tokio::test]
    async fn test_debug_override_forces_full() {
        let transport = Arc::new(LocalTransport::new());
        transport.connect().await.unwrap();
        let logger = Arc::new(RecordingLogger::default());
        let options = RunOptions::default().with_log_level(LogLevel::Silent);
        let mut process = Process::with_debug_override(
            transport,
            Shell::SH,
            logger.clone(),
            "echo hi",
            options,
            true,
            true,
        );
        assert_eq!(process.log_level(), LogLevel::Full);

        process.run().await.unwrap();
        process.wait(true).await.unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "Previous command completed with exit code 0");
        assert_eq!(records[1].data.as_ref().unwrap()["Output"], json!("hi"));
    }

    #[tokio::test]
    async fn test_input_ignored_by_command() {
        let options = RunOptions::default().with_input("x".repeat(1 << 20));
        let (mut process, _) = process("exit 5", options, true).await;

        process.run().await.unwrap();
        let result = process.wait(false).await.unwrap();

        assert_eq!(result.rc(), 5);
    }
}
