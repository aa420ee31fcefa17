//! Result types for command execution

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Context of a command that exited with non-zero return code
///
/// Captured when the process completes. The same value is kept inside
/// [`ProcessResult`] even for successful commands so that callers can apply
/// their own failure predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessError {
    /// Process id used in log records
    pub id: u64,
    /// Executed command
    pub command: String,
    /// Return code
    pub rc: i32,
    /// Working directory
    pub cwd: Option<String>,
    /// Additional environment variables
    pub env: BTreeMap<String, String>,
    /// Data written to standard input
    pub input: Option<String>,
    /// Standard output, line by line
    pub stdout_lines: Vec<String>,
    /// Standard error output, line by line
    pub stderr_lines: Vec<String>,
}

impl ProcessError {
    /// Create a new process error
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        command: impl Into<String>,
        rc: i32,
        cwd: Option<String>,
        env: BTreeMap<String, String>,
        input: Option<String>,
        stdout_lines: Vec<String>,
        stderr_lines: Vec<String>,
    ) -> Self {
        Self {
            id,
            command: command.into(),
            rc,
            cwd,
            env,
            input,
            stdout_lines,
            stderr_lines,
        }
    }

    /// Standard output joined with newlines
    #[must_use]
    pub fn stdout(&self) -> String {
        self.stdout_lines.join("\n")
    }

    /// Standard error output joined with newlines
    #[must_use]
    pub fn stderr(&self) -> String {
        self.stderr_lines.join("\n")
    }
}

/// Indent a multi-line value below its label, or render nothing if empty
fn dump(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let indent = " ".repeat(20);
    let mut out = String::new();
    for line in value.lines() {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&indent);
            out.push_str(line);
        }
    }
    out
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");

        writeln!(
            f,
            "Command #{} exited with return code {}:",
            self.id, self.rc
        )?;
        writeln!(f, "  Command:{}", dump(&self.command))?;
        writeln!(f, "  CWD:{}", dump(self.cwd.as_deref().unwrap_or_default()))?;
        writeln!(f, "  Env:{}", dump(&env))?;
        writeln!(f, "  Output:{}", dump(&self.stdout()))?;
        write!(f, "  Error output:{}", dump(&self.stderr()))
    }
}

impl std::error::Error for ProcessError {}

/// Result of a completed process
///
/// Built exactly once when the process is waited on. The fields are
/// read-only; the captured error can be raised later with [`throw`].
///
/// [`throw`]: ProcessResult::throw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult<E = ProcessError> {
    rc: i32,
    stdout: String,
    stderr: String,
    stdout_lines: Vec<String>,
    stderr_lines: Vec<String>,
    error: Option<E>,
}

impl<E> ProcessResult<E> {
    /// Create a new result from collected output lines
    pub fn new(rc: i32, stdout_lines: Vec<String>, stderr_lines: Vec<String>, error: Option<E>) -> Self {
        Self {
            rc,
            stdout: stdout_lines.join("\n"),
            stderr: stderr_lines.join("\n"),
            stdout_lines,
            stderr_lines,
            error,
        }
    }

    /// Return code
    #[must_use]
    pub fn rc(&self) -> i32 {
        self.rc
    }

    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.rc == 0
    }

    /// Standard output
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Standard error output
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Standard output, line by line
    #[must_use]
    pub fn stdout_lines(&self) -> &[String] {
        &self.stdout_lines
    }

    /// Standard error output, line by line
    #[must_use]
    pub fn stderr_lines(&self) -> &[String] {
        &self.stderr_lines
    }

    /// Captured error, available regardless of the return code
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    /// Replace the captured error with a caller-specific type
    pub fn map_error<F, T>(self, f: F) -> ProcessResult<T>
    where
        F: FnOnce(E) -> T,
    {
        ProcessResult {
            rc: self.rc,
            stdout: self.stdout,
            stderr: self.stderr,
            stdout_lines: self.stdout_lines,
            stderr_lines: self.stderr_lines,
            error: self.error.map(f),
        }
    }
}

impl<E> ProcessResult<E>
where
    E: Clone + Into<ExecError>,
{
    /// Raise the captured error
    ///
    /// The error can be raised even if the return code is 0, so the caller
    /// may fail on any condition. Never returns `Ok`.
    ///
    /// # Errors
    /// Returns the captured error, or `ExecError::NoError` if none is set
    pub fn throw(&self) -> Result<Infallible, ExecError> {
        match &self.error {
            Some(err) => Err(err.clone().into()),
            None => Err(ExecError::NoError),
        }
    }

    /// Raise the captured error only if the command failed
    ///
    /// # Errors
    /// Returns the captured error if the return code is non-zero
    pub fn check(&self) -> Result<(), ExecError> {
        if self.success() {
            return Ok(());
        }

        self.throw().map(|never| match never {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_error() -> ProcessError {
        let mut env = BTreeMap::new();
        env.insert("LANG".to_string(), "C".to_string());
        ProcessError::new(
            7,
            "grep foo bar",
            2,
            Some("/tmp".to_string()),
            env,
            None,
            vec![],
            vec!["grep: bar: No such file or directory".to_string()],
        )
    }

    #[test]
    fn test_joined_output_matches_lines() {
        let result: ProcessResult = ProcessResult::new(
            0,
            vec!["a".into(), "".into(), "c".into()],
            vec![],
            None,
        );

        assert_eq!(result.stdout(), result.stdout_lines().join("\n"));
        assert_eq!(result.stdout(), "a\n\nc");
        assert_eq!(result.stderr(), "");
    }

    #[test]
    fn test_throw_without_error() {
        let result: ProcessResult = ProcessResult::new(0, vec![], vec![], None);
        assert!(matches!(result.throw(), Err(ExecError::NoError)));
    }

    #[test]
    fn test_throw_is_repeatable() {
        let result = ProcessResult::new(2, vec![], vec![], Some(failed_error()));

        let first = result.throw().unwrap_err().to_string();
        let second = result.throw().unwrap_err().to_string();

        assert_eq!(first, second);
        assert_eq!(result.rc(), 2);
        assert!(result.error().is_some());
    }

    #[test]
    fn test_throw_on_success() {
        let mut err = failed_error();
        err.rc = 0;
        let result = ProcessResult::new(0, vec![], vec![], Some(err));

        assert!(result.check().is_ok());
        assert_eq!(result.throw().unwrap_err().rc(), Some(0));
    }

    #[test]
    fn test_check_failure() {
        let result = ProcessResult::new(2, vec![], vec![], Some(failed_error()));
        assert_eq!(result.check().unwrap_err().rc(), Some(2));
    }

    #[test]
    fn test_error_message() {
        let message = failed_error().to_string();
        let pad = " ".repeat(20);

        assert!(message.starts_with("Command #7 exited with return code 2:\n"));
        assert!(message.contains(&format!("  Command:\n{pad}grep foo bar\n")));
        assert!(message.contains(&format!("  CWD:\n{pad}/tmp\n")));
        assert!(message.contains(&format!("  Env:\n{pad}LANG=C\n")));
        assert!(message.contains("  Output:\n"));
        assert!(message.ends_with(&format!(
            "  Error output:\n{pad}grep: bar: No such file or directory"
        )));
    }

    #[test]
    fn test_map_error() {
        #[derive(Clone, Debug)]
        struct Wrapped(i32);

        let result = ProcessResult::new(2, vec![], vec![], Some(failed_error()));
        let mapped = result.map_error(|e| Wrapped(e.rc));

        assert_eq!(mapped.error().map(|w| w.0), Some(2));
    }
}
