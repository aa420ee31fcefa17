//! Shells that turn a script into a literal command line
//!
//! A [`Shell`] wraps the user's script together with environment exports and
//! a working directory change into a single string that a transport can pass
//! to its "execute string" primitive.

use std::collections::BTreeMap;
use std::fmt;

/// Quoting rules used by a shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    /// POSIX shell (`bash`, `sh`)
    Posix,
    /// Windows `PowerShell`
    PowerShell,
}

/// Shell that executes user scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shell {
    name: &'static str,
    launcher: &'static str,
    kind: ShellKind,
}

impl Shell {
    /// GNU bash
    pub const BASH: Shell = Shell {
        name: "bash",
        launcher: "/usr/bin/bash -c",
        kind: ShellKind::Posix,
    };

    /// System POSIX shell
    pub const SH: Shell = Shell {
        name: "sh",
        launcher: "/bin/sh -c",
        kind: ShellKind::Posix,
    };

    /// Windows `PowerShell`
    pub const POWERSHELL: Shell = Shell {
        name: "powershell",
        launcher: "powershell -NonInteractive -Command",
        kind: ShellKind::PowerShell,
    };

    /// Look up a shell by its name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Shell> {
        match name.to_lowercase().as_str() {
            "bash" => Some(Self::BASH),
            "sh" => Some(Self::SH),
            "powershell" | "pwsh" => Some(Self::POWERSHELL),
            _ => None,
        }
    }

    /// Shell name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Non-interactive launcher that receives the script as its argument
    #[must_use]
    pub fn launcher(&self) -> &'static str {
        self.launcher
    }

    /// Quoting rules of this shell
    #[must_use]
    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    /// Create a complete command line that executes `script` in this shell
    ///
    /// Environment variables are exported first, then the working directory
    /// is changed (if given) and finally the script runs. Every value is
    /// quoted so it stays a single token.
    #[must_use]
    pub fn build_command_line(
        &self,
        script: &str,
        cwd: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> String {
        let mut full = String::new();

        match self.kind {
            ShellKind::Posix => {
                for (key, value) in env {
                    full.push_str(&format!("export {key}={}\n", quote(value)));
                }
                if let Some(cwd) = cwd {
                    full.push_str(&format!("cd {}\n", quote(cwd)));
                }
            }
            ShellKind::PowerShell => {
                for (key, value) in env {
                    full.push_str(&format!("$Env:{key} = {}\n", quote_powershell(value)));
                }
                if let Some(cwd) = cwd {
                    full.push_str(&format!("cd {}\n", quote_powershell(cwd)));
                }
            }
        }

        if !full.is_empty() {
            full.push('\n');
        }
        full.push_str(script.trim());

        let escaped = match self.kind {
            // bash -c '...': close the quote, emit a literal ', reopen
            ShellKind::Posix => full.replace('\'', "'\"'\"'"),
            ShellKind::PowerShell => full.replace('\'', "''").replace('"', "\\\""),
        };

        format!("{} '{escaped}'", self.launcher)
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Characters that never need quoting in a POSIX shell word
fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-' | '_')
}

/// Quote a value as a single POSIX shell word
#[must_use]
pub fn quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }

    if value.chars().all(is_safe_char) {
        return value.to_string();
    }

    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

/// Quote a value as a `PowerShell` single-quoted literal
#[must_use]
pub fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Join arguments into one POSIX command line, quoting each of them
#[must_use]
pub fn join_args<I, S>(argv: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    argv.into_iter()
        .map(|arg| quote(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
