//! hostrun-exec: Command execution on local and remote hosts
//!
//! A [`Connection`] runs commands through a [`Shell`] over a [`Transport`],
//! either blocking until they finish ([`Connection::run`]) or returning a
//! live [`Process`] that can be fed input, read line by line and signalled
//! ([`Connection::async_run`]).

pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod local;
pub mod logging;
pub mod process;
pub mod result;
pub mod shell;
pub mod ssh;
pub mod transport;

pub use config::{ConnectionConfig, HostDescriptor};
pub use connection::{Connection, ExpectOptions};
pub use error::ExecError;
pub use keys::KeySource;
pub use local::LocalTransport;
pub use logging::{Highlight, LogData, LogLevel, ProcessLogger, TracingLogger};
pub use process::{OutputLines, Process, ProcessInput, ProcessState, RunOptions};
pub use result::{ProcessError, ProcessResult};
pub use shell::{Shell, ShellKind};
pub use ssh::{ConnectionInfo, SshTransport, SshTransportBuilder};
pub use transport::{ChannelHandle, Signal, Transport};
