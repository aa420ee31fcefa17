//! Building connections from configuration

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::ExecError;
use crate::keys::KeySource;
use crate::local::LocalTransport;
use crate::logging::TracingLogger;
use crate::shell::Shell;
use crate::ssh::SshTransportBuilder;
use crate::transport::Transport;

/// Host that a connection points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Name used in log records
    pub name: String,
    /// IP address or hostname
    pub addr: String,
}

impl HostDescriptor {
    /// Create a new host descriptor
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

/// Connection section of a host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Run commands on this machine
    Local {
        /// Shell name (`bash`, `sh`, `powershell`)
        #[serde(default = "default_shell")]
        shell: String,
    },
    /// Run commands over SSH
    Ssh {
        /// SSH port
        #[serde(default = "default_port")]
        port: u16,
        /// SSH user
        #[serde(default = "default_user")]
        user: String,
        /// Path to private key
        #[serde(default)]
        ssh_key: Option<String>,
        /// Environment variable holding a base64 private key
        #[serde(default)]
        ssh_key_env: Option<String>,
        /// Shell name (`bash`, `sh`, `powershell`)
        #[serde(default = "default_shell")]
        shell: String,
    },
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

impl ConnectionConfig {
    /// Parse a configuration mapping
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` if the mapping has the wrong shape
    pub fn from_value(confdict: &serde_json::Value) -> Result<Self, ExecError> {
        Self::deserialize(confdict).map_err(|e| ExecError::ConfigError(e.to_string()))
    }

    /// Configured shell
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` for an unknown shell name
    pub fn shell(&self) -> Result<Shell, ExecError> {
        let name = match self {
            ConnectionConfig::Local { shell } | ConnectionConfig::Ssh { shell, .. } => shell,
        };
        Shell::from_name(name).ok_or_else(|| ExecError::ConfigError(format!("unknown shell: {name}")))
    }
}

impl Connection {
    /// Create a connection from a host descriptor and a configuration mapping
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` if the mapping is invalid, or
    /// `ExecError::SshKeyError` if the configured key can not be resolved
    pub fn from_confdict(
        host: &HostDescriptor,
        confdict: &serde_json::Value,
    ) -> Result<Self, ExecError> {
        let config = ConnectionConfig::from_value(confdict)?;
        let shell = config.shell()?;

        let transport: Arc<dyn Transport> = match &config {
            ConnectionConfig::Local { .. } => Arc::new(LocalTransport::new()),
            ConnectionConfig::Ssh {
                port,
                user,
                ssh_key,
                ssh_key_env,
                ..
            } => {
                let key_source = KeySource::from_config(ssh_key.as_deref(), ssh_key_env.as_deref());
                Arc::new(
                    SshTransportBuilder::new(&host.addr, user)
                        .with_port(*port)
                        .with_key_source(key_source)
                        .build()?,
                )
            }
        };

        debug!(
            host = %host.name,
            transport = transport.transport_type(),
            shell = %shell,
            "created connection from config"
        );

        Ok(Connection::new(
            transport,
            shell,
            Arc::new(TracingLogger::new(&host.name)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_local_defaults() {
        let config = ConnectionConfig::from_value(&json!({"type": "local"})).unwrap();
        assert_eq!(
            config,
            ConnectionConfig::Local {
                shell: "bash".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ssh() {
        let config = ConnectionConfig::from_value(&json!({
            "type": "ssh",
            "port": 2222,
            "ssh_key_env": "HOST_KEY",
            "shell": "powershell"
        }))
        .unwrap();

        assert_eq!(
            config,
            ConnectionConfig::Ssh {
                port: 2222,
                user: "root".to_string(),
                ssh_key: None,
                ssh_key_env: Some("HOST_KEY".to_string()),
                shell: "powershell".to_string(),
            }
        );
        assert_eq!(config.shell().unwrap(), Shell::POWERSHELL);
    }

    #[test]
    fn test_invalid_confdict() {
        let host = HostDescriptor::new("client", "localhost");

        let err = Connection::from_confdict(&host, &json!({"type": "telnet"})).unwrap_err();
        assert!(matches!(err, ExecError::ConfigError(_)));

        let err = Connection::from_confdict(&host, &json!({"type": "local", "shell": "fish"}))
            .unwrap_err();
        assert!(matches!(err, ExecError::ConfigError(_)));
    }

    #[test]
    fn test_from_confdict() {
        let host = HostDescriptor::new("client", "localhost");

        let local = Connection::from_confdict(&host, &json!({"type": "local", "shell": "sh"})).unwrap();
        assert_eq!(local.shell(), Shell::SH);
        assert_eq!(local.transport().transport_type(), "local");

        let ssh = Connection::from_confdict(&host, &json!({"type": "ssh"})).unwrap();
        assert_eq!(ssh.shell(), Shell::BASH);
        assert_eq!(ssh.transport().transport_type(), "ssh");
        assert!(!ssh.is_connected());
    }

    #[test]
    fn test_missing_key_is_reported() {
        let host = HostDescriptor::new("client", "localhost");
        let err = Connection::from_confdict(
            &host,
            &json!({"type": "ssh", "ssh_key": "/nonexistent/hostrun/key"}),
        )
        .unwrap_err();

        assert!(matches!(err, ExecError::SshKeyError(_)));
    }
}
