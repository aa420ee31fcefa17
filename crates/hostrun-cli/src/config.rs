//! Configuration loading and types

use std::path::{Path, PathBuf};

use hostrun_exec::HostDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Known hosts
    #[serde(default)]
    pub host: Vec<HostEntry>,
}

/// One `[[host]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Name used on the command line and in logs
    pub name: String,
    /// IP address or hostname
    pub addr: String,
    /// Connection mapping passed to `Connection::from_confdict`
    #[serde(default = "default_connection")]
    pub connection: serde_json::Value,
}

fn default_connection() -> serde_json::Value {
    json!({ "type": "ssh" })
}

impl HostEntry {
    /// Host descriptor of this entry
    pub fn descriptor(&self) -> HostDescriptor {
        HostDescriptor::new(&self.name, &self.addr)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `HOSTRUN_CONFIG` or `hostrun.toml`, if present
    ///
    /// # Errors
    /// Returns error if an existing file cannot be read or parsed
    pub fn load_default() -> eyre::Result<Option<Self>> {
        if let Ok(path) = std::env::var("HOSTRUN_CONFIG") {
            return Self::load(&PathBuf::from(path)).map(Some);
        }

        let path = PathBuf::from("hostrun.toml");
        if path.exists() {
            return Self::load(&path).map(Some);
        }

        Ok(None)
    }

    /// Find a host by name
    pub fn find(&self, name: &str) -> Option<&HostEntry> {
        self.host.iter().find(|h| h.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts() {
        let config: Config = toml::from_str(
            r#"
            [[host]]
            name = "client"
            addr = "10.0.0.5"

            [host.connection]
            type = "ssh"
            user = "admin"
            port = 2222

            [[host]]
            name = "win"
            addr = "10.0.0.6"
            "#,
        )
        .unwrap();

        let client = config.find("client").unwrap();
        assert_eq!(client.descriptor(), HostDescriptor::new("client", "10.0.0.5"));
        assert_eq!(client.connection["user"], json!("admin"));
        assert_eq!(client.connection["port"], json!(2222));

        let win = config.find("win").unwrap();
        assert_eq!(win.connection, json!({"type": "ssh"}));
        assert!(config.find("missing").is_none());
    }
}
