//! Locating the private key used by the SSH transport
//!
//! Keys are only located, never generated or stored. A key coming from an
//! environment variable is materialized as a private temp file for the
//! lifetime of the transport.

use std::env;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use tracing::{debug, warn};

/// Counter that keeps temp key files of one process apart
static TEMP_KEY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Where the private key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Key file on disk
    Path(PathBuf),
    /// Base64-encoded key stored in an environment variable
    Env(String),
    /// SSH agent
    Agent,
}

impl KeySource {
    /// Pick a key source from optional config values
    ///
    /// An explicit path wins over an environment variable; with neither the
    /// agent is used.
    #[must_use]
    pub fn from_config(path: Option<&str>, env_var: Option<&str>) -> Self {
        match (path, env_var) {
            (Some(path), _) => KeySource::Path(PathBuf::from(path)),
            (None, Some(var)) => KeySource::Env(var.to_string()),
            (None, None) => KeySource::Agent,
        }
    }

    /// Resolve the source into something the SSH library can use
    ///
    /// # Errors
    /// Returns `KeyError` if the key file is missing or too open, or the
    /// environment variable is unset or not valid base64
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                check_permissions(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Env(var) => {
                let encoded = env::var(var).map_err(|_| KeyError::EnvNotSet(var.clone()))?;
                let key = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|_| KeyError::InvalidBase64(var.clone()))?;
                Ok(ResolvedKey::Temp(write_temp_key(&key)?))
            }
            KeySource::Agent => Ok(ResolvedKey::Agent),
        }
    }
}

/// Resolved key location
#[derive(Debug)]
pub enum ResolvedKey {
    /// Key file owned by the user
    Path(PathBuf),
    /// Temp file removed on drop
    Temp(PathBuf),
    /// SSH agent
    Agent,
}

impl ResolvedKey {
    /// Key file path, if the key lives on disk
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedKey::Path(p) | ResolvedKey::Temp(p) => Some(p),
            ResolvedKey::Agent => None,
        }
    }
}

impl Drop for ResolvedKey {
    fn drop(&mut self) {
        if let ResolvedKey::Temp(path) = self
            && let Err(e) = std::fs::remove_file(&*path)
        {
            warn!(path = %path.display(), error = %e, "failed to remove temp key");
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("environment variable {0} does not hold valid base64")]
    InvalidBase64(String),

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn check_permissions(path: &Path) -> Result<(), KeyError> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => KeyError::NotFound(path.display().to_string()),
        _ => KeyError::Io(e),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        // group and other must have no access
        if metadata.permissions().mode() & 0o77 != 0 {
            return Err(KeyError::BadPermissions(path.display().to_string()));
        }
    }

    #[cfg(not(unix))]
    let _ = metadata;

    Ok(())
}

fn write_temp_key(key: &[u8]) -> Result<PathBuf, KeyError> {
    let seq = TEMP_KEY_SEQ.fetch_add(1, Ordering::Relaxed);
    let path = env::temp_dir().join(format!("hostrun_key_{}_{seq}", std::process::id()));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&path)?;
    file.write_all(key)?;

    debug!(path = %path.display(), "wrote temporary SSH key");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        assert_eq!(
            KeySource::from_config(Some("/k"), Some("VAR")),
            KeySource::Path(PathBuf::from("/k"))
        );
        assert_eq!(
            KeySource::from_config(None, Some("VAR")),
            KeySource::Env("VAR".to_string())
        );
        assert_eq!(KeySource::from_config(None, None), KeySource::Agent);
    }

    #[test]
    fn test_missing_key_file() {
        let err = KeySource::Path(PathBuf::from("/nonexistent/hostrun/key"))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, KeyError::NotFound(_)));
    }

    #[test]
    fn test_unset_env() {
        let err = KeySource::Env("HOSTRUN_TEST_SURELY_UNSET_KEY".to_string())
            .resolve()
            .unwrap_err();
        assert!(matches!(err, KeyError::EnvNotSet(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_test");
        std::fs::write(&key, "secret").unwrap();

        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = KeySource::Path(key.clone()).resolve().unwrap_err();
        assert!(matches!(err, KeyError::BadPermissions(_)));

        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o600)).unwrap();
        let resolved = KeySource::Path(key.clone()).resolve().unwrap();
        assert_eq!(resolved.path(), Some(key.as_path()));
    }

    #[test]
    fn test_temp_key_removed_on_drop() {
        let path = write_temp_key(b"secret").unwrap();
        assert!(path.exists());

        drop(ResolvedKey::Temp(path.clone()));
        assert!(!path.exists());
    }
}
