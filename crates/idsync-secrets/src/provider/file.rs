//! File-based secret provider for mounted secret volumes.
//!
//! Each secret is a file under a root directory. Logical names are relative
//! paths; trailing newlines are stripped from the contents.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider that reads secrets from files under one directory.
#[derive(Debug)]
pub struct FileSecretProvider {
    root: PathBuf,
}

impl FileSecretProvider {
    /// Create a provider rooted at `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SecretError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SecretError::ConfigError {
                detail: format!("Secrets directory '{}' does not exist", root.display()),
            });
        }
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, SecretError> {
        let relative = Path::new(name.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.trim().is_empty() || escapes {
            return Err(SecretError::ConfigError {
                detail: format!("Invalid secret name '{name}'"),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Check file permissions and warn if world-readable.
    #[cfg(unix)]
    fn check_permissions(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            if metadata.permissions().mode() & 0o004 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    "Secret file is world-readable. Consider restricting permissions to 0600."
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) {}
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let path = self.path_for(name)?;

        let contents = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SecretError::NotFound {
                name: name.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => SecretError::ProviderUnavailable {
                provider: "file".to_string(),
                detail: format!(
                    "Cannot read secret file '{}': permission denied",
                    path.display()
                ),
            },
            _ => SecretError::ProviderUnavailable {
                provider: "file".to_string(),
                detail: format!("Failed to read '{}': {e}", path.display()),
            },
        })?;

        Self::check_permissions(&path);

        let mut value = contents;
        while matches!(value.last(), Some(b'\n' | b'\r')) {
            value.pop();
        }
        if value.is_empty() {
            return Err(SecretError::InvalidValue {
                name: name.to_string(),
                detail: format!("Secret file '{}' is empty", path.display()),
            });
        }

        tracing::debug!(secret_name = name, path = %path.display(), "Secret loaded from file");
        Ok(SecretValue::new(name, value))
    }

    fn provider_type(&self) -> &'static str {
        "file"
    }
}
