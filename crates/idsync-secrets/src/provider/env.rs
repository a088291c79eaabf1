//! Environment variable secret provider.
//!
//! Logical names map to variable names by uppercasing and replacing every
//! character outside `[A-Z0-9]` with `_`, so `/idsync/scim-token` reads
//! `_IDSYNC_SCIM_TOKEN`.

use async_trait::async_trait;

use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider that reads secrets from environment variables.
#[derive(Debug, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve a logical secret name to an environment variable name.
    pub fn env_var_name(logical_name: &str) -> String {
        logical_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let env_var = Self::env_var_name(name);

        match std::env::var(&env_var) {
            Ok(value) if !value.is_empty() => {
                tracing::debug!(
                    secret_name = name,
                    env_var = %env_var,
                    "Secret loaded from environment variable"
                );
                Ok(SecretValue::new(name, value.into_bytes()))
            }
            // Empty value treated as not found
            _ => Err(SecretError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn provider_type(&self) -> &'static str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name_mapping() {
        assert_eq!(
            EnvSecretProvider::env_var_name("scim_access_token"),
            "SCIM_ACCESS_TOKEN"
        );
        assert_eq!(
            EnvSecretProvider::env_var_name("/idsync/scim-endpoint"),
            "_IDSYNC_SCIM_ENDPOINT"
        );
    }

    #[tokio::test]
    async fn test_get_secret_from_env() {
        std::env::set_var("IDSYNC_TEST_SECRET_PRESENT", "s3cret");
        let provider = EnvSecretProvider::new();

        let value = provider
            .get_secret("idsync_test_secret_present")
            .await
            .unwrap();
        assert_eq!(value.as_str().unwrap(), "s3cret");
        assert_eq!(value.name, "idsync_test_secret_present");

        std::env::remove_var("IDSYNC_TEST_SECRET_PRESENT");
    }

    #[tokio::test]
    async fn test_parameters_share_the_env_namespace() {
        std::env::set_var("IDSYNC_TEST_PARAM_REGION", "eu-west-1");
        let provider = EnvSecretProvider::new();

        let value = provider
            .get_parameter("idsync-test-param-region")
            .await
            .unwrap();
        assert_eq!(value.as_str().unwrap(), "eu-west-1");

        std::env::remove_var("IDSYNC_TEST_PARAM_REGION");
    }

    #[tokio::test]
    async fn test_missing_and_empty_are_not_found() {
        std::env::set_var("IDSYNC_TEST_SECRET_EMPTY", "");
        let provider = EnvSecretProvider::new();

        assert!(matches!(
            provider.get_secret("idsync_test_secret_empty").await,
            Err(SecretError::NotFound { .. })
        ));
        assert!(matches!(
            provider.get_secret("idsync_test_secret_absent").await,
            Err(SecretError::NotFound { .. })
        ));

        std::env::remove_var("IDSYNC_TEST_SECRET_EMPTY");
    }
}
