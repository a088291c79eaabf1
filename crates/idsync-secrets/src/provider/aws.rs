//! AWS Secrets Manager and SSM Parameter Store provider.
//!
//! Credentials come from the default AWS provider chain (environment,
//! profile, or instance/task role).

use async_trait::async_trait;

use crate::{SecretError, SecretProvider, SecretValue};

/// Reads secrets from Secrets Manager and parameters from Parameter Store.
#[derive(Debug)]
pub struct AwsSecretProvider {
    secrets: aws_sdk_secretsmanager::Client,
    parameters: aws_sdk_ssm::Client,
    region: String,
}

impl AwsSecretProvider {
    /// Build clients for `region`, or the region from the environment.
    pub async fn new(region: Option<&str>) -> Result<Self, SecretError> {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or(SecretError::ConfigError {
                detail: "No AWS region configured (set AWS_REGION or --region)".to_string(),
            })?;

        tracing::info!(region = %region, "AWS secret provider initialized");

        Ok(Self {
            secrets: aws_sdk_secretsmanager::Client::new(&sdk_config),
            parameters: aws_sdk_ssm::Client::new(&sdk_config),
            region,
        })
    }

    fn unavailable(&self, name: &str, e: impl std::fmt::Display) -> SecretError {
        SecretError::ProviderUnavailable {
            provider: "aws".to_string(),
            detail: format!("Failed to read '{name}' (region: {}): {e}", self.region),
        }
    }
}

#[async_trait]
impl SecretProvider for AwsSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let result = self
            .secrets
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    SecretError::NotFound {
                        name: name.to_string(),
                    }
                } else {
                    self.unavailable(name, e)
                }
            })?;

        let value_bytes = if let Some(secret_string) = result.secret_string() {
            secret_string.as_bytes().to_vec()
        } else if let Some(secret_binary) = result.secret_binary() {
            secret_binary.as_ref().to_vec()
        } else {
            return Err(SecretError::InvalidValue {
                name: name.to_string(),
                detail: "AWS secret has neither SecretString nor SecretBinary".to_string(),
            });
        };

        if value_bytes.is_empty() {
            return Err(SecretError::InvalidValue {
                name: name.to_string(),
                detail: "AWS secret value is empty".to_string(),
            });
        }

        let version = result.version_id().map(|v| v.to_string());
        tracing::info!(
            secret_name = name,
            version = ?version,
            "Secret loaded from AWS Secrets Manager"
        );

        let mut sv = SecretValue::new(name, value_bytes);
        sv.version = version;
        Ok(sv)
    }

    async fn get_parameter(&self, name: &str) -> Result<SecretValue, SecretError> {
        let result = self
            .parameters
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_parameter_not_found() {
                    SecretError::NotFound {
                        name: name.to_string(),
                    }
                } else {
                    self.unavailable(name, e)
                }
            })?;

        let parameter = result.parameter().ok_or_else(|| SecretError::NotFound {
            name: name.to_string(),
        })?;
        let value = parameter.value().unwrap_or_default();
        if value.is_empty() {
            return Err(SecretError::InvalidValue {
                name: name.to_string(),
                detail: "SSM parameter value is empty".to_string(),
            });
        }

        tracing::info!(
            parameter_name = name,
            version = parameter.version(),
            "Parameter loaded from SSM Parameter Store"
        );

        let mut sv = SecretValue::new(name, value.as_bytes().to_vec());
        sv.version = Some(parameter.version().to_string());
        Ok(sv)
    }

    fn provider_type(&self) -> &'static str {
        "aws"
    }
}
