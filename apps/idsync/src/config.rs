//! Command-line and environment configuration.
//!
//! Every option has a long flag and an `IDSYNC_*` environment variable.
//! Credentials may be given literally or as `secret:<name>` / `param:<name>`
//! references, resolved through the run's [`CachedSecretProvider`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use idsync_core::{RetryPolicy, SyncError, SyncResult};
use idsync_directory::{GoogleCredentials, DEFAULT_BASE_URL};
use idsync_provisioning::{MatchFilter, NameList, ScopeFilter, SyncOptions, SyncStrategy};
use idsync_scim_client::MembershipPatchMode;
use idsync_secrets::{CachedSecretProvider, ProviderKind, ProviderOptions, SecretRef};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::logging::LogFormat;

/// Summary output on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Counts and failures as plain lines.
    #[default]
    Text,
    /// The full run summary as JSON.
    Json,
}

/// idsync - sync Google Workspace users and groups to AWS IAM Identity Center
#[derive(Debug, Parser)]
#[command(name = "idsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Google Workspace admin impersonated by the service account
    #[arg(long, env = "IDSYNC_GOOGLE_ADMIN")]
    pub google_admin: Option<String>,

    /// Service-account key: JSON document, path, or secret reference
    #[arg(
        long,
        env = "IDSYNC_GOOGLE_CREDENTIALS",
        default_value = "credentials.json",
        hide_env_values = true
    )]
    pub google_credentials: String,

    /// Directory API base URL
    #[arg(long, env = "IDSYNC_GOOGLE_API_URL", default_value = DEFAULT_BASE_URL, hide = true)]
    pub google_api_url: String,

    /// SCIM endpoint of the identity store
    #[arg(long, env = "IDSYNC_SCIM_ENDPOINT")]
    pub scim_endpoint: Option<String>,

    /// SCIM bearer token, or a secret reference
    #[arg(long, env = "IDSYNC_SCIM_ACCESS_TOKEN", hide_env_values = true)]
    pub scim_access_token: Option<String>,

    /// Users to ignore (emails or ids, comma separated)
    #[arg(long, env = "IDSYNC_IGNORE_USERS", value_delimiter = ',')]
    pub ignore_users: Vec<String>,

    /// Groups to ignore (names or emails, comma separated)
    #[arg(long, env = "IDSYNC_IGNORE_GROUPS", value_delimiter = ',')]
    pub ignore_groups: Vec<String>,

    /// Groups to include in users_groups mode (comma separated)
    #[arg(long, env = "IDSYNC_INCLUDE_GROUPS", value_delimiter = ',')]
    pub include_groups: Vec<String>,

    /// Directory query selecting users (users_groups mode)
    #[arg(long, env = "IDSYNC_USER_MATCH", default_value = "*")]
    pub user_match: String,

    /// Directory query selecting groups
    #[arg(long, env = "IDSYNC_GROUP_MATCH", default_value = "*")]
    pub group_match: String,

    /// Sync method: groups or users_groups
    #[arg(long, env = "IDSYNC_SYNC_METHOD", default_value = "groups")]
    pub sync_method: String,

    /// AWS region for the aws secret provider
    #[arg(long, env = "IDSYNC_REGION")]
    pub region: Option<String>,

    /// Identity store id, recorded in run logs
    #[arg(long, env = "IDSYNC_IDENTITY_STORE_ID")]
    pub identity_store_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "IDSYNC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format
    #[arg(long, env = "IDSYNC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Force debug logging
    #[arg(short, long, env = "IDSYNC_DEBUG")]
    pub debug: bool,

    /// Compute the plan without writing to the identity store
    #[arg(long, env = "IDSYNC_DRY_RUN")]
    pub dry_run: bool,

    /// Concurrent store writes per stage
    #[arg(long, env = "IDSYNC_MAX_CONCURRENCY", default_value_t = 4)]
    pub max_concurrency: usize,

    /// Membership PATCH style: incremental or replace
    #[arg(long, env = "IDSYNC_MEMBERSHIP_PATCH", default_value = "incremental")]
    pub membership_patch: String,

    /// Retries per call after the first attempt
    #[arg(long, env = "IDSYNC_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[arg(long, env = "IDSYNC_RETRY_BASE_DELAY_MS", default_value_t = 1000)]
    pub retry_base_delay_ms: u64,

    /// Backoff delay cap in seconds
    #[arg(long, env = "IDSYNC_RETRY_MAX_DELAY_SECS", default_value_t = 60)]
    pub retry_max_delay_secs: u64,

    /// Total time budget per call, retries included, in seconds
    #[arg(long, env = "IDSYNC_RETRY_MAX_ELAPSED_SECS", default_value_t = 300)]
    pub retry_max_elapsed_secs: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "IDSYNC_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Secret backend for references: env, file or aws
    #[arg(long, env = "IDSYNC_SECRET_PROVIDER", default_value = "env")]
    pub secret_provider: String,

    /// Root directory for the file secret provider
    #[arg(long, env = "IDSYNC_SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Summary format on stdout
    #[arg(long, env = "IDSYNC_OUTPUT", value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Validated run configuration. Credential fields may still be references.
#[derive(Debug)]
pub struct SyncConfig {
    pub google_admin: String,
    pub google_credentials: SecretRef,
    pub google_api_url: String,
    pub scim_endpoint: String,
    pub scim_access_token: SecretRef,
    pub identity_store_id: Option<String>,
    pub options: SyncOptions,
    pub membership_patch: MembershipPatchMode,
    pub request_timeout: Duration,
    pub secret_provider: ProviderKind,
    pub provider_options: ProviderOptions,
    pub output: OutputFormat,
}

/// Credentials resolved for one run.
pub struct ResolvedCredentials {
    pub google: GoogleCredentials,
    scim_token: SecretString,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("google", &self.google)
            .field("scim_token", &"[REDACTED]")
            .finish()
    }
}

impl SyncConfig {
    /// Build and validate the configuration from parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` for missing or malformed values.
    pub fn from_cli(cli: Cli) -> SyncResult<Self> {
        let strategy = SyncStrategy::from_str(&cli.sync_method).map_err(SyncError::configuration)?;
        let membership_patch =
            MembershipPatchMode::from_str(&cli.membership_patch).map_err(SyncError::configuration)?;
        let secret_provider = ProviderKind::from_str(&cli.secret_provider)
            .map_err(|e| SyncError::configuration(e.to_string()))?;

        let mut retry = RetryPolicy::new(
            cli.max_retries,
            Duration::from_millis(cli.retry_base_delay_ms),
        );
        retry.max_delay = Duration::from_secs(cli.retry_max_delay_secs);
        retry.max_elapsed = Duration::from_secs(cli.retry_max_elapsed_secs);

        let options = SyncOptions {
            strategy,
            user_match: MatchFilter::new(cli.user_match),
            group_match: MatchFilter::new(cli.group_match),
            scope: ScopeFilter {
                ignore_users: NameList::new(cli.ignore_users),
                ignore_groups: NameList::new(cli.ignore_groups),
                include_groups: NameList::new(cli.include_groups),
            },
            dry_run: cli.dry_run,
            max_concurrency: cli.max_concurrency,
            retry,
        };

        let config = Self {
            google_admin: cli.google_admin.unwrap_or_default().trim().to_string(),
            google_credentials: SecretRef::parse(cli.google_credentials.trim()),
            google_api_url: cli.google_api_url,
            scim_endpoint: cli
                .scim_endpoint
                .unwrap_or_default()
                .trim()
                .trim_end_matches('/')
                .to_string(),
            scim_access_token: SecretRef::parse(cli.scim_access_token.unwrap_or_default().trim()),
            identity_store_id: cli.identity_store_id.filter(|id| !id.trim().is_empty()),
            options,
            membership_patch,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            secret_provider,
            provider_options: ProviderOptions {
                secrets_dir: cli.secrets_dir,
                region: cli.region,
            },
            output: cli.output,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> SyncResult<()> {
        if self.google_admin.is_empty() {
            return Err(SyncError::configuration("google_admin is required"));
        }
        if is_blank(&self.google_credentials) {
            return Err(SyncError::configuration("google_credentials is required"));
        }
        if self.scim_endpoint.is_empty() {
            return Err(SyncError::configuration("scim_endpoint is required"));
        }
        if !self.scim_endpoint.starts_with("http://") && !self.scim_endpoint.starts_with("https://") {
            return Err(SyncError::configuration(format!(
                "scim_endpoint '{}' is not an http(s) URL",
                self.scim_endpoint
            )));
        }
        if is_blank(&self.scim_access_token) {
            return Err(SyncError::configuration("scim_access_token is required"));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::configuration(
                "request_timeout_secs must be at least 1",
            ));
        }
        self.options.validate()
    }

    /// Resolve credential references and parse the service-account key.
    ///
    /// A literal `google_credentials` value starting with `{` is the key
    /// document itself; any other literal is a path to it.
    pub async fn resolve_credentials(
        &self,
        secrets: &CachedSecretProvider,
    ) -> SyncResult<ResolvedCredentials> {
        let scim_token = secrets
            .resolve(&self.scim_access_token)
            .await
            .map_err(|e| SyncError::configuration(format!("scim_access_token: {e}")))?;

        let key_document = match &self.google_credentials {
            SecretRef::Literal(value) if !value.trim_start().starts_with('{') => {
                debug!(path = %value, "Reading service account key");
                tokio::fs::read_to_string(value).await.map_err(|e| {
                    SyncError::configuration(format!(
                        "google_credentials: cannot read '{value}': {e}"
                    ))
                })?
            }
            reference => secrets
                .resolve(reference)
                .await
                .map_err(|e| SyncError::configuration(format!("google_credentials: {e}")))?,
        };
        let google = GoogleCredentials::from_service_account_json(&key_document)
            .map_err(|e| SyncError::configuration(format!("google_credentials: {e}")))?;

        Ok(ResolvedCredentials {
            google,
            scim_token: SecretString::from(scim_token),
        })
    }
}

fn is_blank(reference: &SecretRef) -> bool {
    match reference {
        SecretRef::Secret(name) | SecretRef::Parameter(name) => name.is_empty(),
        SecretRef::Literal(value) => value.trim().is_empty(),
    }
}

impl ResolvedCredentials {
    /// Bearer token for the SCIM endpoint.
    pub fn scim_token(&self) -> &str {
        self.scim_token.expose_secret()
    }
}
