//! Wires configuration, secrets and clients into one reconciliation run.

use std::io::Write;

use idsync_core::{SyncError, SyncResult};
use idsync_directory::{DirectoryConfig, GoogleDirectoryClient};
use idsync_provisioning::{CancellationFlag, OutcomeStatus, RunSummary, SyncOrchestrator};
use idsync_scim_client::{ScimAuth, ScimClient};
use idsync_secrets::{build_provider, CachedSecretProvider};
use tracing::{info, warn};

use crate::config::{OutputFormat, SyncConfig};
use crate::error::{AppError, AppResult};

/// Build clients for `config` and run one reconciliation pass.
///
/// Ctrl-C cancels the run: operations already started finish, the rest are
/// reported as skipped.
pub async fn run(config: &SyncConfig) -> SyncResult<RunSummary> {
    let provider = build_provider(config.secret_provider, &config.provider_options)
        .await
        .map_err(|e| SyncError::configuration(e.to_string()))?;
    let secrets = CachedSecretProvider::new(provider);
    let credentials = config.resolve_credentials(&secrets).await?;
    let scim_auth = ScimAuth::bearer(credentials.scim_token());

    let mut directory_config = DirectoryConfig::new(config.google_admin.clone(), credentials.google)
        .with_base_url(config.google_api_url.clone());
    directory_config.timeout = config.request_timeout;
    let directory = GoogleDirectoryClient::new(directory_config).map_err(|e| SyncError::from_api(&e))?;

    let store = ScimClient::new(
        config.scim_endpoint.clone(),
        scim_auth,
        config.request_timeout,
    )
    .map_err(|e| SyncError::from_api(&e))?
    .with_membership_mode(config.membership_patch);

    info!(
        scim_endpoint = %config.scim_endpoint,
        identity_store_id = config.identity_store_id.as_deref().unwrap_or("-"),
        membership_patch = %config.membership_patch,
        "Clients ready"
    );

    let cancel = CancellationFlag::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling remaining operations");
                cancel.cancel();
            }
        })
    };

    let orchestrator =
        SyncOrchestrator::new(directory, store, config.options.clone()).with_cancellation(cancel);
    let result = orchestrator.run().await;
    signal.abort();
    result
}

/// Map a finished run to the process outcome.
pub fn outcome(result: SyncResult<RunSummary>) -> AppResult<RunSummary> {
    let summary = result?;
    if summary.has_failures() {
        return Err(AppError::PartialFailure {
            failed: summary.counts.failed,
        });
    }
    Ok(summary)
}

/// Write the summary to `out` in the requested format.
pub fn report(summary: &RunSummary, format: OutputFormat, out: &mut impl Write) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, summary)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            let counts = &summary.counts;
            let mode = if summary.dry_run { " (dry run)" } else { "" };
            writeln!(out, "Run {} [{}]{mode}", summary.run_id, summary.strategy)?;
            writeln!(
                out,
                "  users:   {} created, {} updated, {} deactivated",
                counts.users_created, counts.users_updated, counts.users_deactivated
            )?;
            writeln!(
                out,
                "  groups:  {} created, {} updated, {} deleted",
                counts.groups_created, counts.groups_updated, counts.groups_deleted
            )?;
            writeln!(
                out,
                "  members: {} added, {} removed",
                counts.members_added, counts.members_removed
            )?;
            writeln!(out, "  skipped: {}, failed: {}", counts.skipped, counts.failed)?;
            for failure in summary.failures() {
                if let OutcomeStatus::Failed { reason } = &failure.status {
                    writeln!(out, "  FAILED {} {}: {reason}", failure.action, failure.entity)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_provisioning::{Action, EntityKind, EntityOutcome, SyncStrategy};

    fn summary_with_failure() -> RunSummary {
        let mut summary = RunSummary::new(SyncStrategy::Groups, false);
        summary.record(EntityOutcome::applied(
            EntityKind::User,
            Action::Create,
            "lee@example.com",
        ));
        summary.record(EntityOutcome::failed(
            EntityKind::Group,
            Action::Create,
            "Admins",
            "409 Conflict",
        ));
        summary.finish();
        summary
    }

    #[test]
    fn test_outcome_exit_policy() {
        let clean = RunSummary::new(SyncStrategy::Groups, false);
        assert!(outcome(Ok(clean)).is_ok());

        let err = outcome(Ok(summary_with_failure())).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = outcome(Err(SyncError::fetch("directory", "timeout"))).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_text_report() {
        let mut out = Vec::new();
        report(&summary_with_failure(), OutputFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("users:   1 created"));
        assert!(text.contains("failed: 1"));
        assert!(text.contains("FAILED create Admins: 409 Conflict"));
    }

    #[test]
    fn test_json_report() {
        let mut out = Vec::new();
        report(&summary_with_failure(), OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["counts"]["users_created"], 1);
        assert_eq!(value["counts"]["failed"], 1);
        assert_eq!(value["outcomes"][1]["status"], "failed");
        assert_eq!(value["outcomes"][1]["reason"], "409 Conflict");
    }
}
