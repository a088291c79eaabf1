//! Run options for the reconciliation engine.

use serde::{Deserialize, Serialize};

use idsync_core::{RetryPolicy, SyncError, SyncResult};

use crate::filter::{MatchFilter, ScopeFilter};

/// How the desired user set is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// Users come from the group memberships of the matched groups.
    #[default]
    #[serde(rename = "groups")]
    Groups,
    /// Users and groups are matched independently.
    #[serde(rename = "users_groups")]
    UsersAndGroups,
}

impl SyncStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Groups => "groups",
            SyncStrategy::UsersAndGroups => "users_groups",
        }
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groups" => Ok(SyncStrategy::Groups),
            "users_groups" => Ok(SyncStrategy::UsersAndGroups),
            _ => Err(format!(
                "Unknown sync method: {s} (expected 'groups' or 'users_groups')"
            )),
        }
    }
}

/// Options for one reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub strategy: SyncStrategy,
    /// Directory query for users. Never evaluated by [`SyncStrategy::Groups`].
    pub user_match: MatchFilter,
    /// Directory query for groups.
    pub group_match: MatchFilter,
    pub scope: ScopeFilter,
    /// Stop after diffing and report the plan.
    pub dry_run: bool,
    /// Concurrent operations per apply stage.
    pub max_concurrency: usize,
    /// Retry policy wrapped around every external call.
    pub retry: RetryPolicy,
}

impl SyncOptions {
    /// Options matching everything for `strategy`.
    #[must_use]
    pub fn new(strategy: SyncStrategy) -> Self {
        Self {
            strategy,
            user_match: MatchFilter::all(),
            group_match: MatchFilter::all(),
            scope: ScopeFilter::default(),
            dry_run: false,
            max_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Reject option combinations that cannot produce a meaningful run.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_concurrency == 0 {
            return Err(SyncError::configuration(
                "max_concurrency must be at least 1",
            ));
        }
        if self.strategy == SyncStrategy::UsersAndGroups && self.user_match.is_empty() {
            return Err(SyncError::configuration(
                "user_match is required for the users_groups sync method",
            ));
        }
        if self.group_match.is_empty() {
            return Err(SyncError::configuration("group_match must not be empty"));
        }
        Ok(())
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new(SyncStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("groups".parse::<SyncStrategy>().unwrap(), SyncStrategy::Groups);
        assert_eq!(
            "Users_Groups".parse::<SyncStrategy>().unwrap(),
            SyncStrategy::UsersAndGroups
        );
        assert!("users".parse::<SyncStrategy>().is_err());
        assert_eq!(SyncStrategy::UsersAndGroups.to_string(), "users_groups");
        assert_eq!(
            serde_json::to_string(&SyncStrategy::UsersAndGroups).unwrap(),
            "\"users_groups\""
        );
    }

    #[test]
    fn test_default_options_are_valid() {
        let options = SyncOptions::default();
        assert_eq!(options.strategy, SyncStrategy::Groups);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_users_groups_requires_user_match() {
        let mut options = SyncOptions::new(SyncStrategy::UsersAndGroups);
        options.user_match = MatchFilter::new("");
        assert!(matches!(
            options.validate(),
            Err(SyncError::Configuration { .. })
        ));

        // The groups strategy never evaluates the user filter.
        options.strategy = SyncStrategy::Groups;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let options = SyncOptions::default().with_max_concurrency(0);
        assert!(options.validate().is_err());
    }
}
