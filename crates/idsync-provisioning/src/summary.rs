//! Per-run outcome log and aggregate counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SyncStrategy;

/// Kind of entity an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    Membership,
}

/// What was (or would have been) done to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Deactivate,
    Delete,
    AddMember,
    RemoveMember,
    /// Directory record could not be mapped.
    Map,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Deactivate => "deactivate",
            Action::Delete => "delete",
            Action::AddMember => "add_member",
            Action::RemoveMember => "remove_member",
            Action::Map => "map",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Result of one operation on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub kind: EntityKind,
    pub action: Action,
    /// Human-readable entity key (username, group name, `group <- member`).
    pub entity: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl EntityOutcome {
    pub fn applied(kind: EntityKind, action: Action, entity: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            entity: entity.into(),
            status: OutcomeStatus::Applied,
        }
    }

    pub fn skipped(
        kind: EntityKind,
        action: Action,
        entity: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            action,
            entity: entity.into(),
            status: OutcomeStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(
        kind: EntityKind,
        action: Action,
        entity: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            action,
            entity: entity.into(),
            status: OutcomeStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Aggregate counts over the outcome log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub users_created: u32,
    pub users_updated: u32,
    pub users_deactivated: u32,
    pub groups_created: u32,
    pub groups_updated: u32,
    pub groups_deleted: u32,
    pub members_added: u32,
    pub members_removed: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl RunCounts {
    fn record(&mut self, outcome: &EntityOutcome) {
        match outcome.status {
            OutcomeStatus::Skipped { .. } => self.skipped += 1,
            OutcomeStatus::Failed { .. } => self.failed += 1,
            OutcomeStatus::Applied => match (outcome.kind, outcome.action) {
                (EntityKind::User, Action::Create) => self.users_created += 1,
                (EntityKind::User, Action::Update) => self.users_updated += 1,
                (EntityKind::User, Action::Deactivate) => self.users_deactivated += 1,
                (EntityKind::Group, Action::Create) => self.groups_created += 1,
                (EntityKind::Group, Action::Update) => self.groups_updated += 1,
                (EntityKind::Group, Action::Delete) => self.groups_deleted += 1,
                (_, Action::AddMember) => self.members_added += 1,
                (_, Action::RemoveMember) => self.members_removed += 1,
                _ => {}
            },
        }
    }

    /// Number of applied changes.
    #[must_use]
    pub fn changes(&self) -> u32 {
        self.users_created
            + self.users_updated
            + self.users_deactivated
            + self.groups_created
            + self.groups_updated
            + self.groups_deleted
            + self.members_added
            + self.members_removed
    }
}

/// Summary of one reconciliation run. Produced once, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub strategy: SyncStrategy,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: RunCounts,
    pub outcomes: Vec<EntityOutcome>,
}

impl RunSummary {
    #[must_use]
    pub fn new(strategy: SyncStrategy, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            counts: RunCounts::default(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: EntityOutcome) {
        self.counts.record(&outcome);
        self.outcomes.push(outcome);
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = EntityOutcome>) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Run duration, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
