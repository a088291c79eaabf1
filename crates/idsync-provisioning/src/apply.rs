//! Staged application of an operation plan to the identity store.
//!
//! Stages run in dependency order and each one is a barrier. Operations in a
//! stage run concurrently up to `max_concurrency`. A failed operation is
//! recorded and does not stop independent ones; operations that depend on a
//! failed creation are skipped. An authentication failure stops every
//! operation that has not started and aborts the run.

use std::collections::HashMap;
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use idsync_core::{IdentityStore, MembershipChange, RetryPolicy, SyncError, SyncResult};

use crate::cancel::CancellationFlag;
use crate::plan::{member_label, MembershipUpdate, OperationPlan};
use crate::summary::{Action, EntityKind, EntityOutcome, RunSummary};

/// Apply stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateUsers,
    UpdateUsers,
    CreateGroups,
    UpdateGroups,
    AddMembers,
    RemoveMembers,
    DeactivateUsers,
    DeleteGroups,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::CreateUsers => "create_users",
            Stage::UpdateUsers => "update_users",
            Stage::CreateGroups => "create_groups",
            Stage::UpdateGroups => "update_groups",
            Stage::AddMembers => "add_members",
            Stage::RemoveMembers => "remove_members",
            Stage::DeactivateUsers => "deactivate_users",
            Stage::DeleteGroups => "delete_groups",
        };
        f.write_str(s)
    }
}

/// `None` means the operation never started.
type StageResult<R> = Option<SyncResult<R>>;

/// One membership PATCH covering several members of a group.
struct MemberPatch {
    group_id: String,
    /// Outcome label per member, in `change` order.
    labels: Vec<String>,
    change: MembershipChange,
}

pub struct Applier<'a, S> {
    store: &'a S,
    retry: &'a RetryPolicy,
    max_concurrency: usize,
    cancel: &'a CancellationFlag,
    aborted: CancellationFlag,
}

impl<'a, S: IdentityStore> Applier<'a, S> {
    pub fn new(
        store: &'a S,
        retry: &'a RetryPolicy,
        max_concurrency: usize,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            store,
            retry,
            max_concurrency: max_concurrency.max(1),
            cancel,
            aborted: CancellationFlag::new(),
        }
    }

    /// Apply `plan`, appending every outcome to `summary`.
    ///
    /// Returns `Err` only for an authentication failure.
    pub async fn apply(&self, plan: &OperationPlan, summary: &mut RunSummary) -> SyncResult<()> {
        let mut user_ids = plan.known_user_ids.clone();
        let mut group_ids: HashMap<String, String> = HashMap::new();

        // Users
        let results = self
            .run_stage(
                Stage::CreateUsers,
                plan.create_users
                    .iter()
                    .map(|user| {
                        self.retry
                            .execute("store.create_user", move || self.store.create_user(user))
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (user, result) in plan.create_users.iter().zip(results) {
            if let (Some(external_id), Some(Ok(created))) = (user.external_id(), &result) {
                if let Some(store_id) = &created.id {
                    user_ids.insert(external_id.to_string(), store_id.clone());
                }
            }
            summary.record(self.outcome(EntityKind::User, Action::Create, &user.user_name, &result));
        }
        abort_on(auth)?;

        let results = self
            .run_stage(
                Stage::UpdateUsers,
                plan.update_users
                    .iter()
                    .map(|update| {
                        self.retry.execute("store.replace_user", move || {
                            self.store.replace_user(&update.store_id, &update.user)
                        })
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (update, result) in plan.update_users.iter().zip(results) {
            summary.record(self.outcome(
                EntityKind::User,
                Action::Update,
                &update.user.user_name,
                &result,
            ));
        }
        abort_on(auth)?;

        // Groups
        let results = self
            .run_stage(
                Stage::CreateGroups,
                plan.create_groups
                    .iter()
                    .map(|group| {
                        self.retry
                            .execute("store.create_group", move || self.store.create_group(group))
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (group, result) in plan.create_groups.iter().zip(results) {
            if let (Some(external_id), Some(Ok(created))) = (group.external_id(), &result) {
                if let Some(store_id) = &created.id {
                    group_ids.insert(external_id.to_string(), store_id.clone());
                }
            }
            summary.record(self.outcome(
                EntityKind::Group,
                Action::Create,
                &group.display_name,
                &result,
            ));
        }
        abort_on(auth)?;

        let results = self
            .run_stage(
                Stage::UpdateGroups,
                plan.update_groups
                    .iter()
                    .map(|update| {
                        self.retry.execute("store.update_group", move || {
                            self.store.update_group(&update.store_id, &update.group)
                        })
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (update, result) in plan.update_groups.iter().zip(results) {
            summary.record(self.outcome(
                EntityKind::Group,
                Action::Update,
                &update.group.display_name,
                &result,
            ));
        }
        abort_on(auth)?;

        // Membership
        let additions = self.member_additions(plan, &user_ids, &group_ids, summary);
        self.patch_members(Stage::AddMembers, Action::AddMember, &additions, summary)
            .await?;

        let removals = member_removals(plan, &user_ids);
        self.patch_members(Stage::RemoveMembers, Action::RemoveMember, &removals, summary)
            .await?;

        // Retirement
        let results = self
            .run_stage(
                Stage::DeactivateUsers,
                plan.deactivate_users
                    .iter()
                    .map(|user| {
                        self.retry.execute("store.deactivate_user", move || {
                            self.store.deactivate_user(&user.store_id)
                        })
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (user, result) in plan.deactivate_users.iter().zip(results) {
            summary.record(self.outcome(
                EntityKind::User,
                Action::Deactivate,
                &user.user_name,
                &result,
            ));
        }
        abort_on(auth)?;

        let results = self
            .run_stage(
                Stage::DeleteGroups,
                plan.delete_groups
                    .iter()
                    .map(|group| {
                        self.retry
                            .execute("store.delete_group", move || self.store.delete_group(&group.store_id))
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (group, result) in plan.delete_groups.iter().zip(results) {
            summary.record(self.outcome(
                EntityKind::Group,
                Action::Delete,
                &group.display_name,
                &result,
            ));
        }
        abort_on(auth)
    }

    /// Resolve additions to store ids, skipping members whose group or user
    /// was not created.
    fn member_additions(
        &self,
        plan: &OperationPlan,
        user_ids: &HashMap<String, String>,
        group_ids: &HashMap<String, String>,
        summary: &mut RunSummary,
    ) -> Vec<MemberPatch> {
        let mut patches = Vec::new();
        for update in plan.membership.iter().filter(|u| !u.add.is_empty()) {
            let label = |external_id: &str| {
                member_label(&update.group_name, plan.external_label(external_id))
            };

            let group_id = update
                .group_id
                .clone()
                .or_else(|| group_ids.get(&update.group_external_id).cloned());
            let Some(group_id) = group_id else {
                summary.extend(update.add.iter().map(|member| {
                    EntityOutcome::skipped(
                        EntityKind::Membership,
                        Action::AddMember,
                        label(member.as_str()),
                        "group was not created",
                    )
                }));
                continue;
            };

            let mut add = Vec::new();
            let mut labels = Vec::new();
            for external_id in &update.add {
                match user_ids.get(external_id) {
                    Some(store_id) => {
                        add.push(store_id.clone());
                        labels.push(label(external_id.as_str()));
                    }
                    None => summary.record(EntityOutcome::skipped(
                        EntityKind::Membership,
                        Action::AddMember,
                        label(external_id.as_str()),
                        "user was not created",
                    )),
                }
            }
            if add.is_empty() {
                continue;
            }

            patches.push(MemberPatch {
                group_id,
                labels,
                change: MembershipChange {
                    add,
                    remove: Vec::new(),
                    desired: resolve_desired(update, user_ids),
                },
            });
        }
        patches
    }

    async fn patch_members(
        &self,
        stage: Stage,
        action: Action,
        patches: &[MemberPatch],
        summary: &mut RunSummary,
    ) -> SyncResult<()> {
        let results = self
            .run_stage(
                stage,
                patches
                    .iter()
                    .map(|patch| {
                        self.retry.execute("store.patch_group_members", move || {
                            self.store.patch_group_members(&patch.group_id, &patch.change)
                        })
                    })
                    .collect(),
            )
            .await;
        let auth = auth_failure(&results);
        for (patch, result) in patches.iter().zip(results) {
            for label in &patch.labels {
                summary.record(self.outcome(EntityKind::Membership, action, label, &result));
            }
        }
        abort_on(auth)
    }

    /// Run one stage. Results are returned in input order.
    async fn run_stage<R, Fut>(&self, stage: Stage, operations: Vec<Fut>) -> Vec<StageResult<R>>
    where
        Fut: Future<Output = SyncResult<R>>,
    {
        if operations.is_empty() {
            return Vec::new();
        }
        info!(stage = %stage, operations = operations.len(), "Applying stage");

        let mut results: Vec<StageResult<R>> =
            std::iter::repeat_with(|| None).take(operations.len()).collect();
        let completed: Vec<(usize, StageResult<R>)> = stream::iter(operations.into_iter().enumerate())
            .map(|(index, operation)| async move {
                if self.cancel.is_cancelled() || self.aborted.is_cancelled() {
                    return (index, None);
                }
                let result = operation.await;
                if let Err(error @ SyncError::Authentication { .. }) = &result {
                    warn!(stage = %stage, error = %error, "Authentication failed, aborting run");
                    self.aborted.cancel();
                }
                (index, Some(result))
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (index, result) in completed {
            results[index] = result;
        }
        results
    }

    fn outcome<R>(
        &self,
        kind: EntityKind,
        action: Action,
        entity: &str,
        result: &StageResult<R>,
    ) -> EntityOutcome {
        match result {
            Some(Ok(_)) => EntityOutcome::applied(kind, action, entity),
            Some(Err(error)) => {
                warn!(entity, action = %action, error = %error, "Operation failed");
                EntityOutcome::failed(kind, action, entity, error.to_string())
            }
            None => EntityOutcome::skipped(kind, action, entity, self.skip_reason()),
        }
    }

    fn skip_reason(&self) -> &'static str {
        if self.aborted.is_cancelled() {
            "run aborted"
        } else {
            "cancelled"
        }
    }
}

fn member_removals(plan: &OperationPlan, user_ids: &HashMap<String, String>) -> Vec<MemberPatch> {
    plan.membership
        .iter()
        .filter(|u| !u.remove.is_empty())
        .filter_map(|update| {
            let group_id = update.group_id.clone()?;
            Some(MemberPatch {
                group_id,
                labels: update
                    .remove
                    .iter()
                    .map(|store_id| member_label(&update.group_name, plan.user_label(store_id)))
                    .collect(),
                change: MembershipChange {
                    add: Vec::new(),
                    remove: update.remove.clone(),
                    desired: resolve_desired(update, user_ids),
                },
            })
        })
        .collect()
}

/// Full target member list as store ids, unmanaged members included.
fn resolve_desired(update: &MembershipUpdate, user_ids: &HashMap<String, String>) -> Vec<String> {
    update
        .desired
        .iter()
        .filter_map(|external_id| user_ids.get(external_id).cloned())
        .chain(update.retained.iter().cloned())
        .collect()
}

fn auth_failure<R>(results: &[StageResult<R>]) -> Option<SyncError> {
    results.iter().find_map(|result| match result {
        Some(Err(error @ SyncError::Authentication { .. })) => Some(error.clone()),
        _ => None,
    })
}

fn abort_on(error: Option<SyncError>) -> SyncResult<()> {
    match error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
