//! Sync orchestrator: one reconciliation run from fetch to summary.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use idsync_core::{
    ApiError, DirectoryMember, DirectorySource, DirectorySourceGroup, DirectorySourceUser,
    IdentityStore, MemberKind, Page, ProvisionedGroup, ProvisionedUser, SyncError, SyncResult,
};

use crate::apply::Applier;
use crate::cancel::CancellationFlag;
use crate::config::{SyncOptions, SyncStrategy};
use crate::diff::{build_plan, Retained};
use crate::mapper::{to_provisioned_group, to_provisioned_user};
use crate::summary::{Action, EntityKind, EntityOutcome, RunSummary};

/// Lifecycle of a run. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Fetching,
    Diffing,
    Applying,
    Reporting,
    Done,
    Failed,
}

impl RunState {
    /// Whether `next` may follow this state.
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Diffing)
                | (Diffing, Applying)
                | (Diffing, Reporting)
                | (Applying, Reporting)
                | (Reporting, Done)
                | (Idle | Fetching | Diffing | Applying, Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// Mapped directory snapshot.
#[derive(Debug, Default)]
struct DesiredState {
    users: Vec<ProvisionedUser>,
    groups: Vec<ProvisionedGroup>,
    /// Records that could not be mapped.
    rejected: Vec<EntityOutcome>,
    /// Source ids of users that could not be mapped.
    unmapped_user_ids: HashSet<String>,
}

/// Identity-store snapshot with group members filled in.
#[derive(Debug, Default)]
struct ActualState {
    users: Vec<ProvisionedUser>,
    groups: Vec<ProvisionedGroup>,
}

/// Drives one reconciliation run.
pub struct SyncOrchestrator<D, S> {
    directory: D,
    store: S,
    options: SyncOptions,
    cancel: CancellationFlag,
    state: watch::Sender<RunState>,
}

impl<D, S> SyncOrchestrator<D, S>
where
    D: DirectorySource,
    S: IdentityStore,
{
    pub fn new(directory: D, store: S, options: SyncOptions) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            directory,
            store,
            options,
            cancel: CancellationFlag::new(),
            state,
        }
    }

    /// Use an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels not-yet-started operations of this run.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one full reconciliation pass.
    ///
    /// Fatal errors (configuration, authentication, fetch failures) are
    /// returned as `Err`; per-entity failures land in the summary.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        let mut summary = RunSummary::new(self.options.strategy, self.options.dry_run);
        info!(
            run_id = %summary.run_id,
            strategy = %self.options.strategy,
            dry_run = self.options.dry_run,
            "Starting reconciliation run"
        );

        match self.execute(&mut summary).await {
            Ok(()) => {
                summary.finish();
                self.transition(RunState::Done);
                let counts = &summary.counts;
                info!(
                    run_id = %summary.run_id,
                    users_created = counts.users_created,
                    users_updated = counts.users_updated,
                    users_deactivated = counts.users_deactivated,
                    groups_created = counts.groups_created,
                    groups_updated = counts.groups_updated,
                    groups_deleted = counts.groups_deleted,
                    members_added = counts.members_added,
                    members_removed = counts.members_removed,
                    skipped = counts.skipped,
                    failed = counts.failed,
                    "Reconciliation run completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                error!(run_id = %summary.run_id, error = %e, "Reconciliation run failed");
                Err(e)
            }
        }
    }

    async fn execute(&self, summary: &mut RunSummary) -> SyncResult<()> {
        self.options.validate()?;

        self.transition(RunState::Fetching);
        let (desired, actual) = tokio::try_join!(self.fetch_desired(), self.fetch_actual())?;
        info!(
            desired_users = desired.users.len(),
            desired_groups = desired.groups.len(),
            store_users = actual.users.len(),
            store_groups = actual.groups.len(),
            "Snapshots fetched"
        );
        let retained = self.retained(&desired, &actual);
        summary.extend(desired.rejected);

        self.transition(RunState::Diffing);
        let plan = build_plan(
            &desired.users,
            &desired.groups,
            &actual.users,
            &actual.groups,
            &retained,
        );
        info!(
            create_users = plan.create_users.len(),
            update_users = plan.update_users.len(),
            deactivate_users = plan.deactivate_users.len(),
            create_groups = plan.create_groups.len(),
            update_groups = plan.update_groups.len(),
            membership_groups = plan.membership.len(),
            delete_groups = plan.delete_groups.len(),
            "Plan computed"
        );

        if self.options.dry_run {
            summary.extend(plan.skipped_outcomes("dry run"));
        } else {
            self.transition(RunState::Applying);
            Applier::new(
                &self.store,
                &self.options.retry,
                self.options.max_concurrency,
                &self.cancel,
            )
            .apply(&plan, summary)
            .await?;
        }

        self.transition(RunState::Reporting);
        Ok(())
    }

    /// Store resources the plan must leave untouched: anything on an ignore
    /// list, and users whose directory record was rejected by the mapper.
    fn retained(&self, desired: &DesiredState, actual: &ActualState) -> Retained {
        let scope = &self.options.scope;
        let mut retained = Retained::default();
        for user in &actual.users {
            let Some(id) = user.id.as_ref() else {
                continue;
            };
            let unmapped = user
                .external_id()
                .is_some_and(|external_id| desired.unmapped_user_ids.contains(external_id));
            if unmapped || scope.store_user_ignored(user) {
                debug!(user = %user.user_name, unmapped, "Store user held back");
                retained.users.insert(id.clone());
            }
        }
        for group in &actual.groups {
            if let Some(id) = group.id.as_ref().filter(|_| scope.store_group_ignored(group)) {
                debug!(group = %group.display_name, "Store group held back");
                retained.groups.insert(id.clone());
            }
        }
        retained
    }

    fn transition(&self, next: RunState) {
        let current = self.state();
        if current == next || current == RunState::Failed {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = ?current, to = ?next, "Unexpected run state transition");
        }
        debug!(from = ?current, to = ?next, "Run state transition");
        self.state.send_replace(next);
    }

    // ── Directory side ──────────────────────────────────────────────────

    async fn fetch_desired(&self) -> SyncResult<DesiredState> {
        let (users, groups) = match self.options.strategy {
            SyncStrategy::UsersAndGroups => self.fetch_users_and_groups().await,
            SyncStrategy::Groups => self.fetch_groups_with_members().await,
        }
        .map_err(|e| fetch_error("directory", e))?;

        Ok(map_desired(users, groups))
    }

    /// Users and groups matched independently; members limited to fetched users.
    async fn fetch_users_and_groups(
        &self,
    ) -> SyncResult<(Vec<DirectorySourceUser>, Vec<DirectorySourceGroup>)> {
        let directory = &self.directory;
        let user_query = self.options.user_match.query();
        let users: Vec<DirectorySourceUser> = self
            .collect_pages("directory.list_users", |token| async move {
                directory.list_users(user_query, token.as_deref()).await
            })
            .await?
            .into_iter()
            .filter(|user| self.in_user_scope(user))
            .collect();

        let mut groups = self.fetch_groups(true).await?;
        for group in &mut groups {
            let members = self.fetch_members(&group.id).await?;
            group.members = members
                .into_iter()
                .filter(|m| m.kind == MemberKind::User)
                .map(member_key)
                .collect();
        }

        Ok((users, groups))
    }

    /// Groups matched by filter; users are the union of their members.
    async fn fetch_groups_with_members(
        &self,
    ) -> SyncResult<(Vec<DirectorySourceUser>, Vec<DirectorySourceGroup>)> {
        let mut groups = self.fetch_groups(false).await?;

        let mut users = Vec::new();
        let mut seen_users = HashSet::new();
        // Member key to resolved user id, `None` for missing or ignored users.
        let mut resolved: HashMap<String, Option<String>> = HashMap::new();

        for group in &mut groups {
            let members = self.fetch_members(&group.id).await?;
            let mut member_ids = Vec::new();
            for member in members.into_iter().filter(|m| m.kind == MemberKind::User) {
                if self
                    .options
                    .scope
                    .member_ignored(&member.id, member.email.as_deref())
                {
                    continue;
                }
                let key = member_key(member);
                if !resolved.contains_key(&key) {
                    let user = self.fetch_user(&key).await?;
                    let user_id = match user {
                        Some(user) if self.in_user_scope(&user) => {
                            let id = user.id.clone();
                            if seen_users.insert(id.clone()) {
                                users.push(user);
                            }
                            Some(id)
                        }
                        Some(_) => None,
                        None => {
                            warn!(member = %key, group = %group.name, "Group member not found in directory");
                            None
                        }
                    };
                    resolved.insert(key.clone(), user_id);
                }
                if let Some(Some(user_id)) = resolved.get(&key) {
                    member_ids.push(user_id.clone());
                }
            }
            group.members = member_ids;
        }

        Ok((users, groups))
    }

    async fn fetch_groups(&self, use_include: bool) -> SyncResult<Vec<DirectorySourceGroup>> {
        let directory = &self.directory;
        let group_query = self.options.group_match.query();
        let groups = self
            .collect_pages("directory.list_groups", |token| async move {
                directory.list_groups(group_query, token.as_deref()).await
            })
            .await?;

        let total = groups.len();
        let groups: Vec<_> = groups
            .into_iter()
            .filter(|g| self.options.scope.group_in_scope(g, use_include))
            .collect();
        debug!(matched = total, in_scope = groups.len(), "Directory groups filtered");
        Ok(groups)
    }

    async fn fetch_members(&self, group_id: &str) -> SyncResult<Vec<DirectoryMember>> {
        let directory = &self.directory;
        self.collect_pages("directory.list_group_members", |token| async move {
            directory.list_group_members(group_id, token.as_deref()).await
        })
        .await
    }

    async fn fetch_user(&self, user_key: &str) -> SyncResult<Option<DirectorySourceUser>> {
        self.options
            .retry
            .execute("directory.get_user", || self.directory.get_user(user_key))
            .await
    }

    fn in_user_scope(&self, user: &DirectorySourceUser) -> bool {
        let in_scope = self.options.scope.user_in_scope(user);
        if !in_scope {
            debug!(user = %user.primary_email, "User ignored");
        }
        in_scope
    }

    // ── Identity store side ─────────────────────────────────────────────

    async fn fetch_actual(&self) -> SyncResult<ActualState> {
        self.fetch_store()
            .await
            .map_err(|e| fetch_error("identity store", e))
    }

    async fn fetch_store(&self) -> SyncResult<ActualState> {
        let store = &self.store;
        let users = self
            .collect_pages("store.list_users", |cursor| async move {
                store.list_users(cursor.as_deref()).await
            })
            .await?;
        let mut groups = self
            .collect_pages("store.list_groups", |cursor| async move {
                store.list_groups(cursor.as_deref()).await
            })
            .await?;

        // Listings may omit members.
        let retry = &self.options.retry;
        let members: Vec<(usize, Vec<String>)> = stream::iter(
            groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.members.is_empty())
                .filter_map(|(i, g)| g.id.clone().map(|id| (i, id))),
        )
        .map(|(index, group_id)| async move {
            retry
                .execute("store.get_group_members", || store.get_group_members(&group_id))
                .await
                .map(|members| (index, members))
        })
        .buffer_unordered(self.options.max_concurrency.max(1))
        .try_collect()
        .await?;

        for (index, group_members) in members {
            groups[index].members = group_members;
        }

        Ok(ActualState { users, groups })
    }

    /// Follow a paginated listing to the end, retrying each page.
    async fn collect_pages<T, E, F, Fut>(&self, operation: &str, mut fetch: F) -> SyncResult<Vec<T>>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
        E: ApiError,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .options
                .retry
                .execute(operation, || fetch(token.clone()))
                .await?;
            items.extend(page.items);
            match page.next {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    warn!(operation, token = %next, "Pagination token repeated, stopping");
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }
}

/// Member reference used for lookups: the email, or the id when the
/// directory reports no email.
fn member_key(member: DirectoryMember) -> String {
    match member.email {
        Some(email) if !email.trim().is_empty() => email,
        _ => member.id,
    }
}

fn fetch_error(side: &str, error: SyncError) -> SyncError {
    match error {
        SyncError::Configuration { .. } | SyncError::Authentication { .. } | SyncError::Fetch { .. } => {
            error
        }
        other => SyncError::fetch(side, other.to_string()),
    }
}

/// Map directory records; unmappable ones become failed outcomes.
fn map_desired(
    source_users: Vec<DirectorySourceUser>,
    source_groups: Vec<DirectorySourceGroup>,
) -> DesiredState {
    let mut state = DesiredState::default();
    // Lower-cased id or email to external id.
    let mut member_index: HashMap<String, String> = HashMap::new();

    for source in &source_users {
        match to_provisioned_user(source) {
            Ok(user) => {
                if let Some(external_id) = user.external_id() {
                    member_index.insert(source.id.trim().to_lowercase(), external_id.to_string());
                    member_index.insert(user.user_name.to_lowercase(), external_id.to_string());
                }
                state.users.push(user);
            }
            Err(e) => {
                warn!(error = %e, "Skipping unmappable user");
                if !source.id.trim().is_empty() {
                    state.unmapped_user_ids.insert(source.id.trim().to_string());
                }
                state.rejected.push(EntityOutcome::failed(
                    EntityKind::User,
                    Action::Map,
                    entity_key(&source.primary_email, &source.id),
                    e.to_string(),
                ));
            }
        }
    }

    for source in &source_groups {
        let resolved = to_provisioned_group(source, |member| {
            member_index.get(&member.trim().to_lowercase()).cloned()
        });
        match resolved {
            Ok(group) => state.groups.push(group),
            Err(e) => {
                warn!(error = %e, "Skipping unmappable group");
                state.rejected.push(EntityOutcome::failed(
                    EntityKind::Group,
                    Action::Map,
                    entity_key(&source.name, &source.id),
                    e.to_string(),
                ));
            }
        }
    }

    state
}

fn entity_key(preferred: &str, fallback: &str) -> String {
    if preferred.trim().is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}
