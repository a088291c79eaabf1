//! Diff engine: desired vs actual snapshots into an operation plan.
//!
//! Resources are correlated by external id. Store resources without an
//! external id are candidates for a one-time fallback match (username or
//! primary email for users, display name for groups, case-insensitive); a
//! fallback match backfills the external id instead of creating a duplicate.
//! Store resources without an external id that match nothing are not owned
//! and are left alone.

use std::collections::{HashMap, HashSet};

use idsync_core::{ProvisionedGroup, ProvisionedUser};
use tracing::{debug, warn};

use crate::mapper::{equivalent, groups_equivalent};
use crate::plan::{
    GroupDeletion, GroupUpdate, MembershipUpdate, OperationPlan, UserDeactivation, UserUpdate,
};

/// User partition of a plan.
#[derive(Debug, Clone, Default)]
pub struct UserPlan {
    pub create: Vec<ProvisionedUser>,
    pub update: Vec<UserUpdate>,
    pub deactivate: Vec<UserDeactivation>,
    /// External id to store id for every desired user found in the store.
    pub matched: HashMap<String, String>,
}

/// Group partition of a plan.
#[derive(Debug, Clone, Default)]
pub struct GroupPlan {
    pub create: Vec<ProvisionedGroup>,
    pub update: Vec<GroupUpdate>,
    pub delete: Vec<GroupDeletion>,
    /// External id to store id for every desired group found in the store.
    pub matched: HashMap<String, String>,
}

/// Set difference between two member lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

/// Store resources, by store id, that no operation may modify: ignored
/// entities and users whose directory record failed to map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retained {
    pub users: HashSet<String>,
    pub groups: HashSet<String>,
}

impl Retained {
    fn holds_user(&self, user: &ProvisionedUser) -> bool {
        user.id.as_ref().is_some_and(|id| self.users.contains(id))
    }

    fn holds_group(&self, group: &ProvisionedGroup) -> bool {
        group.id.as_ref().is_some_and(|id| self.groups.contains(id))
    }
}

/// Owned resources keyed by external id, plus the unowned fallback pool.
struct Correlation<'a, T> {
    owned: HashMap<&'a str, &'a T>,
    unowned: Vec<&'a T>,
    used: HashSet<usize>,
}

impl<'a, T> Correlation<'a, T> {
    fn new(actual: &'a [T], external_id: impl Fn(&T) -> Option<&str>) -> Self {
        let mut owned = HashMap::new();
        let mut unowned = Vec::new();
        for resource in actual {
            match external_id(resource) {
                Some(id) => {
                    owned.entry(id).or_insert(resource);
                }
                None => unowned.push(resource),
            }
        }
        Self {
            owned,
            unowned,
            used: HashSet::new(),
        }
    }

    /// Claim the first unused unowned resource accepted by `matches`.
    fn claim_fallback(&mut self, matches: impl Fn(&T) -> bool) -> Option<&'a T> {
        let index = self
            .unowned
            .iter()
            .enumerate()
            .find(|(i, r)| !self.used.contains(i) && matches(**r))
            .map(|(i, _)| i)?;
        self.used.insert(index);
        Some(self.unowned[index])
    }
}

fn same_key(a: &str, b: &str) -> bool {
    !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim())
}

/// Diff users. Desired users carry external ids (see the mapper).
#[must_use]
pub fn diff_users(desired: &[ProvisionedUser], actual: &[ProvisionedUser]) -> UserPlan {
    let mut plan = UserPlan::default();
    let mut index = Correlation::new(actual, ProvisionedUser::external_id);
    let mut claimed: HashSet<&str> = HashSet::new();

    for user in desired {
        let Some(external_id) = user.external_id() else {
            continue;
        };
        if !claimed.insert(external_id) {
            debug!(external_id, "Duplicate desired user ignored");
            continue;
        }

        if let Some(existing) = index.owned.get(external_id).copied() {
            let Some(store_id) = existing.id.clone() else {
                warn!(external_id, "Store user has no id, leaving it alone");
                continue;
            };
            plan.matched.insert(external_id.to_string(), store_id.clone());
            if !equivalent(user, existing) {
                plan.update.push(UserUpdate {
                    store_id,
                    user: user.clone(),
                });
            }
            continue;
        }

        let email = user.primary_email().unwrap_or_default();
        let fallback = index.claim_fallback(|candidate| {
            same_key(&candidate.user_name, &user.user_name)
                || candidate
                    .primary_email()
                    .is_some_and(|candidate_email| same_key(candidate_email, email))
        });
        match fallback.and_then(|candidate| candidate.id.clone()) {
            Some(store_id) => {
                debug!(external_id, store_id = %store_id, "Matched unowned user by name");
                plan.matched.insert(external_id.to_string(), store_id.clone());
                plan.update.push(UserUpdate {
                    store_id,
                    user: user.clone(),
                });
            }
            None => plan.create.push(user.clone()),
        }
    }

    for existing in actual {
        let Some(external_id) = existing.external_id() else {
            continue;
        };
        if claimed.contains(external_id) || !existing.active {
            continue;
        }
        if let Some(store_id) = existing.id.clone() {
            plan.deactivate.push(UserDeactivation {
                store_id,
                user_name: existing.user_name.clone(),
            });
        }
    }

    plan
}

/// Diff groups on external id with display-name fallback.
#[must_use]
pub fn diff_groups(desired: &[ProvisionedGroup], actual: &[ProvisionedGroup]) -> GroupPlan {
    let mut plan = GroupPlan::default();
    let mut index = Correlation::new(actual, ProvisionedGroup::external_id);
    let mut claimed: HashSet<&str> = HashSet::new();

    for group in desired {
        let Some(external_id) = group.external_id() else {
            continue;
        };
        if !claimed.insert(external_id) {
            continue;
        }

        if let Some(existing) = index.owned.get(external_id).copied() {
            let Some(store_id) = existing.id.clone() else {
                warn!(external_id, "Store group has no id, leaving it alone");
                continue;
            };
            plan.matched.insert(external_id.to_string(), store_id.clone());
            if !groups_equivalent(group, existing) {
                plan.update.push(GroupUpdate {
                    store_id,
                    group: group.clone(),
                });
            }
            continue;
        }

        let fallback =
            index.claim_fallback(|candidate| same_key(&candidate.display_name, &group.display_name));
        match fallback.and_then(|candidate| candidate.id.clone()) {
            Some(store_id) => {
                plan.matched.insert(external_id.to_string(), store_id.clone());
                plan.update.push(GroupUpdate {
                    store_id,
                    group: group.clone(),
                });
            }
            None => plan.create.push(group.clone()),
        }
    }

    for existing in actual {
        let Some(external_id) = existing.external_id() else {
            continue;
        };
        if claimed.contains(external_id) {
            continue;
        }
        if let Some(store_id) = existing.id.clone() {
            plan.delete.push(GroupDeletion {
                store_id,
                display_name: existing.display_name.clone(),
            });
        }
    }

    plan
}

/// Members to add (in desired order) and to remove (in actual order).
#[must_use]
pub fn diff_group_membership(desired: &[String], actual: &[String]) -> MembershipDiff {
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    MembershipDiff {
        to_add: desired
            .iter()
            .filter(|m| !actual_set.contains(m.as_str()) && seen.insert(m.as_str()))
            .cloned()
            .collect(),
        to_remove: actual
            .iter()
            .filter(|m| !desired_set.contains(m.as_str()))
            .cloned()
            .collect(),
    }
}

/// Build the full plan: users, groups and per-group membership deltas.
///
/// Desired group members are user external ids. Actual group members are
/// store user ids. `retained` store resources are invisible to the diff and
/// stay members of whatever groups they are in.
#[must_use]
pub fn build_plan(
    desired_users: &[ProvisionedUser],
    desired_groups: &[ProvisionedGroup],
    actual_users: &[ProvisionedUser],
    actual_groups: &[ProvisionedGroup],
    retained: &Retained,
) -> OperationPlan {
    let actual_users: Vec<ProvisionedUser> = actual_users
        .iter()
        .filter(|u| !retained.holds_user(u))
        .cloned()
        .collect();
    let actual_groups: Vec<ProvisionedGroup> = actual_groups
        .iter()
        .filter(|g| !retained.holds_group(g))
        .cloned()
        .collect();
    let users = diff_users(desired_users, &actual_users);
    let groups = diff_groups(desired_groups, &actual_groups);

    // Store user id to external id, fallback matches included.
    let mut store_to_external: HashMap<&str, &str> = HashMap::new();
    for (external_id, store_id) in &users.matched {
        store_to_external.insert(store_id.as_str(), external_id.as_str());
    }
    for user in &actual_users {
        if let (Some(store_id), Some(external_id)) = (user.id.as_deref(), user.external_id()) {
            store_to_external.entry(store_id).or_insert(external_id);
        }
    }

    let actual_by_id: HashMap<&str, &ProvisionedGroup> = actual_groups
        .iter()
        .filter_map(|g| g.id.as_deref().map(|id| (id, g)))
        .collect();

    let mut membership = Vec::new();
    let mut seen_groups = HashSet::new();
    for group in desired_groups {
        let Some(external_id) = group.external_id() else {
            continue;
        };
        if !seen_groups.insert(external_id) {
            continue;
        }
        let group_id = groups.matched.get(external_id).cloned();

        let mut kept = Vec::new();
        let (add, remove) = match group_id.as_deref().and_then(|id| actual_by_id.get(id)) {
            Some(existing) => {
                let (held, members): (Vec<&String>, Vec<&String>) = existing
                    .members
                    .iter()
                    .partition(|store_id| retained.users.contains(store_id.as_str()));
                kept = held.into_iter().cloned().collect();

                // Members unknown to the user snapshot keep their store id as key.
                let mut key_to_store: HashMap<&str, &str> = HashMap::new();
                let actual_keys: Vec<String> = members
                    .into_iter()
                    .map(|store_id| {
                        let key = store_to_external
                            .get(store_id.as_str())
                            .copied()
                            .unwrap_or(store_id.as_str());
                        key_to_store.insert(key, store_id.as_str());
                        key.to_string()
                    })
                    .collect();
                let delta = diff_group_membership(&group.members, &actual_keys);
                let remove = delta
                    .to_remove
                    .iter()
                    .filter_map(|key| key_to_store.get(key.as_str()).map(|s| s.to_string()))
                    .collect();
                (delta.to_add, remove)
            }
            None => (
                diff_group_membership(&group.members, &[]).to_add,
                Vec::new(),
            ),
        };

        if add.is_empty() && remove.is_empty() {
            continue;
        }
        membership.push(MembershipUpdate {
            group_external_id: external_id.to_string(),
            group_name: group.display_name.clone(),
            group_id,
            add,
            remove,
            desired: group.members.clone(),
            retained: kept,
        });
    }

    let user_names = actual_users
        .iter()
        .filter_map(|u| u.id.clone().map(|id| (id, u.user_name.clone())))
        .collect();

    let external_names = desired_users
        .iter()
        .filter_map(|u| u.external_id().map(|id| (id.to_string(), u.user_name.clone())))
        .collect();

    OperationPlan {
        create_users: users.create,
        update_users: users.update,
        deactivate_users: users.deactivate,
        create_groups: groups.create,
        update_groups: groups.update,
        membership,
        delete_groups: groups.delete,
        known_user_ids: users.matched,
        user_names,
        external_names,
    }
}
