//! Operation plan produced by the diff engine.

use std::collections::HashMap;

use idsync_core::{ProvisionedGroup, ProvisionedUser};

use crate::summary::{Action, EntityKind, EntityOutcome};

/// Replace an existing user's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub store_id: String,
    /// Desired state, external id included (backfilled on fallback matches).
    pub user: ProvisionedUser,
}

/// Deactivate an owned user that left the directory scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDeactivation {
    pub store_id: String,
    pub user_name: String,
}

/// Update a group's display name or backfill its external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpdate {
    pub store_id: String,
    pub group: ProvisionedGroup,
}

/// Delete an owned group that left the directory scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDeletion {
    pub store_id: String,
    pub display_name: String,
}

/// Membership delta for one desired group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub group_external_id: String,
    pub group_name: String,
    /// Store id, `None` for groups created in this run.
    pub group_id: Option<String>,
    /// User external ids, resolved to store ids at apply time.
    pub add: Vec<String>,
    /// Store user ids.
    pub remove: Vec<String>,
    /// Complete desired member list as user external ids.
    pub desired: Vec<String>,
    /// Store user ids that stay members without being managed.
    pub retained: Vec<String>,
}

/// Partitioned, ordered operations for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPlan {
    pub create_users: Vec<ProvisionedUser>,
    pub update_users: Vec<UserUpdate>,
    pub deactivate_users: Vec<UserDeactivation>,
    pub create_groups: Vec<ProvisionedGroup>,
    pub update_groups: Vec<GroupUpdate>,
    pub membership: Vec<MembershipUpdate>,
    pub delete_groups: Vec<GroupDeletion>,
    /// User external id to store id, for users already in the store.
    pub known_user_ids: HashMap<String, String>,
    /// Store user id to username, for labelling membership removals.
    pub user_names: HashMap<String, String>,
    /// Desired user external id to username, for labelling additions.
    pub external_names: HashMap<String, String>,
}

impl OperationPlan {
    /// Number of store operations the plan would issue per entity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.create_users.len()
            + self.update_users.len()
            + self.deactivate_users.len()
            + self.create_groups.len()
            + self.update_groups.len()
            + self
                .membership
                .iter()
                .map(|m| m.add.len() + m.remove.len())
                .sum::<usize>()
            + self.delete_groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label for a store user id in membership outcomes.
    #[must_use]
    pub fn user_label<'a>(&'a self, store_id: &'a str) -> &'a str {
        self.user_names
            .get(store_id)
            .map(String::as_str)
            .unwrap_or(store_id)
    }

    /// Label for a user external id in membership outcomes.
    #[must_use]
    pub fn external_label<'a>(&'a self, external_id: &'a str) -> &'a str {
        self.external_names
            .get(external_id)
            .map(String::as_str)
            .unwrap_or(external_id)
    }

    /// Every planned operation as a skipped outcome.
    #[must_use]
    pub fn skipped_outcomes(&self, reason: &str) -> Vec<EntityOutcome> {
        let mut outcomes = Vec::with_capacity(self.len());
        let skip = |kind, action, entity: &str| EntityOutcome::skipped(kind, action, entity, reason);

        outcomes.extend(
            self.create_users
                .iter()
                .map(|u| skip(EntityKind::User, Action::Create, &u.user_name)),
        );
        outcomes.extend(
            self.update_users
                .iter()
                .map(|u| skip(EntityKind::User, Action::Update, &u.user.user_name)),
        );
        outcomes.extend(
            self.create_groups
                .iter()
                .map(|g| skip(EntityKind::Group, Action::Create, &g.display_name)),
        );
        outcomes.extend(
            self.update_groups
                .iter()
                .map(|g| skip(EntityKind::Group, Action::Update, &g.group.display_name)),
        );
        for update in &self.membership {
            outcomes.extend(update.add.iter().map(|member| {
                skip(
                    EntityKind::Membership,
                    Action::AddMember,
                    &member_label(&update.group_name, self.external_label(member)),
                )
            }));
            outcomes.extend(update.remove.iter().map(|member| {
                skip(
                    EntityKind::Membership,
                    Action::RemoveMember,
                    &member_label(&update.group_name, self.user_label(member)),
                )
            }));
        }
        outcomes.extend(
            self.deactivate_users
                .iter()
                .map(|u| skip(EntityKind::User, Action::Deactivate, &u.user_name)),
        );
        outcomes.extend(
            self.delete_groups
                .iter()
                .map(|g| skip(EntityKind::Group, Action::Delete, &g.display_name)),
        );
        outcomes
    }
}

pub(crate) fn member_label(group: &str, member: &str) -> String {
    format!("{group} <- {member}")
}
