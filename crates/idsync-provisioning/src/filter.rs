//! Directory match expressions and name-based scope lists.

use idsync_core::{DirectorySourceGroup, DirectorySourceUser, ProvisionedGroup, ProvisionedUser};
use serde::{Deserialize, Serialize};

/// A directory query expression. `*` (or blank) selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchFilter(String);

impl MatchFilter {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into().trim().to_string())
    }

    /// Matches every entity.
    pub fn all() -> Self {
        Self::new("*")
    }

    /// Whether this filter selects every entity.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.0 == "*"
    }

    /// Whether no expression was given at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The query to send to the directory, `None` for "everything".
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        if self.is_all() || self.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MatchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-insensitive list of names or emails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameList(Vec<String>);

impl NameList {
    /// Build a list, dropping blank entries.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        self.0.iter().any(|n| n.eq_ignore_ascii_case(candidate))
    }

    /// Whether any of the candidate keys is listed.
    #[must_use]
    pub fn contains_any(&self, candidates: &[&str]) -> bool {
        candidates.iter().any(|c| self.contains(c))
    }
}

impl std::str::FromStr for NameList {
    type Err = std::convert::Infallible;

    /// Parse a comma separated list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

/// Ignore / include lists applied after the directory match filters.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub ignore_users: NameList,
    pub ignore_groups: NameList,
    /// When non-empty, only these groups are in scope.
    pub include_groups: NameList,
}

impl ScopeFilter {
    /// Whether a user (by primary email or id) is in scope.
    #[must_use]
    pub fn user_in_scope(&self, user: &DirectorySourceUser) -> bool {
        !self
            .ignore_users
            .contains_any(&[&user.primary_email, &user.id])
    }

    /// Whether a member reference is excluded before the user is even fetched.
    #[must_use]
    pub fn member_ignored(&self, id: &str, email: Option<&str>) -> bool {
        self.ignore_users.contains(id) || email.is_some_and(|e| self.ignore_users.contains(e))
    }

    /// Whether an identity store user is on the ignore list, by username,
    /// primary email or external id.
    #[must_use]
    pub fn store_user_ignored(&self, user: &ProvisionedUser) -> bool {
        let mut keys = vec![user.user_name.as_str()];
        keys.extend(user.primary_email());
        keys.extend(user.external_id());
        self.ignore_users.contains_any(&keys)
    }

    /// Whether an identity store group is on the ignore list by display name.
    #[must_use]
    pub fn store_group_ignored(&self, group: &ProvisionedGroup) -> bool {
        self.ignore_groups.contains(&group.display_name)
    }

    /// Whether a group (by name or email) is in scope. The include list is
    /// only consulted when `use_include` is set.
    #[must_use]
    pub fn group_in_scope(&self, group: &DirectorySourceGroup, use_include: bool) -> bool {
        let keys = [group.name.as_str(), group.email.as_str()];
        if self.ignore_groups.contains_any(&keys) {
            return false;
        }
        !use_include || self.include_groups.is_empty() || self.include_groups.contains_any(&keys)
    }
}
