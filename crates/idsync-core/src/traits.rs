//! Seams between the reconciliation engine and the two external systems.

use crate::error::ApiError;
use crate::model::{
    DirectoryMember, DirectorySourceGroup, DirectorySourceUser, Page, ProvisionedGroup,
    ProvisionedUser,
};
use async_trait::async_trait;

/// Read-only access to the authoritative directory.
///
/// Listing calls return a single page; the caller drives pagination so that
/// each page request is retried independently.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Client error type.
    type Error: ApiError;

    /// List users matching an optional directory query.
    async fn list_users(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<Page<DirectorySourceUser>, Self::Error>;

    /// Fetch a single user by id or primary email. `None` when it does not exist.
    async fn get_user(&self, user_key: &str) -> Result<Option<DirectorySourceUser>, Self::Error>;

    /// List groups matching an optional directory query.
    async fn list_groups(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<Page<DirectorySourceGroup>, Self::Error>;

    /// List the members of a group, nested groups expanded.
    async fn list_group_members(
        &self,
        group_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<DirectoryMember>, Self::Error>;
}

/// Membership delta for one group.
///
/// `add` and `remove` hold store user ids. `desired` is the complete target
/// member list, for stores that replace membership wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub desired: Vec<String>,
}

impl MembershipChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Read/write access to the identity store being provisioned.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Client error type.
    type Error: ApiError;

    /// List one page of users.
    async fn list_users(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<ProvisionedUser>, Self::Error>;

    /// List one page of groups. Members may be omitted by the store.
    async fn list_groups(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<ProvisionedGroup>, Self::Error>;

    /// Store user ids of the members of a group.
    async fn get_group_members(&self, group_id: &str) -> Result<Vec<String>, Self::Error>;

    /// Create a user and return the stored representation.
    async fn create_user(&self, user: &ProvisionedUser) -> Result<ProvisionedUser, Self::Error>;

    /// Replace a user's attributes.
    async fn replace_user(
        &self,
        id: &str,
        user: &ProvisionedUser,
    ) -> Result<ProvisionedUser, Self::Error>;

    /// Mark a user inactive. Users are never deleted.
    async fn deactivate_user(&self, id: &str) -> Result<(), Self::Error>;

    /// Create a group (without members) and return the stored representation.
    async fn create_group(
        &self,
        group: &ProvisionedGroup,
    ) -> Result<ProvisionedGroup, Self::Error>;

    /// Update a group's display name and external id.
    async fn update_group(&self, id: &str, group: &ProvisionedGroup) -> Result<(), Self::Error>;

    /// Apply a membership delta to a group.
    async fn patch_group_members(
        &self,
        group_id: &str,
        change: &MembershipChange,
    ) -> Result<(), Self::Error>;

    /// Delete a group.
    async fn delete_group(&self, id: &str) -> Result<(), Self::Error>;
}
