//! In-memory directory and identity store for orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use idsync_core::{
    ApiError, ApiErrorKind, DirectoryMember, DirectorySource, DirectorySourceGroup,
    DirectorySourceUser, IdentityStore, MemberKind, MembershipChange, Page, ProvisionedGroup,
    ProvisionedUser, RetryPolicy, UserEmail, UserName,
};
use idsync_provisioning::{CancellationFlag, SyncOptions, SyncStrategy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum FakeError {
    #[error("401 Unauthorized")]
    Unauthorized,
    #[error("503 Service Unavailable")]
    Unavailable,
    #[error("409 Conflict")]
    Conflict,
}

impl ApiError for FakeError {
    fn kind(&self) -> ApiErrorKind {
        match self {
            FakeError::Unauthorized => ApiErrorKind::Authentication,
            FakeError::Unavailable => ApiErrorKind::Transient,
            FakeError::Conflict => ApiErrorKind::Permanent,
        }
    }
}

/// Injected failures keyed by `"<operation>:<subject>"`, with a remaining
/// count (`None` = always).
#[derive(Default)]
pub struct Failures(Mutex<HashMap<String, (FakeError, Option<u32>)>>);

impl Failures {
    pub fn always(&self, key: &str, error: FakeError) {
        self.0.lock().unwrap().insert(key.to_string(), (error, None));
    }

    pub fn times(&self, key: &str, error: FakeError, times: u32) {
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), (error, Some(times)));
    }

    fn check(&self, key: &str) -> Result<(), FakeError> {
        let mut failures = self.0.lock().unwrap();
        let Some((error, remaining)) = failures.get_mut(key) else {
            return Ok(());
        };
        match remaining {
            None => Err(error.clone()),
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(error.clone())
            }
        }
    }
}

// =============================================================================
// Directory
// =============================================================================

pub struct FakeDirectory {
    pub users: Vec<DirectorySourceUser>,
    /// Groups with member user ids.
    pub groups: Vec<DirectorySourceGroup>,
    pub page_size: usize,
    pub user_queries: Mutex<Vec<Option<String>>>,
    pub user_lookups: Mutex<Vec<String>>,
    pub failures: Failures,
}

impl FakeDirectory {
    pub fn new(users: Vec<DirectorySourceUser>, groups: Vec<DirectorySourceGroup>) -> Self {
        Self {
            users,
            groups,
            page_size: 2,
            user_queries: Mutex::new(Vec::new()),
            user_lookups: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    fn page<T: Clone>(&self, items: &[T], token: Option<&str>) -> Page<T> {
        let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items[start.min(end)..end].to_vec(),
            next: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl DirectorySource for FakeDirectory {
    type Error = FakeError;

    async fn list_users(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<Page<DirectorySourceUser>, FakeError> {
        self.failures.check("list_users:directory")?;
        if page_token.is_none() {
            self.user_queries
                .lock()
                .unwrap()
                .push(query.map(str::to_string));
        }
        Ok(self.page(&self.users, page_token))
    }

    async fn get_user(&self, user_key: &str) -> Result<Option<DirectorySourceUser>, FakeError> {
        self.user_lookups.lock().unwrap().push(user_key.to_string());
        Ok(self
            .users
            .iter()
            .find(|u| u.id == user_key || u.primary_email.eq_ignore_ascii_case(user_key))
            .cloned())
    }

    async fn list_groups(
        &self,
        _query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<Page<DirectorySourceGroup>, FakeError> {
        let listed: Vec<DirectorySourceGroup> = self
            .groups
            .iter()
            .map(|g| DirectorySourceGroup {
                members: Vec::new(),
                ..g.clone()
            })
            .collect();
        Ok(self.page(&listed, page_token))
    }

    async fn list_group_members(
        &self,
        group_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<DirectoryMember>, FakeError> {
        let members: Vec<DirectoryMember> = self
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| {
                g.members
                    .iter()
                    .map(|id| DirectoryMember {
                        id: id.clone(),
                        email: self
                            .users
                            .iter()
                            .find(|u| &u.id == id)
                            .map(|u| u.primary_email.clone()),
                        kind: MemberKind::User,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(self.page(&members, page_token))
    }
}

// =============================================================================
// Identity store
// =============================================================================

#[derive(Default)]
pub struct StoreState {
    pub users: Vec<ProvisionedUser>,
    pub groups: Vec<ProvisionedGroup>,
    pub writes: Vec<String>,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeStore {
    pub state: Mutex<StoreState>,
    pub failures: Failures,
    /// Cancelled right after the first user creation.
    pub cancel_after_create: Mutex<Option<CancellationFlag>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: &str, external_id: Option<&str>, email: &str, active: bool) -> Self {
        let mut user = store_user(email, active);
        user.id = Some(id.to_string());
        user.external_id = external_id.map(str::to_string);
        self.state.lock().unwrap().users.push(user);
        self
    }

    pub fn with_group(self, id: &str, external_id: Option<&str>, name: &str, members: &[&str]) -> Self {
        self.state.lock().unwrap().groups.push(ProvisionedGroup {
            id: Some(id.to_string()),
            external_id: external_id.map(str::to_string),
            display_name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    pub fn user_by_email(&self, email: &str) -> Option<ProvisionedUser> {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.user_name.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn group_by_name(&self, name: &str) -> Option<ProvisionedGroup> {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.display_name == name)
            .cloned()
    }

    /// Usernames of a group's members, sorted.
    pub fn member_names(&self, group_name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(group) = state.groups.iter().find(|g| g.display_name == group_name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = group
            .members
            .iter()
            .filter_map(|id| state.users.iter().find(|u| u.id.as_deref() == Some(id)))
            .map(|u| u.user_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    fn next_id(state: &mut StoreState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-new-{}", state.next_id)
    }
}

#[async_trait]
impl IdentityStore for FakeStore {
    type Error = FakeError;

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<ProvisionedUser>, FakeError> {
        self.failures.check("list_users:store")?;
        let state = self.state.lock().unwrap();
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + 2).min(state.users.len());
        Ok(Page {
            items: state.users[start.min(end)..end].to_vec(),
            next: (end < state.users.len()).then(|| end.to_string()),
        })
    }

    async fn list_groups(&self, _cursor: Option<&str>) -> Result<Page<ProvisionedGroup>, FakeError> {
        let state = self.state.lock().unwrap();
        Ok(Page::last(
            state
                .groups
                .iter()
                .map(|g| ProvisionedGroup {
                    members: Vec::new(),
                    ..g.clone()
                })
                .collect(),
        ))
    }

    async fn get_group_members(&self, group_id: &str) -> Result<Vec<String>, FakeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .iter()
            .find(|g| g.id.as_deref() == Some(group_id))
            .map(|g| g.members.clone())
            .unwrap_or_default())
    }

    async fn create_user(&self, user: &ProvisionedUser) -> Result<ProvisionedUser, FakeError> {
        self.failures.check(&format!("create_user:{}", user.user_name))?;
        let created = {
            let mut state = self.state.lock().unwrap();
            let mut created = user.clone();
            created.id = Some(Self::next_id(&mut state, "u"));
            state.users.push(created.clone());
            state.writes.push(format!("create_user:{}", user.user_name));
            created
        };
        if let Some(flag) = self.cancel_after_create.lock().unwrap().as_ref() {
            flag.cancel();
        }
        Ok(created)
    }

    async fn replace_user(&self, id: &str, user: &ProvisionedUser) -> Result<ProvisionedUser, FakeError> {
        self.failures.check(&format!("replace_user:{}", user.user_name))?;
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("replace_user:{}", user.user_name));
        let mut replaced = user.clone();
        replaced.id = Some(id.to_string());
        if let Some(existing) = state.users.iter_mut().find(|u| u.id.as_deref() == Some(id)) {
            *existing = replaced.clone();
        }
        Ok(replaced)
    }

    async fn deactivate_user(&self, id: &str) -> Result<(), FakeError> {
        self.failures.check(&format!("deactivate_user:{id}"))?;
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("deactivate_user:{id}"));
        if let Some(existing) = state.users.iter_mut().find(|u| u.id.as_deref() == Some(id)) {
            existing.active = false;
        }
        Ok(())
    }

    async fn create_group(&self, group: &ProvisionedGroup) -> Result<ProvisionedGroup, FakeError> {
        self.failures
            .check(&format!("create_group:{}", group.display_name))?;
        let mut state = self.state.lock().unwrap();
        let created = ProvisionedGroup {
            id: Some(Self::next_id(&mut state, "g")),
            members: Vec::new(),
            ..group.clone()
        };
        state.groups.push(created.clone());
        state.writes.push(format!("create_group:{}", group.display_name));
        Ok(created)
    }

    async fn update_group(&self, id: &str, group: &ProvisionedGroup) -> Result<(), FakeError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("update_group:{}", group.display_name));
        if let Some(existing) = state.groups.iter_mut().find(|g| g.id.as_deref() == Some(id)) {
            existing.display_name = group.display_name.clone();
            existing.external_id = group.external_id.clone();
        }
        Ok(())
    }

    async fn patch_group_members(&self, group_id: &str, change: &MembershipChange) -> Result<(), FakeError> {
        self.failures.check(&format!("patch_group_members:{group_id}"))?;
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!(
            "patch_group_members:{group_id}:+{}-{}",
            change.add.len(),
            change.remove.len()
        ));
        if let Some(group) = state.groups.iter_mut().find(|g| g.id.as_deref() == Some(group_id)) {
            for id in &change.add {
                if !group.members.contains(id) {
                    group.members.push(id.clone());
                }
            }
            group.members.retain(|m| !change.remove.contains(m));
        }
        Ok(())
    }

    async fn delete_group(&self, id: &str) -> Result<(), FakeError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("delete_group:{id}"));
        state.groups.retain(|g| g.id.as_deref() != Some(id));
        Ok(())
    }
}

// =============================================================================
// Factories
// =============================================================================

pub fn source_user(id: &str, given: &str, family: &str, email: &str) -> DirectorySourceUser {
    DirectorySourceUser {
        id: id.to_string(),
        primary_email: email.to_string(),
        given_name: given.to_string(),
        family_name: family.to_string(),
        suspended: false,
    }
}

pub fn suspended(mut user: DirectorySourceUser) -> DirectorySourceUser {
    user.suspended = true;
    user
}

pub fn source_group(id: &str, name: &str, members: &[&str]) -> DirectorySourceGroup {
    DirectorySourceGroup {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', "-")),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

/// A store user with the given email and generic names.
pub fn store_user(email: &str, active: bool) -> ProvisionedUser {
    ProvisionedUser {
        schemas: vec![ProvisionedUser::SCHEMA.to_string()],
        id: None,
        external_id: None,
        user_name: email.to_string(),
        name: UserName {
            given_name: "Test".into(),
            family_name: "User".into(),
        },
        display_name: "Test User".into(),
        emails: vec![UserEmail {
            value: email.to_string(),
            email_type: Some("work".into()),
            primary: true,
        }],
        active,
        meta: None,
    }
}

/// Options with fast retries.
pub fn options(strategy: SyncStrategy) -> SyncOptions {
    SyncOptions::new(strategy).with_retry(RetryPolicy::new(2, Duration::from_millis(1)))
}
