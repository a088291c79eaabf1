//! Translation from directory records into identity-store resources.
//!
//! Every function here is pure and deterministic.

use std::collections::HashSet;

use idsync_core::{
    DirectorySourceGroup, DirectorySourceUser, ProvisionedGroup, ProvisionedUser, SyncError,
    SyncResult, UserEmail, UserName,
};

/// Map a directory user into the provisioned user shape.
///
/// The user needs a non-blank id and primary email.
pub fn to_provisioned_user(user: &DirectorySourceUser) -> SyncResult<ProvisionedUser> {
    let id = user.id.trim();
    let email = user.primary_email.trim();
    if id.is_empty() {
        return Err(SyncError::mapping(
            display_key(email),
            "user id is missing",
        ));
    }
    if email.is_empty() {
        return Err(SyncError::mapping(id, "primary email is missing"));
    }

    let given_name = user.given_name.trim().to_string();
    let family_name = user.family_name.trim().to_string();
    let display_name = format!("{given_name} {family_name}").trim().to_string();

    Ok(ProvisionedUser {
        schemas: vec![ProvisionedUser::SCHEMA.to_string()],
        id: None,
        external_id: Some(id.to_string()),
        user_name: email.to_string(),
        name: UserName {
            given_name,
            family_name,
        },
        display_name,
        emails: vec![UserEmail {
            value: email.to_string(),
            email_type: Some("work".to_string()),
            primary: true,
        }],
        active: user.is_active(),
        meta: None,
    })
}

/// Map a directory group into the provisioned group shape.
///
/// `resolve` maps a member reference to a user external id; members it
/// cannot resolve are dropped. Duplicate members are collapsed.
pub fn to_provisioned_group<F>(group: &DirectorySourceGroup, resolve: F) -> SyncResult<ProvisionedGroup>
where
    F: Fn(&str) -> Option<String>,
{
    let id = group.id.trim();
    if id.is_empty() {
        return Err(SyncError::mapping(
            display_key(&group.name),
            "group id is missing",
        ));
    }

    let mut seen = HashSet::new();
    let members = group
        .members
        .iter()
        .filter_map(|member| resolve(member))
        .filter(|external_id| seen.insert(external_id.clone()))
        .collect();

    Ok(ProvisionedGroup {
        id: None,
        external_id: Some(id.to_string()),
        display_name: group.name.trim().to_string(),
        members,
    })
}

/// Field-level equivalence of two users on the managed attributes.
///
/// Store ids, metadata and schemas are ignored.
#[must_use]
pub fn equivalent(a: &ProvisionedUser, b: &ProvisionedUser) -> bool {
    a.name.given_name == b.name.given_name
        && a.name.family_name == b.name.family_name
        && a.display_name == b.display_name
        && a.active == b.active
        && a.user_name.eq_ignore_ascii_case(&b.user_name)
        && eq_ignore_case(a.primary_email(), b.primary_email())
}

/// Group equivalence on the managed attributes.
#[must_use]
pub fn groups_equivalent(a: &ProvisionedGroup, b: &ProvisionedGroup) -> bool {
    a.display_name == b.display_name
}

fn eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

fn display_key(candidate: &str) -> &str {
    if candidate.trim().is_empty() {
        "<unknown>"
    } else {
        candidate
    }
}
