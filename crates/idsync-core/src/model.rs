//! Directory and identity-store resource model.
//!
//! `DirectorySource*` types are read-only snapshots of the authoritative
//! directory. `Provisioned*` types are the identity-store shapes; the user
//! type doubles as the SCIM 2.0 wire representation (RFC 7643 Section 4.1).

use serde::{Deserialize, Serialize};

/// A user as reported by the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySourceUser {
    /// Stable source identifier, used as the provisioned `externalId`.
    pub id: String,
    /// Primary email address.
    pub primary_email: String,
    /// Given (first) name, possibly empty.
    pub given_name: String,
    /// Family (last) name, possibly empty.
    pub family_name: String,
    /// Whether the account is suspended in the directory.
    pub suspended: bool,
}

impl DirectorySourceUser {
    /// Whether the user should be active in the identity store.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.suspended
    }
}

/// A group as reported by the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySourceGroup {
    /// Stable source identifier, used as the provisioned `externalId`.
    pub id: String,
    /// Group display name.
    pub name: String,
    /// Group email address.
    pub email: String,
    /// Member source-user identifiers, in directory order.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Kind of a directory group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberKind {
    User,
    Group,
    Customer,
    #[serde(other)]
    Other,
}

/// A single entry of a directory group's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMember {
    /// Member identifier (the user id for `User` members).
    pub id: String,
    /// Member email, when the directory reports one.
    #[serde(default)]
    pub email: Option<String>,
    /// Member kind, reported by the directory as `type`.
    #[serde(rename = "type")]
    pub kind: MemberKind,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page, `None` on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// A final page holding `items`.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Structured name of a provisioned user.
///
/// Both fields are always serialized, even when blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

/// Email value of a provisioned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEmail {
    /// Email address.
    pub value: String,
    /// Email type (e.g., "work").
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
    /// Whether this is the primary email.
    #[serde(default)]
    pub primary: bool,
}

/// Store-assigned resource metadata. Never compared during diffing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A user resource in the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedUser {
    /// SCIM schemas.
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Store-assigned resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Source directory identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// Unique username (the primary email).
    pub user_name: String,

    /// Structured name.
    #[serde(default)]
    pub name: UserName,

    /// `"{given} {family}"`.
    #[serde(default)]
    pub display_name: String,

    /// Email addresses; exactly one primary entry for mapped users.
    #[serde(default)]
    pub emails: Vec<UserEmail>,

    /// Whether the user is active.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Resource metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
}

fn default_active() -> bool {
    true
}

impl ProvisionedUser {
    /// SCIM Core User schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:schemas:core:2.0:User";

    /// The primary email address, falling back to the first listed one.
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.emails.first())
            .map(|e| e.value.as_str())
    }

    /// The external identifier, ignoring blank values.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// A group resource in the identity store.
///
/// For desired groups `members` holds user external identifiers; for groups
/// read from the store it holds store user ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionedGroup {
    /// Store-assigned resource ID.
    pub id: Option<String>,
    /// Source directory identifier.
    pub external_id: Option<String>,
    /// Group display name.
    pub display_name: String,
    /// Member references.
    pub members: Vec<String>,
}

impl ProvisionedGroup {
    /// SCIM Core Group schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:schemas:core:2.0:Group";

    /// The external identifier, ignoring blank values.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_store_payload() {
        let json = serde_json::json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "id": "9067729b3d-1b1c2d3e",
            "externalId": "1029384756",
            "userName": "lee@example.com",
            "name": { "givenName": "Lee", "familyName": "Packham" },
            "displayName": "Lee Packham",
            "emails": [{ "value": "lee@example.com", "type": "work", "primary": true }],
            "active": false,
            "meta": {
                "resourceType": "User",
                "created": "2024-01-15T10:00:00Z",
                "lastModified": "2024-02-01T10:00:00Z"
            }
        });

        let user: ProvisionedUser = serde_json::from_value(json).unwrap();
        assert_eq!(user.id.as_deref(), Some("9067729b3d-1b1c2d3e"));
        assert_eq!(user.external_id(), Some("1029384756"));
        assert_eq!(user.primary_email(), Some("lee@example.com"));
        assert!(!user.active);
        assert_eq!(
            user.meta.unwrap().created.as_deref(),
            Some("2024-01-15T10:00:00Z")
        );
    }

    #[test]
    fn test_user_serializes_blank_name_fields() {
        let user = ProvisionedUser {
            schemas: vec![ProvisionedUser::SCHEMA.to_string()],
            id: None,
            external_id: Some("42".into()),
            user_name: "solo@example.com".into(),
            name: UserName::default(),
            display_name: String::new(),
            emails: vec![],
            active: true,
            meta: None,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["name"]["givenName"], "");
        assert_eq!(json["name"]["familyName"], "");
        assert!(json.get("id").is_none());
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn test_blank_external_id_is_absent() {
        let group = ProvisionedGroup {
            external_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(group.external_id(), None);
    }

    #[test]
    fn test_member_kind_unknown_values() {
        let member: DirectoryMember =
            serde_json::from_str(r#"{"id":"1","kind":"admin#directory#member","type":"EXTERNAL"}"#)
                .unwrap();
        assert_eq!(member.kind, MemberKind::Other);
        assert_eq!(member.email, None);
    }
}
