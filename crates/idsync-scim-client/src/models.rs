//! SCIM 2.0 wire types (RFC 7643 / RFC 7644) used by the client.

use idsync_core::{MembershipChange, ProvisionedGroup, ResourceMeta};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// SCIM List Response (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    /// Total number of results matching the query.
    #[serde(default)]
    pub total_results: i64,

    /// 1-based index of the first result in this page.
    #[serde(default = "default_start_index")]
    pub start_index: i64,

    /// Number of items in this page.
    #[serde(default)]
    pub items_per_page: i64,

    /// The resources in this page.
    #[serde(rename = "Resources", default = "Vec::new")]
    pub resources: Vec<T>,
}

fn default_start_index() -> i64 {
    1
}

impl<T> ScimListResponse<T> {
    /// Start index of the following page, `None` when this page is the last.
    #[must_use]
    pub fn next_start_index(&self) -> Option<i64> {
        if self.resources.is_empty() {
            return None;
        }
        let next = self.start_index + self.resources.len() as i64;
        (next <= self.total_results).then_some(next)
    }
}

/// A member reference inside a SCIM group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimGroupMember {
    /// Member user id.
    pub value: String,

    /// Member display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ScimGroupMember {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display: None,
        }
    }
}

/// SCIM Group resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
    #[serde(default)]
    pub schemas: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ScimGroupMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
}

impl From<&ProvisionedGroup> for ScimGroup {
    /// Groups are always created empty; membership goes through PATCH.
    fn from(group: &ProvisionedGroup) -> Self {
        Self {
            schemas: vec![ProvisionedGroup::SCHEMA.to_string()],
            id: None,
            external_id: group.external_id().map(String::from),
            display_name: group.display_name.clone(),
            members: Vec::new(),
            meta: None,
        }
    }
}

impl From<ScimGroup> for ProvisionedGroup {
    fn from(group: ScimGroup) -> Self {
        Self {
            id: group.id,
            external_id: group.external_id,
            display_name: group.display_name,
            members: group.members.into_iter().map(|m| m.value).collect(),
        }
    }
}

/// SCIM PATCH operation (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchOp {
    /// Operation type: add, remove, or replace.
    pub op: String,

    /// Attribute path (e.g., "displayName", "members[value eq \"123\"]").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Value to set (for add/replace operations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// SCIM PATCH request (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchRequest {
    pub schemas: Vec<String>,

    #[serde(rename = "Operations")]
    pub operations: Vec<ScimPatchOp>,
}

impl ScimPatchRequest {
    /// SCIM Patch Operation schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

    pub fn new(operations: Vec<ScimPatchOp>) -> Self {
        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            operations,
        }
    }

    /// `replace active=false`.
    #[must_use]
    pub fn deactivate() -> Self {
        Self::new(vec![ScimPatchOp {
            op: "replace".to_string(),
            path: Some("active".to_string()),
            value: Some(serde_json::Value::Bool(false)),
        }])
    }

    /// Path-less replace of the group's display name and external id.
    #[must_use]
    pub fn group_attributes(group: &ProvisionedGroup) -> Self {
        let mut value = serde_json::json!({ "displayName": group.display_name });
        if let Some(external_id) = group.external_id() {
            value["externalId"] = serde_json::Value::String(external_id.to_string());
        }
        Self::new(vec![ScimPatchOp {
            op: "replace".to_string(),
            path: None,
            value: Some(value),
        }])
    }

    /// Membership patch for `change` under the given mode. `None` when there
    /// is nothing to send.
    #[must_use]
    pub fn membership(mode: MembershipPatchMode, change: &MembershipChange) -> Option<Self> {
        if change.is_empty() {
            return None;
        }

        let operations = match mode {
            MembershipPatchMode::Replace => vec![ScimPatchOp {
                op: "replace".to_string(),
                path: Some("members".to_string()),
                value: Some(member_values(&change.desired)),
            }],
            MembershipPatchMode::Incremental => {
                let mut operations = Vec::with_capacity(change.remove.len() + 1);
                if !change.add.is_empty() {
                    operations.push(ScimPatchOp {
                        op: "add".to_string(),
                        path: Some("members".to_string()),
                        value: Some(member_values(&change.add)),
                    });
                }
                for id in &change.remove {
                    operations.push(ScimPatchOp {
                        op: "remove".to_string(),
                        path: Some(format!(
                            "members[value eq \"{}\"]",
                            escape_scim_filter_value(id)
                        )),
                        value: None,
                    });
                }
                operations
            }
        };

        Some(Self::new(operations))
    }
}

fn member_values(ids: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::json!({ "value": id }))
            .collect(),
    )
}

/// Escape a value for use inside a SCIM filter string literal.
///
/// String values in filter expressions are enclosed in double-quotes
/// (RFC 7644 Section 3.4.2.2); backslashes and double-quotes are escaped.
fn escape_scim_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// How group membership changes are expressed as PATCH operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPatchMode {
    /// One `add` op with the new members, one filtered `remove` op per member.
    #[default]
    Incremental,
    /// A single `replace` of `members` with the complete desired list.
    Replace,
}

impl FromStr for MembershipPatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" => Ok(Self::Incremental),
            "replace" => Ok(Self::Replace),
            other => Err(format!(
                "unknown membership patch mode '{other}' (expected 'incremental' or 'replace')"
            )),
        }
    }
}

impl std::fmt::Display for MembershipPatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incremental => f.write_str("incremental"),
            Self::Replace => f.write_str("replace"),
        }
    }
}
