//! SCIM 2.0 client for the provisioned identity store.
//!
//! Covers exactly the calls the reconciliation engine needs: paged listing of
//! users and groups, user create/replace/deactivate, group create/update/
//! delete and membership PATCH. Authentication is a static bearer token.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use auth::ScimAuth;
pub use client::ScimClient;
pub use error::{ScimClientError, ScimClientResult};
pub use models::MembershipPatchMode;
