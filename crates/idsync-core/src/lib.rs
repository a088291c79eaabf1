//! Core types shared by every idsync crate.
//!
//! This crate holds the directory and identity-store resource model, the
//! error taxonomy used to decide whether a run can continue, the retry
//! policy that wraps every external call, and the traits the reconciliation
//! engine uses to talk to both sides.

pub mod error;
pub mod model;
pub mod retry;
pub mod traits;

pub use error::{ApiError, ApiErrorKind, SyncError, SyncResult};
pub use model::{
    DirectoryMember, DirectorySourceGroup, DirectorySourceUser, MemberKind, Page,
    ProvisionedGroup, ProvisionedUser, ResourceMeta, UserEmail, UserName,
};
pub use retry::RetryPolicy;
pub use traits::{DirectorySource, IdentityStore, MembershipChange};
