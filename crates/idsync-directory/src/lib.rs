//! Google Workspace directory client for idsync.
//!
//! Read-only access to users, groups and group memberships through the
//! Admin SDK Directory API, authenticated with a service account using
//! domain-wide delegation.
//!
//! # Example
//!
//! ```no_run
//! use idsync_core::DirectorySource;
//! use idsync_directory::{DirectoryConfig, GoogleCredentials, GoogleDirectoryClient};
//!
//! # async fn example(key_json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = GoogleCredentials::from_service_account_json(key_json)?;
//! let config = DirectoryConfig::new("admin@example.com", credentials);
//! let client = GoogleDirectoryClient::new(config)?;
//!
//! let page = client.list_groups(Some("name:AWS*"), None).await?;
//! println!("{} groups", page.items.len());
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod config;
mod error;

pub use auth::TokenCache;
pub use client::GoogleDirectoryClient;
pub use config::{
    DirectoryConfig, GoogleCredentials, ServiceAccountKey, DEFAULT_BASE_URL, DEFAULT_TOKEN_URI,
    DIRECTORY_SCOPES,
};
pub use error::{DirectoryError, DirectoryResult};
