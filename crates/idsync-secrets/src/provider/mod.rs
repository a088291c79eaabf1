//! Secret provider implementations.

pub mod env;
pub mod file;

#[cfg(feature = "aws")]
pub mod aws;
