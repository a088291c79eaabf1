//! # Reconciliation Engine
//!
//! Makes the identity store match the source directory.
//!
//! ## Overview
//!
//! One run:
//! - fetches both snapshots concurrently, paginating each side sequentially
//! - maps directory records into identity-store shapes ([`mapper`])
//! - computes a partitioned operation plan ([`diff`], [`plan`])
//! - applies the plan in dependency order with bounded concurrency
//! - returns a [`RunSummary`] of per-entity outcomes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SyncOrchestrator                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐    │
//! │  │  Directory    │───►│    Mapper     │───►│  Diff Engine  │    │
//! │  │  Source       │    │  + Filters    │    │               │    │
//! │  └───────────────┘    └───────────────┘    └───────┬───────┘    │
//! │  ┌───────────────┐                                 │            │
//! │  │  Identity     │◄──────── staged apply ◄─────────┘            │
//! │  │  Store        │                                              │
//! │  └───────────────┘                                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use idsync_provisioning::{SyncOptions, SyncOrchestrator, SyncStrategy};
//!
//! let options = SyncOptions::new(SyncStrategy::Groups);
//! let summary = SyncOrchestrator::new(directory, store, options).run().await?;
//! println!("{} failures", summary.counts.failed);
//! ```

pub mod apply;
pub mod cancel;
pub mod config;
pub mod diff;
pub mod filter;
pub mod mapper;
pub mod orchestrator;
pub mod plan;
pub mod summary;

pub use cancel::CancellationFlag;
pub use config::{SyncOptions, SyncStrategy};
pub use diff::{build_plan, diff_group_membership, diff_groups, diff_users, MembershipDiff};
pub use filter::{MatchFilter, NameList, ScopeFilter};
pub use orchestrator::{RunState, SyncOrchestrator};
pub use plan::OperationPlan;
pub use summary::{Action, EntityKind, EntityOutcome, OutcomeStatus, RunCounts, RunSummary};
