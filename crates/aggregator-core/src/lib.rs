//! # Aggregator Core
//!
//! The aggregator subsystem for a multi-worker LLM task orchestrator:
//! it tracks registered workers and their lifecycle states, collects
//! their results with bounded waiting and timeout semantics, detects
//! and resolves concurrent edit conflicts over shared file paths,
//! merges successful outputs under a configurable strategy, and
//! accounts for cost per worker and per provider against budgets.
//!
//! ## Laws
//!
//! - No `unwrap()` / `expect()` / `panic!()` in library code — every
//!   fallible path returns [`error::AggregatorError`].
//! - No `unsafe` — `#![forbid(unsafe_code)]` at the workspace level.
//! - All mutable state lives behind one `tokio::sync::RwLock`, owned by
//!   [`Aggregator`]; external callers only ever see deep copies.
//!
//! ## Layout
//!
//! The five components of the design map onto sibling modules, each
//! contributing `impl Aggregator` blocks to the one handle type:
//!
//! - [`registry`] — C1, Result Registry.
//! - [`wait`] — C2, Wait Coordinator.
//! - [`conflict`] — C3, Conflict Engine.
//! - [`merge`] — C4, Merger.
//! - [`cost`] — C5, Cost Ledger.
//! - [`summary`] — the summary/pattern emitters.

#![forbid(unsafe_code)]

mod aggregator;
pub mod collaborators;
pub mod config;
mod conflict;
mod cost;
pub mod error;
mod merge;
mod ordered_set;
mod registry;
mod state;
mod summary;
pub mod types;
mod wait;

pub use aggregator::Aggregator;
pub use config::AggregatorConfig;
pub use error::{AggregatorError, Result};
