//! Paperwire ingestion pipeline
//!
//! Pulls candidate papers from external scholarly feeds, upserts them into
//! the content store, and enriches them into published articles through the
//! resilient generation client. One [`orchestrator::Orchestrator`] tick is
//! bounded, sequential, and never fails as a whole on partial errors.

pub mod feeds;
pub mod orchestrator;
pub mod steps;

pub use orchestrator::{Orchestrator, TickOptions, TickSummary};
