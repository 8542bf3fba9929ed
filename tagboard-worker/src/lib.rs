//! # tagboard-worker
//!
//! The tagging worker service: claims queued jobs from the shared Postgres
//! queue, calls the vision tagger, and writes normalized tags back to the
//! store under the cost-safety gates. Also carries the operator CLI
//! (requeue, stats, budget).

pub mod config;
pub mod gates;
pub mod pipeline;
pub mod vision;
pub mod worker;
