//! # Tagboard Common Library
//!
//! Shared core for the tagboard services:
//! - Text normalization and tokenization (the contract shared by indexing and search)
//! - Postgres store: images, tags, image_tags, tag_jobs (with migrations)
//! - Tag-overlap search engine with keyset pagination
//! - Collaborator interfaces (storage resolver, vision tagger)
//! - Ingest helpers (content-addressed registration + job enqueue)

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod search;
pub mod storage;
pub mod tagger;

pub use error::{Error, Result};
pub use normalize::Normalizer;
