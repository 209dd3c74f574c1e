//! # ferry-store
//!
//! Durable record store for the Ferry signaling server, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the two
//! persisted record kinds: link-negotiation records and transfer-progress
//! markers.  Callers that live on the async runtime are expected to wrap
//! the handle in a mutex and treat each round-trip as a suspension point.

pub mod database;
pub mod link_requests;
pub mod migrations;
pub mod models;
pub mod transfer_meta;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
