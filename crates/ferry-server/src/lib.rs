//! # ferry-server
//!
//! Signaling and relay server for chunked file transfer between two
//! independently connected clients.
//!
//! The server provides:
//! - a **connection registry** mapping each registered user to its live
//!   WebSocket connection
//! - a **link negotiation service** relaying link proposals and
//!   accept/decline outcomes, durably recorded per recipient
//! - a **transfer relay** forwarding accepted senders' file chunks and
//!   tracking per-transfer progress so an interrupted transfer can resume
//!   after a reconnect
//!
//! Delivery throughout is at-most-once and best-effort: offline targets,
//! full outbound queues, and store failures all drop the affected event
//! silently.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod registry;
pub mod socket;
pub mod transfer;
