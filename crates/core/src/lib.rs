//! Grocer Core - Shared types library.
//!
//! This crate provides common types used across all Grocer components:
//! - `storefront` - Cart synchronization between device storage and the remote record store
//! - `cli` - Command-line tools for migrations, seeding, and driving a cart session
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, cart lines, and visitor identity

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
