//! # Towclub Shared Library
//!
//! Domain types, persistence and club rules used by the Towclub API server.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and migrations
//! - `models`: Database models and their CRUD operations
//! - `auth`: Pilot authentication and organizer authorization
//! - `selection`: Waitlist promotion for training days
//! - `billing`: Amount owed per pilot and day
//! - `ledger`: Cash reconciliation of a training report

pub mod auth;
pub mod billing;
pub mod db;
pub mod ledger;
pub mod models;
pub mod selection;

/// Current version of the Towclub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
