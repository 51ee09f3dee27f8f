//! # Towclub API Server Library
//!
//! HTTP interface of the towclub: pilots sign up for training days,
//! organizers select participants, record runs, settle bills and reconcile
//! the day's cash.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
