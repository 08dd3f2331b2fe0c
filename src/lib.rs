//! Reftrak Server Library
//!
//! This module exposes the server components for testing purposes.

pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod models;
pub mod qr;
pub mod reporting;
pub mod routes;
pub mod services;
pub mod store;
