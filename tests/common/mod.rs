//! Common test utilities and helpers
//!
//! This module provides shared functionality for all tests.

#![allow(dead_code)]


pub use app::TestContext;
pub use fixtures::{
    rate_limit_config, test_config, CountingEncoder, FailingCounterStore, TinyEncoder,
    UnavailableEncoder, ADMIN_TOKEN,
};
