//! Creator identity.
//!
//! Creator accounts are managed outside this service. The demo login stands
//! in for the external provider during development and tests.

pub mod demo_auth;
pub mod middleware;
pub mod models;
