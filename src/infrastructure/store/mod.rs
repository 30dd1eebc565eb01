//! # Session Stores
//!
//! Implementations of the `SessionStore` trait: Redis for deployments,
//! an in-process map for tests and store-less runs.

pub mod memory;
pub mod redis;
