//! CLI command implementations

pub mod classify;
pub mod health;
pub mod pests;
