//! HTTP service for agricultural pest identification
//!
//! Wraps the `pest-core` inference pipeline with an upload endpoint, the pest
//! directory, health checks and Prometheus metrics.

pub mod api;
pub mod config;
pub mod health;
pub mod presentation;
