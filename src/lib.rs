//! GrantBridge partner callback gateway.
//!
//! Receives provider notifications that a partner onboarding step is
//! complete, authenticated with HMAC-SHA256 service-to-service signatures
//! and deduplicated so each logical delivery applies its effect exactly
//! once however many times it is retried.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod partners;
pub mod web;

pub use error::{Error, Result};
