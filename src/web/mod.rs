//! HTTP surface of the callback gateway.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;
