//! DPoP (RFC 9449) proof validation engine with an axum resource-server guard.
//!
//! The engine lives in [`services`]; everything else adapts it to HTTP.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
