//! HTTP transport for routers
//!
//! `server` mounts a router as axum routes, `client` invokes them over reqwest.
//! `handlers` holds the health and discovery endpoints a host serves alongside.

pub mod client;
pub mod handlers;
pub mod server;
