//! gatehouse authentication gateway.
//!
//! Signs browsers in through external OpenID Connect providers and issues
//! stateless session cookies for the front-end.

pub mod app;
pub mod auth;
pub mod config;
