//! Core identifiers and error handling for the gatehouse authentication gateway.
//!
//! This crate provides the foundational types shared by the domain crate and
//! the server binary.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, UserId};
