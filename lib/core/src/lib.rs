//! Core domain types and utilities for collectdesk.
//!
//! This crate provides the identifiers and the error-handling foundation
//! shared by the access model, the client gate and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{InviteId, ParseIdError, RoleId, UserId};
