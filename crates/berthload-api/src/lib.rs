//! Protocol types for berthload
//!
//! This crate defines the stable API between berthload and its callers:
//! - Domain records (requests, ships, associations, users)
//! - Lifecycle statuses and roles
//! - HTTP request/response payloads
//! - Error codes

mod payloads;
mod types;

pub use payloads::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
