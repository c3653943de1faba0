//! Shared utilities for berthload
//!
//! This crate provides:
//! - ID types (RequestId, ShipId, UserId, SessionId)
//! - The error taxonomy shared by the engine, the access gate and the HTTP layer
//! - Time utilities (UTC clock with mock support, date ranges)
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
