//! Request lifecycle engine for berthload
//!
//! This crate is the heart of berthload, containing:
//! - The request state machine (draft -> formed -> completed | rejected, or deleted)
//! - The one-draft-per-user basket
//! - Ship association quantities
//! - The loading-time estimate frozen at completion

mod engine;
mod loading;
mod violation;

pub use engine::*;
pub use loading::*;
pub use violation::*;
