//! Access gate for berthload
//!
//! Resolves a presented credential to a live session and decides which
//! role may drive which request operation before handing the call to the
//! request engine.
//!
//! - Signed session tokens (HS256)
//! - Session records and the per-user token index in a TTL key/value store
//! - Argon2 password hashes
//! - Role and ownership checks

mod credential;
mod error;
mod gate;
mod password;
mod token;

pub use credential::*;
pub use error::*;
pub use gate::*;
pub use password::*;
pub use token::*;
