//! HTTP layer for berthload
//!
//! Provides:
//! - JSON API routes over axum
//! - Credential extraction from the session cookie or bearer header
//! - Error to status code mapping
//! - Request logging middleware

mod error;
mod extract;
mod routes;
mod server;

pub use error::*;
pub use extract::*;
pub use routes::*;
pub use server::*;

use thiserror::Error;

/// HTTP server errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

pub type HttpResult<T> = Result<T, HttpError>;
