//! Types shared by the scanshot CLI and HTTP server.

pub mod config;
pub mod error;
pub mod history;
pub mod protocol;
pub mod record;
