//! HTTP surface: the match API and the wire-schema validator.

pub mod schema;
pub mod server;

pub use server::{create_router, AppState};
