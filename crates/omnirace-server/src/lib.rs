//! # OmniRace Server
//!
//! Axum HTTP surface for the race engine.
//!
//! This crate provides:
//! - The `POST /v1/race` handler and health endpoints
//! - Response streaming with bounded frame sizes
//! - Error aggregation into client-facing JSON bodies
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod streamer;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{Server, ServerConfig};
pub use state::AppState;
