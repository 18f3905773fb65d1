//! # OmniRace Core
//!
//! Core types, credential handling, and error taxonomy for OmniRace.
//!
//! This crate provides the foundational pieces shared across the workspace:
//! - Request body and chat message types
//! - The canonical text-delta and client envelope types
//! - Credential pools with uniform random selection and masking
//! - The `RaceError` taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod key;
pub mod request;

// Re-export commonly used types
pub use error::{RaceError, RaceFailure, RaceResult};
pub use frame::{DeltaKind, DeltaStream, StreamFrame, TextDelta};
pub use key::{mask_key, mask_secret, KeyPool};
pub use request::{ChatMessage, MessageRole, RaceRequest};
