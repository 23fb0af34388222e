//! # Firebase Management
//!
//! - `client`: endpoint URLs for project and app management.
//! - `types`: project/app descriptors and API response shapes.

/// Endpoint URLs.
pub mod client;
/// Data structures for the Firebase Management API.
pub mod types;

pub use client::Endpoints;
pub use types::*;
