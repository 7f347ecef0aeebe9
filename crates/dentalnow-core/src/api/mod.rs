//! REST API access layer for the DentalNow backend.
//!
//! This module provides the `ApiClient` that every screen uses to talk to
//! the clinic, appointment and payment endpoints.
//!
//! The API uses bearer token authentication. Access tokens are short-lived;
//! when one is rejected the client exchanges the refresh token for a new
//! one, once, and replays the call.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod request;
mod renewal;
mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::ApiRequest;
