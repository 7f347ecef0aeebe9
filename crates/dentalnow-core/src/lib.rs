//! Core library for the DentalNow clinic booking client.
//!
//! Every screen of the application talks to the REST API through
//! [`ApiClient`], which attaches the bearer credential from the
//! [`CredentialStore`], renews it once when the server answers 401, and
//! tears the session down when renewal is impossible.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{endpoints, ApiClient, ApiError, ApiRequest};
pub use auth::{
    ChannelObserver, CredentialStore, FileStorage, Identity, KeyringStorage, MemoryStorage,
    NoopObserver, SessionEvent, SessionObserver, SessionStorage, StorageError, StoredSession,
};
pub use config::Config;
