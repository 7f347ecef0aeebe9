//! Authentication module for managing the user's API session.
//!
//! This module provides:
//! - `CredentialStore`: the shared holder of the access credential, the
//!   renewal credential and the signed-in identity
//! - `SessionStorage` backends: in-memory, JSON file and OS keychain
//! - `SessionObserver`: lifecycle notifications for the host application

pub mod lifecycle;
pub mod session;
pub mod storage;
pub mod store;

pub use lifecycle::{ChannelObserver, NoopObserver, SessionEvent, SessionObserver};
pub use session::{Identity, StoredSession};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage, StorageError};
pub use store::CredentialStore;
