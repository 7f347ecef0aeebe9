//! The credential store shared by every request of one application session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, warn};

use super::session::{Identity, StoredSession};
use super::storage::{MemoryStorage, SessionStorage, StorageError};

/// Holds the access credential, renewal credential and identity.
///
/// Clone is cheap and every clone sees the same session. Mutations replace the
/// whole record under one write lock, so readers observe either the old
/// session or the new one, never a mix. No validation of the credentials is
/// done here.
///
/// Every mutation bumps a revision counter, which lets a caller tell whether
/// the session changed since it last looked.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

struct Inner {
    current: RwLock<StoredSession>,
    /// Only written while `current` is write-locked.
    revision: AtomicU64,
    storage: Box<dyn SessionStorage>,
}

impl CredentialStore {
    /// Open a store over a durable backend, loading whatever session it holds.
    /// An unreadable record is treated as no session.
    pub fn open(storage: impl SessionStorage + 'static) -> Self {
        let current = match storage.load() {
            Ok(Some(session)) => {
                debug!(
                    has_access = session.access_token.is_some(),
                    has_refresh = session.refresh_token.is_some(),
                    "Session loaded"
                );
                session
            }
            Ok(None) => StoredSession::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, starting signed out");
                StoredSession::default()
            }
        };

        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(current),
                revision: AtomicU64::new(0),
                storage: Box::new(storage),
            }),
        }
    }

    /// A store that forgets everything when the process exits.
    pub fn in_memory() -> Self {
        Self::open(MemoryStorage::new())
    }

    pub fn get_access(&self) -> Option<String> {
        self.read(|s| s.access_token.clone())
    }

    pub fn get_renewal(&self) -> Option<String> {
        self.read(|s| s.refresh_token.clone())
    }

    /// The access credential together with the revision it belongs to.
    pub fn access_with_revision(&self) -> (Option<String>, u64) {
        let current = self
            .inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        (
            current.access_token.clone(),
            self.inner.revision.load(Ordering::Acquire),
        )
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read(|s| s.user.clone())
    }

    pub fn snapshot(&self) -> StoredSession {
        self.read(|s| s.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.access_token.is_some() && s.refresh_token.is_some())
    }

    /// Replace the whole session.
    ///
    /// The in-memory session is updated even when persisting fails; the error
    /// only reports that the next process will not see it.
    pub fn set_session(
        &self,
        access: String,
        renewal: String,
        identity: Option<Identity>,
    ) -> Result<(), StorageError> {
        self.replace(|_| StoredSession::new(access, renewal, identity))
    }

    /// Install a renewed access credential, keeping the identity and, unless a
    /// new one is supplied, the renewal credential.
    ///
    /// Only applies while the stored renewal credential is still `exchanged`.
    /// Returns `Ok(false)` and leaves the store untouched if the session was
    /// cleared or replaced in the meantime.
    pub fn replace_access(
        &self,
        exchanged: &str,
        access: String,
        renewal: Option<String>,
    ) -> Result<bool, StorageError> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.refresh_token.as_deref() != Some(exchanged) {
            return Ok(false);
        }
        let next = StoredSession {
            access_token: Some(access),
            refresh_token: renewal.or_else(|| current.refresh_token.clone()),
            user: current.user.clone(),
            updated_at: Some(Utc::now()),
        };
        *current = next;
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
        self.inner.storage.save(&*current)?;
        Ok(true)
    }

    /// Remove all three entries. Clearing an empty store succeeds.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = StoredSession::default();
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
        self.inner.storage.clear()
    }

    fn read<T>(&self, f: impl FnOnce(&StoredSession) -> T) -> T {
        let current = self
            .inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&*current)
    }

    fn replace(&self, f: impl FnOnce(&StoredSession) -> StoredSession) -> Result<(), StorageError> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = f(&*current);
        *current = next;
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
        self.inner.storage.save(&*current)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the credentials themselves
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Identity {
        Identity {
            id: "7".to_string(),
            email: Some("patient@example.com".to_string()),
            full_name: None,
            role: Some("patient".to_string()),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.get_access(), None);
        assert_eq!(store.get_renewal(), None);
        assert_eq!(store.identity(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_set_session_persists_all_fields() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::open(storage.clone());

        store
            .set_session("a1".into(), "r1".into(), Some(patient()))
            .unwrap();

        assert_eq!(store.get_access().as_deref(), Some("a1"));
        assert_eq!(store.get_renewal().as_deref(), Some("r1"));
        assert_eq!(store.identity(), Some(patient()));

        let persisted = storage.snapshot().expect("session should be persisted");
        assert_eq!(persisted.access_token.as_deref(), Some("a1"));
        assert_eq!(persisted.refresh_token.as_deref(), Some("r1"));
        assert_eq!(persisted.user, Some(patient()));
    }

    #[test]
    fn test_replace_access_keeps_renewal_and_identity() {
        let store = CredentialStore::in_memory();
        store
            .set_session("a1".into(), "r1".into(), Some(patient()))
            .unwrap();

        assert!(store.replace_access("r1", "a2".into(), None).unwrap());
        assert_eq!(store.get_access().as_deref(), Some("a2"));
        assert_eq!(store.get_renewal().as_deref(), Some("r1"));
        assert_eq!(store.identity(), Some(patient()));

        assert!(store.replace_access("r1", "a3".into(), Some("r2".into())).unwrap());
        assert_eq!(store.get_access().as_deref(), Some("a3"));
        assert_eq!(store.get_renewal().as_deref(), Some("r2"));
    }

    #[test]
    fn test_replace_access_after_clear_is_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::open(storage.clone());
        store.set_session("a1".into(), "r1".into(), None).unwrap();
        store.clear().unwrap();

        assert!(!store.replace_access("r1", "a2".into(), None).unwrap());
        assert!(store.snapshot().is_empty());
        assert!(storage.snapshot().is_none());
    }

    #[test]
    fn test_replace_access_after_new_login_is_dropped() {
        let store = CredentialStore::in_memory();
        store.set_session("a1".into(), "r1".into(), None).unwrap();
        store.set_session("b1".into(), "s1".into(), None).unwrap();

        assert!(!store.replace_access("r1", "a2".into(), None).unwrap());
        assert_eq!(store.get_access().as_deref(), Some("b1"));
        assert_eq!(store.get_renewal().as_deref(), Some("s1"));
    }

    #[test]
    fn test_every_mutation_bumps_revision() {
        let store = CredentialStore::in_memory();
        let (access, start) = store.access_with_revision();
        assert_eq!(access, None);

        store.set_session("a1".into(), "r1".into(), None).unwrap();
        let (access, after_login) = store.access_with_revision();
        assert_eq!(access.as_deref(), Some("a1"));
        assert!(after_login > start);

        store.replace_access("r1", "a2".into(), None).unwrap();
        assert!(store.revision() > after_login);
        let after_renewal = store.revision();

        store.clear().unwrap();
        assert!(store.revision() > after_renewal);

        // A refused replacement changes nothing
        let after_clear = store.revision();
        store.replace_access("r1", "a3".into(), None).unwrap();
        assert_eq!(store.revision(), after_clear);
    }

    #[test]
    fn test_clear_twice() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::open(storage.clone());
        store.set_session("a1".into(), "r1".into(), None).unwrap();

        store.clear().unwrap();
        assert!(store.snapshot().is_empty());
        assert!(storage.snapshot().is_none());

        store.clear().unwrap();
        assert!(store.snapshot().is_empty());
        assert!(storage.snapshot().is_none());
    }

    #[test]
    fn test_open_loads_existing_session() {
        let storage = MemoryStorage::with_session(StoredSession {
            access_token: None,
            refresh_token: Some("r-only".into()),
            user: None,
            updated_at: None,
        });
        let store = CredentialStore::open(storage);
        assert_eq!(store.get_access(), None);
        assert_eq!(store.get_renewal().as_deref(), Some("r-only"));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_clones_share_state() {
        let store = CredentialStore::in_memory();
        let other = store.clone();
        store.set_session("a1".into(), "r1".into(), None).unwrap();
        assert_eq!(other.get_access().as_deref(), Some("a1"));
        other.clear().unwrap();
        assert_eq!(store.get_access(), None);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let store = CredentialStore::in_memory();
        store.set_session("secret-access".into(), "secret-refresh".into(), None).unwrap();
        let printed = format!("{:?}", store);
        assert!(!printed.contains("secret"));
    }
}
