#![allow(dead_code)]

use std::sync::Arc;

use dentalnow_core::{
    ApiClient, ChannelObserver, Config, CredentialStore, MemoryStorage, SessionEvent,
    StoredSession,
};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::MockServer;

pub const API_PREFIX: &str = "/api/v1";

pub struct Harness {
    pub client: ApiClient,
    pub storage: Arc<MemoryStorage>,
    pub events: UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn expired_count(&mut self) -> usize {
        self.drain_events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::Expired { .. }))
            .count()
    }
}

pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub fn config_for(server: &MockServer) -> Config {
    Config {
        api_base_url: format!("{}{}", server.uri(), API_PREFIX),
        request_timeout_secs: 5,
        session_dir: None,
    }
}

pub fn session(access: Option<&str>, refresh: Option<&str>) -> StoredSession {
    StoredSession {
        access_token: access.map(str::to_string),
        refresh_token: refresh.map(str::to_string),
        user: None,
        updated_at: None,
    }
}

/// Client over an in-memory store seeded with `seed` (if any).
pub fn harness(server: &MockServer, seed: Option<StoredSession>) -> Harness {
    let storage = Arc::new(match seed {
        Some(s) => MemoryStorage::with_session(s),
        None => MemoryStorage::new(),
    });
    let store = CredentialStore::open(storage.clone());
    let (observer, events) = ChannelObserver::new();
    let client = ApiClient::new(&config_for(server), store, Arc::new(observer))
        .expect("Failed to build client");
    Harness {
        client,
        storage,
        events,
    }
}
