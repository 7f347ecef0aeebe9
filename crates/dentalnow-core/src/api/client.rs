//! API client for communicating with the DentalNow REST API.
//!
//! Every call goes through [`ApiClient::execute`], which attaches the current
//! access credential and recovers from its expiry transparently.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::renewal::RenewalCoordinator;
use super::transport::HttpTransport;
use super::{endpoints, ApiError, ApiRequest};
use crate::auth::{CredentialStore, Identity, NoopObserver, SessionEvent, SessionObserver};
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// API client for DentalNow.
/// Clone is cheap and clones share the credential store and any renewal in flight.
#[derive(Clone)]
pub struct ApiClient {
    transport: HttpTransport,
    store: CredentialStore,
    observer: Arc<dyn SessionObserver>,
    renewal: RenewalCoordinator,
}

impl ApiClient {
    /// Create a client bound to one application session.
    pub fn new(
        config: &Config,
        store: CredentialStore,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config)?;
        let renewal = RenewalCoordinator::new(transport.clone(), store.clone(), observer.clone());
        Ok(Self {
            transport,
            store,
            observer,
            renewal,
        })
    }

    /// A client whose session events go nowhere.
    pub fn without_observer(config: &Config, store: CredentialStore) -> Result<Self, ApiError> {
        Self::new(config, store, Arc::new(NoopObserver))
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Send a request, renewing the access credential once if it is rejected.
    ///
    /// Returns the decoded body (`null` for an empty one). A 401 on a request
    /// that was already retried ends the session.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<Value, ApiError> {
        let (sent_with, dispatched) = self.store.access_with_revision();
        if let Some(ref token) = sent_with {
            request.set_bearer(token)?;
        }

        match self.transport.send(&request).await {
            Ok(body) => Ok(body),
            Err(err) if err.is_unauthorized() => {
                if !request.mark_retried() {
                    warn!(path = request.path(), "Credential rejected on a retried request");
                    return Err(self.renewal.expire(format!(
                        "Credential rejected after renewal: {}",
                        err
                    )));
                }
                debug!(path = request.path(), "Access credential rejected, renewing");
                self.renewal
                    .renew_and_retry(request, sent_with, dispatched)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn execute_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path().to_string();
        let body = self.execute(request).await?;
        serde_json::from_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
        })
    }

    // ===== Verb helpers =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::get(path)).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, params: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute_as(ApiRequest::get(path).with_query(params)?).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute_as(ApiRequest::post(path).with_json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute_as(ApiRequest::put(path).with_json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::delete(path)).await
    }

    // ===== Session =====

    /// Sign in with username and password and start a new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ApiError> {
        let body = self
            .transport
            .send_form(
                endpoints::AUTH_TOKEN,
                &[("username", username), ("password", password)],
            )
            .await?;
        let tokens: TokenResponse = serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;

        let mut me = ApiRequest::get(endpoints::AUTH_ME);
        me.set_bearer(&tokens.access_token)?;
        let user: Identity = serde_json::from_value(self.transport.send(&me).await?)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse user profile: {}", e)))?;

        if let Err(e) = self
            .store
            .set_session(tokens.access_token, tokens.refresh_token, Some(user.clone()))
        {
            warn!(error = %e, "Failed to persist session");
        }

        info!(user_id = %user.id, "Signed in");
        self.observer.on_session_event(SessionEvent::LoggedIn);
        Ok(user)
    }

    /// End the session locally.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        info!("Signed out");
        self.observer.on_session_event(SessionEvent::LoggedOut);
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport)
            .field("store", &self.store)
            .finish()
    }
}
