//! Access credential renewal.
//!
//! A request that was rejected with 401 lands here once. Renewal is
//! single-flight: the first request starts the exchange of the refresh token
//! and every request rejected while it runs awaits the same result, then
//! replays itself with the new credential. If the exchange fails the session
//! is torn down exactly once and the host is told via
//! [`SessionEvent::Expired`]. Requests whose 401 arrives after that failure
//! share its outcome instead of starting another exchange.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::transport::HttpTransport;
use super::{endpoints, ApiError, ApiRequest};
use crate::auth::{CredentialStore, SessionEvent, SessionObserver};

/// Outcome of one exchange: the new access credential or the teardown reason.
type PendingRenewal = Shared<BoxFuture<'static, Result<String, String>>>;

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

enum ExchangeFailure {
    /// No renewal credential, or the server refused it.
    Rejected(String),
    /// The session was cleared or replaced while the exchange ran.
    Superseded(String),
}

/// The last exchange that did not produce a credential.
struct FailedExchange {
    /// Store revision when the exchange started; requests dispatched at or
    /// before it carried a credential that exchange already gave up on.
    revision: u64,
    reason: String,
}

#[derive(Clone)]
pub(crate) struct RenewalCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: HttpTransport,
    store: CredentialStore,
    observer: Arc<dyn SessionObserver>,
    in_flight: Mutex<Option<PendingRenewal>>,
    last_failure: Mutex<Option<FailedExchange>>,
}

impl RenewalCoordinator {
    pub(crate) fn new(
        transport: HttpTransport,
        store: CredentialStore,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                observer,
                in_flight: Mutex::new(None),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// Obtain a fresh access credential and replay `request` with it.
    ///
    /// `sent_with` is the credential the request carried when it was
    /// rejected and `dispatched` the store revision it was read at. The
    /// replay goes straight to the transport, so a second 401 ends the
    /// session instead of renewing again.
    pub(crate) async fn renew_and_retry(
        &self,
        mut request: ApiRequest,
        sent_with: Option<String>,
        dispatched: u64,
    ) -> Result<Value, ApiError> {
        let access = self
            .fresh_access(sent_with.as_deref(), dispatched)
            .await
            .map_err(|reason| ApiError::SessionExpired { reason })?;

        if let Err(e) = request.set_bearer(&access) {
            return Err(self.expire(format!("Cannot attach renewed credential: {}", e)));
        }

        match self.inner.transport.send(&request).await {
            Ok(body) => {
                debug!(path = request.path(), "Replay succeeded");
                Ok(body)
            }
            Err(e) => Err(self.expire(format!("Replay of {} failed: {}", request.path(), e))),
        }
    }

    /// Tear the session down and build the error the caller should see.
    pub(crate) fn expire(&self, reason: String) -> ApiError {
        self.inner.teardown(&reason);
        ApiError::SessionExpired { reason }
    }

    async fn fresh_access(&self, sent_with: Option<&str>, dispatched: u64) -> Result<String, String> {
        // Another request may have renewed between our dispatch and our 401.
        if let Some(current) = self.inner.store.get_access() {
            if sent_with != Some(current.as_str()) {
                debug!("Access credential already renewed, replaying with it");
                return Ok(current);
            }
        }

        let pending = {
            let mut slot = self.inner.lock_in_flight();
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining renewal already in flight");
                    pending.clone()
                }
                None => {
                    if let Some(reason) = self.inner.failure_covering(dispatched) {
                        debug!("Credential already abandoned by a failed renewal");
                        return Err(reason);
                    }
                    let started = self.inner.store.revision();
                    // Spawned so the exchange finishes even if every caller gives up.
                    let task = tokio::spawn(Inner::exchange(Arc::clone(&self.inner), started));
                    let pending = async move {
                        task.await
                            .unwrap_or_else(|e| Err(format!("Renewal task failed: {}", e)))
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.await;

        // Normally the exchange clears the slot itself; this covers a panicked task.
        let mut slot = self.inner.lock_in_flight();
        if slot.as_ref().is_some_and(|p| p.peek().is_some()) {
            *slot = None;
        }

        outcome
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<PendingRenewal>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_failure(&self) -> MutexGuard<'_, Option<FailedExchange>> {
        self.last_failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure_covering(&self, dispatched: u64) -> Option<String> {
        self.lock_last_failure()
            .as_ref()
            .filter(|failed| dispatched <= failed.revision)
            .map(|failed| failed.reason.clone())
    }

    async fn exchange(self: Arc<Self>, started: u64) -> Result<String, String> {
        let outcome = match self.request_new_access().await {
            Ok(access) => {
                info!("Access credential renewed");
                self.observer.on_session_event(SessionEvent::Renewed);
                Ok(access)
            }
            Err(failure) => {
                let reason = match failure {
                    ExchangeFailure::Rejected(reason) => {
                        self.teardown(&reason);
                        reason
                    }
                    ExchangeFailure::Superseded(reason) => {
                        info!("Session changed during renewal, discarding renewed credential");
                        reason
                    }
                };
                *self.lock_last_failure() = Some(FailedExchange {
                    revision: started,
                    reason: reason.clone(),
                });
                Err(reason)
            }
        };

        // Cleared last so a request that finds the slot empty also sees the failure.
        self.lock_in_flight().take();
        outcome
    }

    async fn request_new_access(&self) -> Result<String, ExchangeFailure> {
        let refresh_token = self
            .store
            .get_renewal()
            .ok_or_else(|| ExchangeFailure::Rejected("No renewal credential".to_string()))?;

        info!("Renewing access credential");
        let request = ApiRequest::post(endpoints::AUTH_REFRESH)
            .with_json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .map_err(|e| ExchangeFailure::Rejected(e.to_string()))?;

        let body = self
            .transport
            .send(&request)
            .await
            .map_err(|e| ExchangeFailure::Rejected(format!("Renewal rejected: {}", e)))?;

        let tokens: RefreshResponse = serde_json::from_value(body).map_err(|e| {
            ExchangeFailure::Rejected(format!("Malformed renewal response: {}", e))
        })?;
        if tokens.access_token.is_empty() {
            return Err(ExchangeFailure::Rejected(
                "Malformed renewal response: empty access_token".to_string(),
            ));
        }

        match self.store.replace_access(
            &refresh_token,
            tokens.access_token.clone(),
            tokens.refresh_token,
        ) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ExchangeFailure::Superseded(
                    "Session ended while renewing".to_string(),
                ))
            }
            Err(e) => warn!(error = %e, "Failed to persist renewed session"),
        }

        Ok(tokens.access_token)
    }

    fn teardown(&self, reason: &str) {
        info!(reason = reason, "Tearing down session");
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.observer.on_session_event(SessionEvent::Expired {
            reason: reason.to_string(),
        });
    }
}
