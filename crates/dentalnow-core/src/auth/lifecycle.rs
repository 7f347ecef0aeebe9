//! Session lifecycle notifications for the host application.
//!
//! The client never navigates anywhere itself. When the session can no longer
//! be recovered it emits [`SessionEvent::Expired`], and the host decides how to
//! bring the user back to the login screen.

use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    /// A fresh access credential was obtained from the renewal credential.
    Renewed,
    LoggedOut,
    /// The session was torn down; the user must sign in again.
    Expired { reason: String },
}

pub trait SessionObserver: Send + Sync {
    fn on_session_event(&self, event: SessionEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_session_event(&self, _event: SessionEvent) {}
}

/// Forwards events to a channel the host drains on its own schedule.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn on_session_event(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}
