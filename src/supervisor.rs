//! Reconnect-forever supervision of the session.

use std::time::Duration;

use crate::session::Session;

/// Wraps a [`Session`] in an unconditional retry loop. Every failure —
/// connect refused, handshake rejected, mid-session disconnect — is logged
/// and followed by the same fixed delay before the whole session (including
/// re-registration) is restarted. No retry cap, no backoff growth.
pub struct Supervisor {
    session: Session,
    reconnect_delay: Duration,
}

impl Supervisor {
    pub fn new(session: Session, reconnect_delay: Duration) -> Self {
        Self {
            session,
            reconnect_delay,
        }
    }

    /// Never returns under normal operation.
    pub async fn run(&self) {
        loop {
            match self.session.run_once().await {
                Ok(()) => tracing::warn!(
                    delay = ?self.reconnect_delay,
                    "Session ended, reconnecting"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    delay = ?self.reconnect_delay,
                    "Session failed, reconnecting"
                ),
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
