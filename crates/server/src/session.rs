//! Session manager wrapper for rmcp's streamable HTTP transport.
//!
//! Delegates the protocol mechanics to rmcp's `LocalSessionManager` and adds
//! lifecycle tracking: creation timestamps, an active-session count and idempotent
//! close logging.

use futures::Stream;
use parking_lot::RwLock;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::common::server_side_http::ServerSseMessage;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::session::{SessionId, SessionManager};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

#[derive(Default)]
pub struct TrackedSessionManager {
    inner: LocalSessionManager,
    active: RwLock<HashMap<String, Instant>>,
}

impl TrackedSessionManager {
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active.read().len()
    }

    async fn create_session_impl(
        &self,
    ) -> Result<
        (SessionId, <LocalSessionManager as SessionManager>::Transport),
        <LocalSessionManager as SessionManager>::Error,
    > {
        let (id, transport) = self.inner.create_session().await?;
        self.active
            .write()
            .insert(id.to_string(), Instant::now());
        tracing::info!(session = %id, "session created");
        Ok((id, transport))
    }

    async fn close_session_impl(
        &self,
        id: &SessionId,
    ) -> Result<(), <LocalSessionManager as SessionManager>::Error> {
        let result = self.inner.close_session(id).await;

        // Double-close is a no-op; only log the first removal.
        if let Some(created) = self.active.write().remove(id.as_ref()) {
            tracing::info!(
                session = %id,
                lived_secs = created.elapsed().as_secs(),
                "session closed",
            );
        }
        result
    }
}

impl SessionManager for TrackedSessionManager {
    type Error = <LocalSessionManager as SessionManager>::Error;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    fn create_session(
        &self,
    ) -> impl Future<Output = Result<(SessionId, Self::Transport), Self::Error>> + Send {
        self.create_session_impl()
    }

    fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<ServerJsonRpcMessage, Self::Error>> + Send {
        self.inner.initialize_session(id, message)
    }

    fn has_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.inner.has_session(id)
    }

    fn close_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.close_session_impl(id)
    }

    fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_stream(id, message)
    }

    fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inner.accept_message(id, message)
    }

    fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_standalone_stream(id)
    }

    fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.resume(id, last_event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_tracked_and_close_is_idempotent() {
        let manager = TrackedSessionManager::default();
        assert_eq!(manager.active_sessions(), 0);

        let (id, _transport) = manager.create_session_impl().await.expect("create");
        assert_eq!(manager.active_sessions(), 1);
        assert!(manager.has_session(&id).await.expect("has_session"));

        manager.close_session_impl(&id).await.expect("close");
        assert_eq!(manager.active_sessions(), 0);
        assert!(!manager.has_session(&id).await.expect("has_session"));

        // Second close must not fail or double-count.
        let _ = manager.close_session_impl(&id).await;
        assert_eq!(manager.active_sessions(), 0);
    }

    #[tokio::test]
    async fn sessions_get_distinct_identifiers() {
        let manager = TrackedSessionManager::default();
        let (a, _ta) = manager.create_session_impl().await.expect("create");
        let (b, _tb) = manager.create_session_impl().await.expect("create");
        assert_ne!(a, b);
        assert_eq!(manager.active_sessions(), 2);
    }
}
