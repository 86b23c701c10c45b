//! Authenticated sessions
//!
//! The session manager logs in lazily on the first privileged call and
//! keeps the resulting [`Session`] until the server rejects it. There is no
//! proactive refresh: a 401 invalidates the session that failed, and the
//! next caller logs in again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use stratus_credential::{CredentialSource, SecretString};
use tracing::{info, warn};

use crate::cache::CacheEntry;
use crate::error::{ClientError, ClientResult};
use crate::http::Transport;

/// Prefix on every error raised while obtaining a session
pub const AUTHENTICATE_CONTEXT: &str = "failed to authenticate";

/// Ticket and anti-forgery token for one principal on one endpoint
#[derive(Debug)]
pub struct Session {
    endpoint: String,
    principal: String,
    ticket: SecretString,
    csrf_token: SecretString,
    issued_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        endpoint: String,
        principal: &str,
        ticket: SecretString,
        csrf_token: SecretString,
    ) -> Self {
        Self {
            endpoint,
            principal: principal.to_string(),
            ticket,
            csrf_token,
            issued_at: Utc::now(),
        }
    }

    /// Server the session belongs to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Principal that logged in
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Authentication ticket sent as a cookie
    pub fn ticket(&self) -> &SecretString {
        &self.ticket
    }

    /// Anti-forgery token sent on mutating requests
    pub fn csrf_token(&self) -> &SecretString {
        &self.csrf_token
    }

    /// When the login happened
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Lazily authenticated session for one client
pub(crate) struct SessionManager {
    transport: Arc<Transport>,
    credentials: Arc<dyn CredentialSource>,
    current: CacheEntry<Arc<Session>>,
}

impl SessionManager {
    pub(crate) fn new(transport: Arc<Transport>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            transport,
            credentials,
            current: CacheEntry::unbounded("session"),
        }
    }

    /// The live session, logging in if there is none
    ///
    /// Concurrent callers without a session wait for a single login.
    /// Failures carry the [`AUTHENTICATE_CONTEXT`] prefix.
    pub(crate) async fn current(&self) -> ClientResult<Arc<Session>> {
        self.current
            .get_or_fetch(|| async {
                let profile = self
                    .credentials
                    .credentials()
                    .await
                    .map_err(|e| ClientError::from(e).context(AUTHENTICATE_CONTEXT))?;
                if profile.endpoint != self.transport.endpoint() {
                    warn!(
                        source_endpoint = %profile.endpoint,
                        client_endpoint = %self.transport.endpoint(),
                        "credential source endpoint differs from client endpoint"
                    );
                }
                let session = self
                    .transport
                    .login(&profile.principal, &profile.secret)
                    .await
                    .map_err(|e| e.context(AUTHENTICATE_CONTEXT))?;
                info!(
                    principal = %session.principal(),
                    endpoint = %session.endpoint(),
                    "authenticated"
                );
                Ok::<_, ClientError>(Arc::new(session))
            })
            .await
    }

    /// Drop `stale` if it is still the live session
    ///
    /// A session another caller already replaced is left alone, so a burst of
    /// 401s triggers one re-login rather than one per request.
    pub(crate) async fn invalidate(&self, stale: &Arc<Session>) -> bool {
        let dropped = self
            .current
            .invalidate_if(|live| Arc::ptr_eq(live, stale))
            .await;
        if dropped {
            info!(principal = %stale.principal(), "session rejected by server, dropped");
        }
        dropped
    }

    /// Logins performed so far
    pub(crate) fn login_count(&self) -> u64 {
        self.current.fetch_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_tokens() {
        let session = Session::new(
            "https://pve:8006".to_string(),
            "root@pam",
            SecretString::new("PVE:root@pam:TICKET"),
            SecretString::new("CSRF-TOKEN"),
        );
        let debug = format!("{session:?}");
        assert!(!debug.contains("TICKET"));
        assert!(!debug.contains("CSRF-TOKEN"));
        assert!(debug.contains("root@pam"));
    }
}
