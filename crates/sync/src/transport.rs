//! Transport layer abstraction.
//!
//! The sync manager consumes an opaque capability; the implementer supplies
//! the wire protocol (HTTP, framing, TLS, retries are all out of scope
//! here). Server-side push handling must be idempotent by event guid.

use async_trait::async_trait;
use fieldbook_domain::{AuditLogEntry, FormSubmission};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Opaque credentials forwarded to the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Opaque auth token; stored through the auth adapter, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server acknowledgement for a pushed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// Events newly accepted (duplicates are counted as accepted too).
    pub accepted: usize,
}

/// One pulled page of remote events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullPage {
    pub events: Vec<FormSubmission>,
    /// Cursor for the next page; `None` ends the pull.
    pub next_cursor: Option<String>,
}

/// Remote sync capability the core consumes.
#[async_trait]
pub trait RemoteSyncTransport: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, TransportError>;

    async fn refresh_token(&self, token: &AuthToken) -> Result<AuthToken, TransportError>;

    /// Push one page of local events. Must be idempotent server-side by guid.
    async fn push_events(&self, page: &[FormSubmission]) -> Result<PushAck, TransportError>;

    /// Pull a page of events with timestamps strictly after `since`.
    async fn pull_events(&self, since: &str, limit: usize) -> Result<PullPage, TransportError>;

    /// Mirror of the event pair for audit entries.
    async fn push_audit_logs(&self, entries: &[AuditLogEntry]) -> Result<(), TransportError>;

    async fn pull_audit_logs(&self, since: &str) -> Result<Vec<AuditLogEntry>, TransportError>;
}

/// An in-memory transport backed by a fake server, for tests.
pub mod mock {
    use super::*;
    use fieldbook_core::SyncLevel;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MockServer {
        events: Vec<FormSubmission>,
        audit: Vec<AuditLogEntry>,
        pushed_pages: Vec<usize>,
        fail_push_on_page: Option<usize>,
        tokens_issued: u32,
    }

    /// A fake remote peer holding its own event log.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        state: Mutex<MockServer>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Preload the fake server's log (events other clients uploaded).
        pub fn seed_events(&self, events: Vec<FormSubmission>) {
            let mut state = self.state.lock().unwrap();
            for event in events {
                state.events.push(event.with_sync_level(SyncLevel::Remote));
            }
        }

        pub fn seed_audit_logs(&self, entries: Vec<AuditLogEntry>) {
            self.state.lock().unwrap().audit.extend(entries);
        }

        /// Everything the fake server has accepted so far.
        pub fn server_events(&self) -> Vec<FormSubmission> {
            self.state.lock().unwrap().events.clone()
        }

        pub fn server_audit_logs(&self) -> Vec<AuditLogEntry> {
            self.state.lock().unwrap().audit.clone()
        }

        /// Sizes of the pages received via `push_events`, in order.
        pub fn pushed_pages(&self) -> Vec<usize> {
            self.state.lock().unwrap().pushed_pages.clone()
        }

        /// Make the n-th (0-based) `push_events` call fail transiently, once.
        pub fn fail_push_on_page(&self, page: usize) {
            self.state.lock().unwrap().fail_push_on_page = Some(page);
        }
    }

    #[async_trait]
    impl RemoteSyncTransport for MockTransport {
        async fn authenticate(
            &self,
            _credentials: &Credentials,
        ) -> Result<AuthToken, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.tokens_issued += 1;
            Ok(AuthToken::new(format!("token-{}", state.tokens_issued)))
        }

        async fn refresh_token(&self, token: &AuthToken) -> Result<AuthToken, TransportError> {
            Ok(AuthToken::new(format!("{}-refreshed", token.as_str())))
        }

        async fn push_events(&self, page: &[FormSubmission]) -> Result<PushAck, TransportError> {
            let mut state = self.state.lock().unwrap();
            let page_index = state.pushed_pages.len();
            if state.fail_push_on_page == Some(page_index) {
                state.fail_push_on_page = None;
                return Err(TransportError::Transient("connection reset".into()));
            }
            state.pushed_pages.push(page.len());

            let mut accepted = 0;
            for event in page {
                if !state.events.iter().any(|e| e.guid == event.guid) {
                    state
                        .events
                        .push(event.clone().with_sync_level(SyncLevel::Remote));
                }
                accepted += 1;
            }
            Ok(PushAck { accepted })
        }

        async fn pull_events(
            &self,
            since: &str,
            limit: usize,
        ) -> Result<PullPage, TransportError> {
            let state = self.state.lock().unwrap();
            let mut matching: Vec<FormSubmission> = state
                .events
                .iter()
                .filter(|e| e.timestamp.as_str() > since)
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            let remainder = matching.len() > limit;
            let events: Vec<FormSubmission> = matching.into_iter().take(limit).collect();
            let next_cursor = if remainder {
                events.last().map(|e| e.timestamp.clone())
            } else {
                None
            };
            Ok(PullPage {
                events,
                next_cursor,
            })
        }

        async fn push_audit_logs(
            &self,
            entries: &[AuditLogEntry],
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            for entry in entries {
                if !state.audit.iter().any(|a| a.guid == entry.guid) {
                    state.audit.push(entry.clone());
                }
            }
            Ok(())
        }

        async fn pull_audit_logs(
            &self,
            since: &str,
        ) -> Result<Vec<AuditLogEntry>, TransportError> {
            let state = self.state.lock().unwrap();
            let mut matching: Vec<AuditLogEntry> = state
                .audit
                .iter()
                .filter(|a| a.timestamp.as_str() > since)
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            Ok(matching)
        }
    }
}
