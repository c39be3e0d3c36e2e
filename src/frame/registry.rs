// src/frame/registry.rs
use crate::frame::protocol::{FrameAction, FrameReply};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

pub type ResponseHandler = Box<dyn FnOnce(FrameReply) + Send>;

/// Handle returned by [`ListenerRegistry::register`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// What a reply must carry to resolve a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    pub action: FrameAction,
    pub app_id: Option<String>,
    pub request_id: Option<String>,
}

impl CorrelationKey {
    pub fn action(action: FrameAction) -> Self {
        Self {
            action,
            app_id: None,
            request_id: None,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn matches(&self, reply: &FrameReply) -> bool {
        if reply.action() != self.action {
            return false;
        }
        if let Some(app_id) = &self.app_id {
            if reply.app_id() != Some(app_id.as_str()) {
                return false;
            }
        }
        if let Some(request_id) = &self.request_id {
            if reply.request_id() != Some(request_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One in-flight request waiting on the frame.
pub struct PendingRequest {
    pub token: ListenerToken,
    pub origin: String,
    pub correlation_key: CorrelationKey,
    pub created_at: DateTime<Utc>,
    response_handler: ResponseHandler,
}

impl PendingRequest {
    pub fn action(&self) -> FrameAction {
        self.correlation_key.action
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("token", &self.token)
            .field("origin", &self.origin)
            .field("correlation_key", &self.correlation_key)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Snapshot of a pending request for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSummary {
    pub token: ListenerToken,
    pub action: FrameAction,
    pub created_at: DateTime<Utc>,
}

/// Per-channel listener set. Each registered listener fires at most once and
/// is removed before its handler runs; a reply resolves the oldest matching
/// listener only.
#[derive(Default)]
pub struct ListenerRegistry {
    next_token: AtomicU64,
    pending: Mutex<Vec<PendingRequest>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, correlation_key: CorrelationKey, origin: &str, handler: F) -> ListenerToken
    where
        F: FnOnce(FrameReply) + Send + 'static,
    {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        log::debug!("Registering {} listener {:?}", correlation_key.action, token);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(PendingRequest {
            token,
            origin: origin.to_string(),
            correlation_key,
            created_at: Utc::now(),
            response_handler: Box::new(handler),
        });
        token
    }

    /// Removes a listener without firing it. Returns false if it already fired.
    pub fn deregister(&self, token: ListenerToken) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let before = pending.len();
        pending.retain(|req| req.token != token);
        let removed = pending.len() != before;
        if removed {
            log::debug!("Deregistered listener {:?}", token);
        }
        removed
    }

    /// Hands `reply` to the first-registered listener matching it, if any.
    pub fn dispatch(&self, origin: &str, reply: FrameReply) -> bool {
        let request = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let position = pending
                .iter()
                .position(|req| req.origin == origin && req.correlation_key.matches(&reply));
            match position {
                Some(index) => pending.remove(index),
                None => return false,
            }
        };
        log::debug!("Resolving {} listener {:?}", request.action(), request.token);
        (request.response_handler)(reply);
        true
    }

    pub fn pending(&self) -> Vec<PendingSummary> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .iter()
            .map(|req| PendingSummary {
                token: req.token,
                action: req.action(),
                created_at: req.created_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::ApprovalReply;
    use std::sync::Arc;

    const ORIGIN: &str = "https://wallet.example";

    fn sign_reply(response: &str) -> FrameReply {
        FrameReply::Sign(ApprovalReply {
            approved: true,
            response: serde_json::Value::String(response.to_string()),
            request_id: None,
        })
    }

    #[test]
    fn test_fires_once_and_deregisters() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        registry.register(CorrelationKey::action(FrameAction::Sign), ORIGIN, move |reply| {
            sink.lock().unwrap().push(reply);
        });

        assert!(registry.dispatch(ORIGIN, sign_reply("first")));
        assert!(!registry.dispatch(ORIGIN, sign_reply("duplicate")));
        assert_eq!(hits.lock().unwrap().len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_action_resolves_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let sink = Arc::clone(&order);
            registry.register(CorrelationKey::action(FrameAction::Sign), ORIGIN, move |reply| {
                if let FrameReply::Sign(approval) = reply {
                    sink.lock().unwrap().push((name, approval.response));
                }
            });
        }

        registry.dispatch(ORIGIN, sign_reply("r1"));
        assert_eq!(registry.len(), 1);
        registry.dispatch(ORIGIN, sign_reply("r2"));

        let order = order.lock().unwrap();
        assert_eq!(order[0], ("a", serde_json::json!("r1")));
        assert_eq!(order[1], ("b", serde_json::json!("r2")));
    }

    #[test]
    fn test_scoped_by_action_origin_and_request_id() {
        let registry = ListenerRegistry::new();
        registry.register(CorrelationKey::action(FrameAction::Transaction), ORIGIN, |_| {});
        registry.register(
            CorrelationKey::action(FrameAction::Sign).with_request_id("r-1"),
            ORIGIN,
            |_| {},
        );

        assert!(!registry.dispatch(ORIGIN, sign_reply("no id")));
        assert!(!registry.dispatch("https://evil.example", sign_reply("x")));

        let tagged = FrameReply::Sign(ApprovalReply {
            approved: true,
            response: serde_json::Value::Null,
            request_id: Some("r-1".to_string()),
        });
        assert!(registry.dispatch(ORIGIN, tagged));
        assert_eq!(registry.pending()[0].action, FrameAction::Transaction);
    }

    #[test]
    fn test_deregister() {
        let registry = ListenerRegistry::new();
        let token = registry.register(CorrelationKey::action(FrameAction::Logout), ORIGIN, |_| {
            panic!("deregistered listener must not fire")
        });
        assert!(registry.deregister(token));
        assert!(!registry.deregister(token));
        assert!(!registry.dispatch(ORIGIN, FrameReply::Logout(ApprovalReply::default())));
        assert!(registry.is_empty());
    }
}
