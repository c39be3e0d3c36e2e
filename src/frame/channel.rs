// src/frame/channel.rs
use crate::config::ConnectConfig;
use crate::error::ConnectError;
use crate::frame::protocol::{FrameAction, FrameReply, HostMessage, HostedUser, InboundMessage};
use crate::frame::registry::{CorrelationKey, ListenerRegistry, ListenerToken};
use crate::frame::transport::FrameTransport;
use rand::RngCore;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Channel settings taken from [`ConnectConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    pub trusted_origin: String,
    pub app_id: String,
    pub correlate_requests: bool,
    pub request_timeout: Option<Duration>,
}

impl From<&ConnectConfig> for FrameConfig {
    fn from(config: &ConnectConfig) -> Self {
        Self {
            trusted_origin: config.hosted_wallet_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            correlate_requests: config.correlate_requests,
            request_timeout: config.request_timeout(),
        }
    }
}

/// A user-facing operation run by the hosted wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedInteraction {
    pub action: FrameAction,
    /// Action-specific payload, passed through untouched.
    pub data: Value,
    /// Asks the frame to surface its own UI instead of resolving silently.
    pub show_wallet: Option<bool>,
}

impl HostedInteraction {
    pub fn new(action: FrameAction, data: Value) -> Self {
        Self {
            action,
            data,
            show_wallet: None,
        }
    }

    pub fn show_wallet(mut self) -> Self {
        self.show_wallet = Some(true);
        self
    }
}

/// What the frame answered to a [`HostedInteraction`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostedInteractionResponse {
    pub approved: bool,
    pub response: Value,
}

impl HostedInteractionResponse {
    fn from_reply(reply: FrameReply) -> Self {
        match reply {
            FrameReply::Sign(approval) | FrameReply::Transaction(approval) | FrameReply::Logout(approval) => Self {
                approved: approval.approved,
                response: approval.response,
            },
            FrameReply::Drip(data) => Self {
                approved: true,
                response: data,
            },
            FrameReply::User(user) => Self {
                approved: true,
                response: serde_json::to_value(user.user).unwrap_or(Value::Null),
            },
        }
    }

    /// `response.error` if the frame sent one, else `fallback`.
    pub fn rejection_reason(&self, fallback: &str) -> String {
        self.response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string()
    }

    /// `Ok(response)` when approved, `Rejected` with the embedded or fallback reason otherwise.
    pub fn into_result(self, fallback: &str) -> Result<Value, ConnectError> {
        if self.approved {
            Ok(self.response)
        } else {
            let reason = self.rejection_reason(fallback);
            log::info!("Hosted wallet rejected request: {}", reason);
            Err(ConnectError::Rejected(reason))
        }
    }
}

/// Request/response channel to the sandboxed hosted wallet frame.
///
/// Outbound messages go through a [`FrameTransport`]; inbound messages must be
/// fed to [`HostedFrameChannel::deliver`] by whatever receives the host
/// window's message events.
#[derive(Clone)]
pub struct HostedFrameChannel {
    config: Arc<FrameConfig>,
    transport: Arc<dyn FrameTransport>,
    registry: Arc<ListenerRegistry>,
}

impl HostedFrameChannel {
    pub fn new(config: FrameConfig, transport: Arc<dyn FrameTransport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            registry: Arc::new(ListenerRegistry::new()),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Routes one inbound message. Returns true if it resolved a pending request.
    ///
    /// Messages from any origin other than the hosted wallet url are dropped
    /// before the payload is looked at.
    pub fn deliver(&self, message: InboundMessage) -> bool {
        if message.origin != self.config.trusted_origin {
            log::debug!("Dropping frame message from untrusted origin {}", message.origin);
            return false;
        }
        let Some(reply) = FrameReply::decode(&message.data) else {
            log::debug!("Ignoring undecodable frame message");
            return false;
        };
        self.registry.dispatch(&message.origin, reply)
    }

    /// Asks the frame who is signed in. Resolves once, with the first trusted
    /// `user` reply echoing our app id. No timeout.
    pub async fn active_user(&self) -> Result<Option<HostedUser>, ConnectError> {
        let (tx, rx) = oneshot::channel();
        let key = CorrelationKey::action(FrameAction::User).with_app_id(self.config.app_id.clone());
        let token = self.registry.register(key, &self.config.trusted_origin, move |reply| {
            if let FrameReply::User(user_reply) = reply {
                let _ = tx.send(user_reply.user);
            }
        });

        log::debug!("Posting activeUser query");
        self.post(token, &HostMessage::query(FrameAction::ActiveUser))?;
        rx.await.map_err(|_| ConnectError::Cancelled)
    }

    /// Posts `interaction` and calls `on_response` exactly once when the
    /// matching reply arrives.
    pub fn hosted_interaction<F>(&self, interaction: HostedInteraction, on_response: F) -> Result<ListenerToken, ConnectError>
    where
        F: FnOnce(HostedInteractionResponse) + Send + 'static,
    {
        let HostedInteraction {
            action,
            mut data,
            show_wallet,
        } = interaction;
        let mut key = CorrelationKey::action(action);

        if self.config.correlate_requests {
            if data.is_null() {
                data = Value::Object(Map::new());
            }
            match data.as_object_mut() {
                Some(map) => {
                    let request_id = new_request_id();
                    map.insert("requestId".to_string(), Value::String(request_id.clone()));
                    key = key.with_request_id(request_id);
                }
                None => log::warn!("Cannot attach requestId to non-object {} payload", action),
            }
        }

        let token = self.registry.register(key, &self.config.trusted_origin, move |reply| {
            on_response(HostedInteractionResponse::from_reply(reply))
        });

        let message = HostMessage {
            action,
            data: Some(data),
            show_wallet,
        };
        self.post(token, &message)?;
        Ok(token)
    }

    /// Awaitable form of [`hosted_interaction`](Self::hosted_interaction),
    /// bounded by the configured request timeout if there is one.
    pub async fn request(&self, interaction: HostedInteraction) -> Result<HostedInteractionResponse, ConnectError> {
        match self.config.request_timeout {
            Some(timeout) => self.request_with_timeout(interaction, timeout).await,
            None => {
                let (tx, rx) = oneshot::channel();
                self.hosted_interaction(interaction, move |response| {
                    let _ = tx.send(response);
                })?;
                rx.await.map_err(|_| ConnectError::Cancelled)
            }
        }
    }

    /// Like [`request`](Self::request) but gives up after `timeout`, removing
    /// the pending listener so a late reply is ignored.
    pub async fn request_with_timeout(
        &self,
        interaction: HostedInteraction,
        timeout: Duration,
    ) -> Result<HostedInteractionResponse, ConnectError> {
        let action = interaction.action;
        let (tx, rx) = oneshot::channel();
        let token = self.hosted_interaction(interaction, move |response| {
            let _ = tx.send(response);
        })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(result) => result.map_err(|_| ConnectError::Cancelled),
            Err(_) => {
                self.registry.deregister(token);
                log::warn!("No {} reply from hosted wallet after {:?}", action, timeout);
                Err(ConnectError::Timeout(action.to_string()))
            }
        }
    }

    /// Requests test tokens for `address` from the hosted wallet's faucet.
    pub async fn drip(&self, address: &str) -> Result<Value, ConnectError> {
        let interaction = HostedInteraction::new(FrameAction::Drip, json!({ "address": address }));
        Ok(self.request(interaction).await?.response)
    }

    fn post(&self, token: ListenerToken, message: &HostMessage) -> Result<(), ConnectError> {
        if let Err(e) = self.transport.post_message(message) {
            self.registry.deregister(token);
            return Err(e);
        }
        Ok(())
    }
}

fn new_request_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{FakeFrame, APP_ID, WALLET_ORIGIN};

    #[tokio::test]
    async fn test_active_user_resolves_on_trusted_reply() {
        let mut frame = FakeFrame::new();
        let channel = frame.channel.clone();
        let pending = tokio::spawn(async move { channel.active_user().await });

        let posted = frame.next_posted().await;
        assert_eq!(posted, HostMessage::query(FrameAction::ActiveUser));

        assert!(frame.reply_user(Some(FakeFrame::user("a@b.c", &["0x1"]))));
        let user = pending.await.unwrap().unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
        assert!(frame.channel.registry().is_empty());
    }

    #[tokio::test]
    async fn test_active_user_ignores_foreign_origin_and_app_id() {
        let mut frame = FakeFrame::new();
        let channel = frame.channel.clone();
        let pending = tokio::spawn(async move { channel.active_user().await });
        frame.next_posted().await;

        let spoofed = json!({
            "action": "user",
            "data": { "appId": APP_ID, "user": { "email": "evil@x", "accounts": [] } }
        });
        assert!(!frame.channel.deliver(InboundMessage::new("https://evil.example", spoofed)));

        let other_app = json!({
            "action": "user",
            "data": { "appId": "other-app", "user": { "email": "other@x", "accounts": [] } }
        });
        assert!(!frame.channel.deliver(InboundMessage::new(WALLET_ORIGIN, other_app)));
        assert!(!frame.channel.deliver(InboundMessage::new(WALLET_ORIGIN, json!({ "junk": true }))));

        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        assert_eq!(frame.channel.registry().len(), 1);

        frame.reply_user(None);
        assert_eq!(pending.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_interaction_resolves() {
        let mut frame = FakeFrame::new();
        let channel = frame.channel.clone();
        let pending = tokio::spawn(async move {
            channel
                .request(HostedInteraction::new(FrameAction::Sign, json!({ "signData": "abc" })).show_wallet())
                .await
        });

        let posted = frame.next_posted().await;
        assert_eq!(posted.action, FrameAction::Sign);
        assert_eq!(posted.data, Some(json!({ "signData": "abc" })));
        assert_eq!(posted.show_wallet, Some(true));

        frame.reply("sign", json!({ "approved": true, "response": "0xsig" }));
        let response = pending.await.unwrap().unwrap();
        assert!(response.approved);
        assert_eq!(response.into_result("User rejected signing.").unwrap(), json!("0xsig"));
    }

    #[tokio::test]
    async fn test_duplicate_reply_fires_callback_once() {
        let mut frame = FakeFrame::new();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        frame
            .channel
            .hosted_interaction(HostedInteraction::new(FrameAction::Transaction, json!({})), move |response| {
                sink.lock().unwrap().push(response)
            })
            .unwrap();
        frame.next_posted().await;

        let rejection = json!({ "approved": false, "response": { "error": "User rejected transaction." } });
        assert!(frame.reply("transaction", rejection.clone()));
        assert!(!frame.reply("transaction", rejection));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].rejection_reason("fallback"), "User rejected transaction.");
    }

    #[tokio::test]
    async fn test_concurrent_actions_are_independent() {
        let mut frame = FakeFrame::new();
        let sign_channel = frame.channel.clone();
        let sign = tokio::spawn(async move {
            sign_channel.request(HostedInteraction::new(FrameAction::Sign, json!({}))).await
        });
        let tx_channel = frame.channel.clone();
        let transaction = tokio::spawn(async move {
            tx_channel.request(HostedInteraction::new(FrameAction::Transaction, json!({}))).await
        });
        frame.next_posted().await;
        frame.next_posted().await;

        frame.reply("transaction", json!({ "approved": true, "response": "digest" }));
        frame.reply("sign", json!({ "approved": true, "response": "0xsig" }));

        assert_eq!(transaction.await.unwrap().unwrap().response, json!("digest"));
        assert_eq!(sign.await.unwrap().unwrap().response, json!("0xsig"));
    }

    #[tokio::test]
    async fn test_correlated_requests_require_request_id() {
        let mut frame = FakeFrame::with_config(|config| config.correlate_requests = true);
        let channel = frame.channel.clone();
        let pending = tokio::spawn(async move {
            channel.request(HostedInteraction::new(FrameAction::Sign, json!({ "signData": "abc" }))).await
        });

        let posted = frame.next_posted().await;
        let data = posted.data.unwrap();
        let request_id = data["requestId"].as_str().unwrap().to_string();
        assert_eq!(request_id.len(), 16);
        assert_eq!(data["signData"], json!("abc"));

        assert!(!frame.reply("sign", json!({ "approved": true, "response": "stale" })));
        assert!(!frame.reply("sign", json!({ "approved": true, "response": "other", "requestId": "nope" })));
        assert!(frame.reply("sign", json!({ "approved": true, "response": "0xsig", "requestId": request_id })));
        assert_eq!(pending.await.unwrap().unwrap().response, json!("0xsig"));
    }

    #[tokio::test]
    async fn test_request_timeout_deregisters() {
        let mut frame = FakeFrame::new();
        let result = frame
            .channel
            .request_with_timeout(HostedInteraction::new(FrameAction::Logout, json!({})), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ConnectError::Timeout(ref action)) if action == "logout"));
        assert!(frame.channel.registry().is_empty());

        frame.next_posted().await;
        assert!(!frame.reply("logout", json!({ "approved": true })));
    }

    #[tokio::test]
    async fn test_post_failure_deregisters() {
        let frame = FakeFrame::new();
        let channel = frame.channel.clone();
        drop(frame.outbox);

        let result = channel.active_user().await;
        assert!(matches!(result, Err(ConnectError::Transport(_))));
        assert!(channel.registry().is_empty());
    }

    #[tokio::test]
    async fn test_drip() {
        let mut frame = FakeFrame::new();
        let channel = frame.channel.clone();
        let pending = tokio::spawn(async move { channel.drip("0x1").await });

        let posted = frame.next_posted().await;
        assert_eq!(posted.action, FrameAction::Drip);
        assert_eq!(posted.data, Some(json!({ "address": "0x1" })));
        assert_eq!(posted.show_wallet, None);

        frame.reply("drip", json!({ "success": true }));
        assert_eq!(pending.await.unwrap().unwrap(), json!({ "success": true }));
    }
}
