// src/frame/protocol.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action names understood by the hosted wallet frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameAction {
    /// Host query for the signed-in user.
    ActiveUser,
    /// Frame reply to [`FrameAction::ActiveUser`].
    User,
    Sign,
    Transaction,
    Logout,
    Drip,
}

impl FrameAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameAction::ActiveUser => "activeUser",
            FrameAction::User => "user",
            FrameAction::Sign => "sign",
            FrameAction::Transaction => "transaction",
            FrameAction::Logout => "logout",
            FrameAction::Drip => "drip",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "activeUser" => Some(FrameAction::ActiveUser),
            "user" => Some(FrameAction::User),
            "sign" => Some(FrameAction::Sign),
            "transaction" => Some(FrameAction::Transaction),
            "logout" => Some(FrameAction::Logout),
            "drip" => Some(FrameAction::Drip),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message posted from the host page into the hosted wallet frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMessage {
    pub action: FrameAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_wallet: Option<bool>,
}

impl HostMessage {
    /// Bare query, no payload.
    pub fn query(action: FrameAction) -> Self {
        Self {
            action,
            data: None,
            show_wallet: None,
        }
    }
}

/// A cross-document message as received by the host window.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Missing fields decode as empty so one odd entry cannot spoil the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserAccount {
    pub chain: String,
    pub address: String,
}

/// The signed-in hosted wallet user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostedUser {
    pub email: Option<String>,
    pub accounts: Vec<UserAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UserReply {
    pub app_id: Option<String>,
    pub user: Option<HostedUser>,
}

/// Reply payload shared by `sign`, `transaction` and `logout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ApprovalReply {
    pub approved: bool,
    pub response: Value,
    pub request_id: Option<String>,
}

impl ApprovalReply {
    /// Embedded `response.error`, or `fallback` when the frame gave none.
    pub fn rejection_reason(&self, fallback: &str) -> String {
        self.response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Message posted by the hosted wallet frame back to the host, keyed by action.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameReply {
    User(UserReply),
    Sign(ApprovalReply),
    Transaction(ApprovalReply),
    Logout(ApprovalReply),
    Drip(Value),
}

#[derive(Deserialize)]
struct RawReply {
    action: String,
    #[serde(default)]
    data: Value,
}

impl FrameReply {
    /// Decodes `{action, data}`. Unknown actions and payloads that do not fit
    /// the action's shape yield `None`.
    pub fn decode(value: &Value) -> Option<FrameReply> {
        let raw = RawReply::deserialize(value).ok()?;
        let action = FrameAction::parse(&raw.action)?;
        let data = match raw.data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let reply = match action {
            FrameAction::User => FrameReply::User(serde_json::from_value(data).ok()?),
            FrameAction::Sign => FrameReply::Sign(serde_json::from_value(data).ok()?),
            FrameAction::Transaction => FrameReply::Transaction(serde_json::from_value(data).ok()?),
            FrameAction::Logout => FrameReply::Logout(serde_json::from_value(data).ok()?),
            FrameAction::Drip => FrameReply::Drip(data),
            // the frame never sends the query action back
            FrameAction::ActiveUser => return None,
        };
        Some(reply)
    }

    pub fn action(&self) -> FrameAction {
        match self {
            FrameReply::User(_) => FrameAction::User,
            FrameReply::Sign(_) => FrameAction::Sign,
            FrameReply::Transaction(_) => FrameAction::Transaction,
            FrameReply::Logout(_) => FrameAction::Logout,
            FrameReply::Drip(_) => FrameAction::Drip,
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        match self {
            FrameReply::User(reply) => reply.app_id.as_deref(),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            FrameReply::Sign(reply) | FrameReply::Transaction(reply) | FrameReply::Logout(reply) => {
                reply.request_id.as_deref()
            }
            FrameReply::Drip(data) => data.get("requestId").and_then(Value::as_str),
            FrameReply::User(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_message_envelope() {
        let query = serde_json::to_value(HostMessage::query(FrameAction::ActiveUser)).unwrap();
        assert_eq!(query, json!({ "action": "activeUser" }));

        let sign = HostMessage {
            action: FrameAction::Sign,
            data: Some(json!({ "signData": "abc" })),
            show_wallet: Some(true),
        };
        assert_eq!(
            serde_json::to_value(sign).unwrap(),
            json!({ "action": "sign", "data": { "signData": "abc" }, "showWallet": true })
        );
    }

    #[test]
    fn test_decode_user_reply() {
        let reply = FrameReply::decode(&json!({
            "action": "user",
            "data": {
                "appId": "app",
                "user": {
                    "email": "a@b.c",
                    "accounts": [{ "chain": "sui", "address": "0x1" }],
                    "extra": 1
                }
            }
        }))
        .unwrap();
        assert_eq!(reply.action(), FrameAction::User);
        assert_eq!(reply.app_id(), Some("app"));
        match reply {
            FrameReply::User(UserReply { user: Some(user), .. }) => {
                assert_eq!(user.email.as_deref(), Some("a@b.c"));
                assert_eq!(user.accounts[0].address, "0x1");
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejection_reason() {
        let reply = FrameReply::decode(&json!({
            "action": "transaction",
            "data": { "approved": false, "response": { "error": "User rejected transaction." } }
        }))
        .unwrap();
        match reply {
            FrameReply::Transaction(approval) => {
                assert!(!approval.approved);
                assert_eq!(approval.rejection_reason("fallback"), "User rejected transaction.");
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let bare = FrameReply::decode(&json!({ "action": "sign", "data": { "approved": false } })).unwrap();
        match bare {
            FrameReply::Sign(approval) => {
                assert_eq!(approval.rejection_reason("User rejected signing."), "User rejected signing.")
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_decode_drops_malformed() {
        assert!(FrameReply::decode(&json!({ "action": "mint", "data": {} })).is_none());
        assert!(FrameReply::decode(&json!("not an object")).is_none());
        assert!(FrameReply::decode(&json!({ "data": {} })).is_none());
        assert!(FrameReply::decode(&json!({ "action": "sign", "data": { "approved": "yes" } })).is_none());
        assert!(FrameReply::decode(&json!({ "action": "activeUser" })).is_none());

        let logout = FrameReply::decode(&json!({ "action": "logout" })).unwrap();
        assert_eq!(logout.action(), FrameAction::Logout);
    }

    #[test]
    fn test_request_id() {
        let reply = FrameReply::decode(&json!({
            "action": "sign",
            "data": { "approved": true, "response": "0xsig", "requestId": "abc" }
        }))
        .unwrap();
        assert_eq!(reply.request_id(), Some("abc"));

        let drip = FrameReply::decode(&json!({ "action": "drip", "data": { "requestId": "d1" } })).unwrap();
        assert_eq!(drip.request_id(), Some("d1"));
    }

    #[test]
    fn test_decode_user_reply_with_partial_accounts() {
        let reply = FrameReply::decode(&json!({
            "action": "user",
            "data": {
                "appId": "app",
                "user": { "accounts": [{ "address": "0x1", "chain": "sui" }, { "address": "0x2" }, { "chain": "sui" }] }
            }
        }))
        .unwrap();
        let FrameReply::User(user_reply) = reply else {
            panic!("expected user reply");
        };
        let accounts = user_reply.user.unwrap().accounts;
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts[1].chain, "");
        assert_eq!(accounts[2].address, "");
    }
}
