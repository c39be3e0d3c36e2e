// src/config/mod.rs
use crate::error::ConnectError;
use crate::reconciler::DiscoveryMethod;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NETWORK: &str = "https://fullnode.devnet.sui.io/";
pub const DEFAULT_WALLET_URL: &str = "https://ethoswallet.xyz";

/// Chain whose accounts a signer exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    Sui,
    Eth,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Sui => "sui",
            Chain::Eth => "eth",
        }
    }
}

impl std::str::FromStr for Chain {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sui" => Ok(Chain::Sui),
            "eth" => Ok(Chain::Eth),
            other => Err(ConnectError::Config(format!("unknown chain: {}", other))),
        }
    }
}

/// Configuration consumed by discovery and the hosted frame channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Echoed in the `activeUser` query and checked on the reply.
    pub app_id: String,
    /// Without it the hosted wallet is never queried.
    pub api_key: Option<String>,
    pub chain: Chain,
    /// Fullnode endpoint the published provider is bound to.
    pub network: String,
    /// Trust boundary: inbound frame messages must carry exactly this origin.
    pub hosted_wallet_url: String,
    /// Origin of the page embedding us, when known.
    pub host_origin: Option<String>,
    /// Discovery sources that must report before "no connection" is published.
    pub methods: Vec<DiscoveryMethod>,
    /// Carry a per-call `requestId` in correlated requests and require it on replies.
    pub correlate_requests: bool,
    pub request_timeout_ms: Option<u64>,
    pub storage_dir: Option<String>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            api_key: None,
            chain: Chain::Sui,
            network: DEFAULT_NETWORK.to_string(),
            hosted_wallet_url: DEFAULT_WALLET_URL.to_string(),
            host_origin: None,
            methods: vec![DiscoveryMethod::Hosted, DiscoveryMethod::Extension],
            correlate_requests: false,
            request_timeout_ms: None,
            storage_dir: None,
        }
    }
}

impl ConnectConfig {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_id: std::env::var("CONNECT_APP_ID").unwrap_or_default(),
            api_key: std::env::var("CONNECT_API_KEY").ok().filter(|k| !k.is_empty()),
            chain: std::env::var("CONNECT_CHAIN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            network: std::env::var("CONNECT_NETWORK").unwrap_or(defaults.network),
            hosted_wallet_url: std::env::var("CONNECT_WALLET_URL").unwrap_or(defaults.hosted_wallet_url),
            host_origin: std::env::var("CONNECT_HOST_ORIGIN").ok(),
            methods: std::env::var("CONNECT_METHODS")
                .ok()
                .map(|v| parse_methods(&v))
                .unwrap_or(defaults.methods),
            correlate_requests: std::env::var("CONNECT_CORRELATE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            request_timeout_ms: std::env::var("CONNECT_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            storage_dir: std::env::var("CONNECT_STORAGE_DIR").ok(),
        }
        .normalized()
    }

    /// Fills empty fields with defaults and strips a trailing `/` from the
    /// hosted wallet url so it compares equal to a message origin.
    pub fn normalized(mut self) -> Self {
        if self.network.trim().is_empty() {
            self.network = DEFAULT_NETWORK.to_string();
        }
        if self.hosted_wallet_url.trim().is_empty() {
            self.hosted_wallet_url = DEFAULT_WALLET_URL.to_string();
        }
        self.hosted_wallet_url = self.hosted_wallet_url.trim().trim_end_matches('/').to_string();
        let mut seen = Vec::with_capacity(self.methods.len());
        self.methods.retain(|m| {
            if seen.contains(m) {
                false
            } else {
                seen.push(*m);
                true
            }
        });
        self
    }

    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.app_id.trim().is_empty() {
            return Err(ConnectError::Config("app_id is required".to_string()));
        }
        if !(self.hosted_wallet_url.starts_with("https://") || self.hosted_wallet_url.starts_with("http://")) {
            return Err(ConnectError::Config(format!(
                "hosted_wallet_url must be an http(s) origin, got {}",
                self.hosted_wallet_url
            )));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().map(|k| !k.trim().is_empty()).unwrap_or(false)
    }

    /// True when the embedding page is the hosted wallet's own site.
    pub fn is_wallet_origin(&self) -> bool {
        self.host_origin.as_deref().map(|o| o.trim_end_matches('/')) == Some(self.hosted_wallet_url.as_str())
    }

    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        self.request_timeout_ms.map(std::time::Duration::from_millis)
    }
}

fn parse_methods(value: &str) -> Vec<DiscoveryMethod> {
    value
        .split(',')
        .filter_map(|m| match m.trim().to_lowercase().as_str() {
            "hosted" | "ethos" => Some(DiscoveryMethod::Hosted),
            "extension" => Some(DiscoveryMethod::Extension),
            "mobile" => Some(DiscoveryMethod::Mobile),
            "" => None,
            other => {
                log::warn!("Ignoring unknown discovery method {}", other);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_strips_trailing_slash() {
        let config = ConnectConfig {
            hosted_wallet_url: "https://wallet.example/".to_string(),
            network: String::new(),
            ..ConnectConfig::new("app")
        }
        .normalized();
        assert_eq!(config.hosted_wallet_url, "https://wallet.example");
        assert_eq!(config.network, DEFAULT_NETWORK);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(ConnectConfig::default().validate().is_err());
        let bad_url = ConnectConfig {
            hosted_wallet_url: "wallet.example".to_string(),
            ..ConnectConfig::new("app")
        };
        assert!(matches!(bad_url.validate(), Err(ConnectError::Config(_))));
    }

    #[test]
    fn test_parse_methods() {
        assert_eq!(
            parse_methods("hosted, mobile,,bogus"),
            vec![DiscoveryMethod::Hosted, DiscoveryMethod::Mobile]
        );
    }

    #[test]
    fn test_api_key_and_origin() {
        let mut config = ConnectConfig::new("app");
        assert!(!config.has_api_key());
        config.api_key = Some("  ".to_string());
        assert!(!config.has_api_key());
        config.api_key = Some("key".to_string());
        assert!(config.has_api_key());

        config.host_origin = Some("https://ethoswallet.xyz/".to_string());
        assert!(config.is_wallet_origin());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ConnectConfig =
            serde_json::from_str(r#"{"app_id":"app","chain":"eth","methods":["mobile"]}"#).unwrap();
        assert_eq!(config.chain, Chain::Eth);
        assert_eq!(config.methods, vec![DiscoveryMethod::Mobile]);
        assert_eq!(config.network, DEFAULT_NETWORK);
    }
}
