// src/signer/mod.rs
use crate::error::ConnectError;
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

pub mod extension;
pub mod hosted;
pub mod mobile;

use extension::ExtensionSigner;
use hosted::HostedSigner;
use mobile::MobileSigner;

/// Transactions are opaque to this crate; wallets build and serialize them.
pub type SignableTransaction = Value;
pub type TransactionResponse = Value;

/// Message handed to `sign`.
#[derive(Debug, Clone, PartialEq)]
pub enum SignData {
    Text(String),
    Bytes(Vec<u8>),
}

impl SignData {
    /// Wire form: text as-is, bytes as standard base64.
    pub fn to_value(&self) -> Value {
        match self {
            SignData::Text(text) => Value::String(text.clone()),
            SignData::Bytes(bytes) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

impl From<&str> for SignData {
    fn from(s: &str) -> Self {
        SignData::Text(s.to_string())
    }
}

impl From<Vec<u8>> for SignData {
    fn from(bytes: Vec<u8>) -> Self {
        SignData::Bytes(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    Extension,
    Hosted,
    Mobile,
}

/// Capability set every signer exposes, whatever backs it.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Addresses on the active chain.
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError>;

    /// First account, if any.
    async fn get_address(&self) -> Result<Option<String>, ConnectError> {
        Ok(self.get_accounts().await?.into_iter().next())
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError>;

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError>;

    async fn request_preapproval(&self, preapproval: Value) -> Result<bool, ConnectError>;

    async fn disconnect(&self) -> Result<(), ConnectError>;

    /// Get a display name for the signing method
    fn get_name(&self) -> String;
}

/// Enum to hold different signer types
#[derive(Clone)]
pub enum SignerType {
    Extension(ExtensionSigner),
    Hosted(HostedSigner),
    Mobile(MobileSigner),
}

impl SignerType {
    pub fn kind(&self) -> SignerKind {
        match self {
            SignerType::Extension(_) => SignerKind::Extension,
            SignerType::Hosted(_) => SignerKind::Hosted,
            SignerType::Mobile(_) => SignerKind::Mobile,
        }
    }

    pub fn icon(&self) -> Option<String> {
        match self {
            SignerType::Extension(e) => e.icon(),
            SignerType::Hosted(h) => Some(h.icon().to_string()),
            SignerType::Mobile(m) => m.icon(),
        }
    }

    pub fn as_hosted(&self) -> Option<&HostedSigner> {
        match self {
            SignerType::Hosted(h) => Some(h),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SignerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerType")
            .field("kind", &self.kind())
            .field("name", &self.get_name())
            .finish()
    }
}

#[async_trait]
impl WalletSigner for SignerType {
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        match self {
            SignerType::Extension(e) => e.get_accounts().await,
            SignerType::Hosted(h) => h.get_accounts().await,
            SignerType::Mobile(m) => m.get_accounts().await,
        }
    }

    async fn get_address(&self) -> Result<Option<String>, ConnectError> {
        match self {
            SignerType::Extension(e) => e.get_address().await,
            SignerType::Hosted(h) => h.get_address().await,
            SignerType::Mobile(m) => m.get_address().await,
        }
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        match self {
            SignerType::Extension(e) => e.sign_and_execute_transaction(transaction, options).await,
            SignerType::Hosted(h) => h.sign_and_execute_transaction(transaction, options).await,
            SignerType::Mobile(m) => m.sign_and_execute_transaction(transaction, options).await,
        }
    }

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError> {
        match self {
            SignerType::Extension(e) => e.sign(message).await,
            SignerType::Hosted(h) => h.sign(message).await,
            SignerType::Mobile(m) => m.sign(message).await,
        }
    }

    async fn request_preapproval(&self, preapproval: Value) -> Result<bool, ConnectError> {
        match self {
            SignerType::Extension(e) => e.request_preapproval(preapproval).await,
            SignerType::Hosted(h) => h.request_preapproval(preapproval).await,
            SignerType::Mobile(m) => m.request_preapproval(preapproval).await,
        }
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        match self {
            SignerType::Extension(e) => e.disconnect().await,
            SignerType::Hosted(h) => h.disconnect().await,
            SignerType::Mobile(m) => m.disconnect().await,
        }
    }

    fn get_name(&self) -> String {
        match self {
            SignerType::Extension(e) => e.get_name(),
            SignerType::Hosted(h) => h.get_name(),
            SignerType::Mobile(m) => m.get_name(),
        }
    }
}
