// src/signer/mobile.rs
use crate::error::ConnectError;
use crate::signer::extension::{
    adapter_disconnect, adapter_request_preapproval, adapter_sign, adapter_sign_and_execute, WalletAdapter,
};
use crate::signer::{SignData, SignableTransaction, TransactionResponse, WalletSigner};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Invoked at most once per listening session, with the signer delivered by
/// the companion app or `None` if the session ended without one.
pub type MobileConnectionCallback = Box<dyn FnOnce(Option<MobileSigner>) + Send>;

/// Deep-link transport to the mobile companion app.
pub trait MobileTransport: Send + Sync {
    fn listen(&self, on_connection: MobileConnectionCallback);
}

/// Signer handed over by the mobile companion app.
#[derive(Clone)]
pub struct MobileSigner {
    wallet: Arc<dyn WalletAdapter>,
}

impl MobileSigner {
    pub fn new(wallet: Arc<dyn WalletAdapter>) -> Self {
        Self { wallet }
    }

    pub fn icon(&self) -> Option<String> {
        self.wallet.icon()
    }
}

#[async_trait]
impl WalletSigner for MobileSigner {
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        self.wallet.get_accounts().await
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        adapter_sign_and_execute(self.wallet.as_ref(), transaction, options).await
    }

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError> {
        adapter_sign(self.wallet.as_ref(), message).await
    }

    async fn request_preapproval(&self, preapproval: Value) -> Result<bool, ConnectError> {
        adapter_request_preapproval(self.wallet.as_ref(), preapproval).await
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        adapter_disconnect(self.wallet.as_ref()).await
    }

    fn get_name(&self) -> String {
        self.wallet.name()
    }
}
