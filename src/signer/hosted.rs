// src/signer/hosted.rs
use crate::config::Chain;
use crate::error::ConnectError;
use crate::frame::channel::{HostedFrameChannel, HostedInteraction};
use crate::frame::protocol::{FrameAction, HostedUser, UserAccount};
use crate::signer::{SignData, SignableTransaction, SignerKind, TransactionResponse, WalletSigner};
use crate::storage::{Store, ACCESS_TOKEN_KEY, AUTH_NAMESPACE};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const HOSTED_WALLET_NAME: &str = "Ethos";

pub const HOSTED_WALLET_ICON: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iMzIiIGhlaWdodD0iMzIiIHZpZXdCb3g9IjAgMCAzMiAzMiIgZmlsbD0ibm9uZSIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iMzIiIGhlaWdodD0iMzIiIHJ4PSI4IiBmaWxsPSIjNkQyOEQ5Ii8+PC9zdmc+";

const TRANSACTION_REJECTED: &str = "User rejected transaction.";
const SIGNING_REJECTED: &str = "User rejected signing.";

/// Signer backed by the custodial wallet running in the hosted frame.
#[derive(Clone)]
pub struct HostedSigner {
    channel: HostedFrameChannel,
    user: Arc<HostedUser>,
    chain: Chain,
    auth: Store,
}

impl HostedSigner {
    /// `None` when nobody is signed in to the hosted wallet.
    pub fn from_user(user: Option<HostedUser>, channel: HostedFrameChannel, chain: Chain, store: &Store) -> Option<Self> {
        user.map(|user| Self {
            channel,
            user: Arc::new(user),
            chain,
            auth: store.namespace(AUTH_NAMESPACE),
        })
    }

    /// Queries the frame for the active user and builds the signer from it.
    pub async fn discover(channel: &HostedFrameChannel, chain: Chain, store: &Store) -> Result<Option<Self>, ConnectError> {
        let user = channel.active_user().await?;
        log::debug!("Hosted wallet user present: {}", user.is_some());
        Ok(Self::from_user(user, channel.clone(), chain, store))
    }

    pub fn kind(&self) -> SignerKind {
        SignerKind::Hosted
    }

    pub fn display_name(&self) -> &'static str {
        HOSTED_WALLET_NAME
    }

    pub fn icon(&self) -> &'static str {
        HOSTED_WALLET_ICON
    }

    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }

    /// The user's accounts on the active chain.
    pub fn accounts(&self) -> Vec<UserAccount> {
        self.user
            .accounts
            .iter()
            .filter(|account| account.chain == self.chain.as_str() && !account.address.is_empty())
            .cloned()
            .collect()
    }

    /// Logs out of the hosted session and clears the stored access token.
    /// `from_wallet` tells the frame to end the wallet session itself, not
    /// just this app's connection.
    pub async fn disconnect_with(&self, from_wallet: bool) -> Result<(), ConnectError> {
        self.auth.remove(ACCESS_TOKEN_KEY)?;
        let interaction = HostedInteraction::new(FrameAction::Logout, json!({ "fromWallet": from_wallet }));
        self.channel.request(interaction).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ConnectError> {
        self.disconnect_with(true).await
    }
}

#[async_trait]
impl WalletSigner for HostedSigner {
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        Ok(self.accounts().into_iter().map(|account| account.address).collect())
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        _options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        let interaction = HostedInteraction::new(FrameAction::Transaction, json!({ "details": transaction })).show_wallet();
        self.channel.request(interaction).await?.into_result(TRANSACTION_REJECTED)
    }

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError> {
        let interaction = HostedInteraction::new(FrameAction::Sign, json!({ "signData": message.to_value() })).show_wallet();
        self.channel.request(interaction).await?.into_result(SIGNING_REJECTED)
    }

    /// The hosted wallet approves inside its own UI, so preapproval always succeeds.
    async fn request_preapproval(&self, _preapproval: Value) -> Result<bool, ConnectError> {
        Ok(true)
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        self.disconnect_with(false).await
    }

    fn get_name(&self) -> String {
        HOSTED_WALLET_NAME.to_string()
    }
}
