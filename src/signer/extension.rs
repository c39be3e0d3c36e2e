// src/signer/extension.rs
use crate::config::ConnectConfig;
use crate::error::ConnectError;
use crate::signer::{SignData, SignableTransaction, TransactionResponse, WalletSigner};
use crate::storage::{Store, DISCONNECTED_KEY, PREFERRED_WALLET_KEY, SUI_NAMESPACE};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Wallet picked when nothing was stored and the companion app is injected.
pub const MOBILE_WALLET_NAME: &str = "Ethos Mobile";
/// Wallet picked when nothing was stored and we run on the hosted wallet's own site.
pub const OWN_EXTENSION_WALLET_NAME: &str = "Ethos Wallet";

/// Optional wallet methods, checked before calling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMethod {
    Disconnect,
    SignAndExecuteTransaction,
    SignMessage,
    RequestPreapproval,
}

impl WalletMethod {
    pub fn name(&self) -> &'static str {
        match self {
            WalletMethod::Disconnect => "disconnect",
            WalletMethod::SignAndExecuteTransaction => "signAndExecuteTransaction",
            WalletMethod::SignMessage => "signMessage",
            WalletMethod::RequestPreapproval => "requestPreapproval",
        }
    }
}

/// A locally injected wallet (browser extension or companion app bridge).
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    fn name(&self) -> String;

    fn id(&self) -> String {
        self.name()
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn ready(&self) -> bool {
        true
    }

    /// A connect attempt is already in flight inside the wallet.
    fn connecting(&self) -> bool {
        false
    }

    fn supports(&self, method: WalletMethod) -> bool;

    async fn connect(&self) -> Result<(), ConnectError>;

    async fn disconnect(&self) -> Result<(), ConnectError>;

    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError>;

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError>;

    async fn sign_message(&self, _message: &SignData) -> Result<Value, ConnectError> {
        Err(ConnectError::Unsupported(WalletMethod::SignMessage.name()))
    }

    async fn request_preapproval(&self, _preapproval: Value) -> Result<bool, ConnectError> {
        Err(ConnectError::Unsupported(WalletMethod::RequestPreapproval.name()))
    }
}

fn require(wallet: &dyn WalletAdapter, method: WalletMethod) -> Result<(), ConnectError> {
    if wallet.supports(method) {
        Ok(())
    } else {
        Err(ConnectError::Unsupported(method.name()))
    }
}

pub(crate) async fn adapter_sign_and_execute(
    wallet: &dyn WalletAdapter,
    transaction: SignableTransaction,
    options: Option<Value>,
) -> Result<TransactionResponse, ConnectError> {
    require(wallet, WalletMethod::SignAndExecuteTransaction)?;
    wallet.sign_and_execute_transaction(transaction, options).await
}

pub(crate) async fn adapter_sign(wallet: &dyn WalletAdapter, message: SignData) -> Result<Value, ConnectError> {
    require(wallet, WalletMethod::SignMessage)?;
    wallet.sign_message(&message).await
}

/// Wallets without preapproval support simply decline.
pub(crate) async fn adapter_request_preapproval(
    wallet: &dyn WalletAdapter,
    preapproval: Value,
) -> Result<bool, ConnectError> {
    if !wallet.supports(WalletMethod::RequestPreapproval) {
        log::debug!("{} does not support preapproval", wallet.name());
        return Ok(false);
    }
    wallet.request_preapproval(preapproval).await
}

pub(crate) async fn adapter_disconnect(wallet: &dyn WalletAdapter) -> Result<(), ConnectError> {
    require(wallet, WalletMethod::Disconnect)?;
    wallet.disconnect().await
}

/// Listing entry for wallet pickers.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletInfo {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub ready: bool,
}

#[derive(Default)]
struct ConnectorState {
    wallet: Option<Arc<dyn WalletAdapter>>,
    connected: bool,
    connecting: bool,
    no_connection: bool,
}

struct ConnectorInner {
    wallets: Vec<Arc<dyn WalletAdapter>>,
    store: Store,
    on_wallet_origin: bool,
    state: Mutex<ConnectorState>,
}

/// Tracks the selected extension wallet: explicit selection, session-start
/// auto-reconnect and disconnect.
#[derive(Clone)]
pub struct ExtensionConnector {
    inner: Arc<ConnectorInner>,
}

impl ExtensionConnector {
    pub fn new(wallets: Vec<Arc<dyn WalletAdapter>>, store: Store, config: &ConnectConfig) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                wallets,
                store,
                on_wallet_origin: config.is_wallet_origin(),
                state: Mutex::new(ConnectorState::default()),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wallets(&self) -> Vec<WalletInfo> {
        self.inner
            .wallets
            .iter()
            .map(|w| WalletInfo {
                id: w.id(),
                name: w.name(),
                icon: w.icon(),
                ready: w.ready(),
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state().connecting
    }

    /// Set once discovery concluded that no extension wallet will connect.
    pub fn no_connection(&self) -> bool {
        self.state().no_connection
    }

    fn find(&self, name: &str) -> Option<Arc<dyn WalletAdapter>> {
        self.inner.wallets.iter().find(|w| w.name() == name).cloned()
    }

    /// Selects and connects the wallet called `name`. Returns whether it connected.
    pub async fn select(&self, name: &str) -> bool {
        let Some(wallet) = self.find(name) else {
            log::warn!("No extension wallet named {}", name);
            return false;
        };
        let already_connecting = {
            let mut state = self.state();
            state.wallet = Some(Arc::clone(&wallet));
            state.connected = false;
            state.connecting
        };

        // a wallet stuck mid-connect is reset before we try again
        if !already_connecting && wallet.connecting() {
            if let Err(e) = wallet.disconnect().await {
                log::debug!("Resetting {} failed: {}", name, e);
            }
        }
        if wallet.connecting() {
            return false;
        }

        self.state().connecting = true;
        let result = wallet.connect().await;
        let connected = result.is_ok();
        {
            let mut state = self.state();
            state.connecting = false;
            state.connected = connected;
            if connected {
                state.no_connection = false;
            }
        }

        match result {
            Ok(()) => {
                log::info!("🔗 Connected extension wallet {}", name);
                if let Err(e) = self.inner.store.set(PREFERRED_WALLET_KEY, name) {
                    log::warn!("Failed to remember preferred wallet: {}", e);
                }
                if let Err(e) = self.inner.store.namespace(SUI_NAMESPACE).remove(DISCONNECTED_KEY) {
                    log::warn!("Failed to clear logout marker: {}", e);
                }
            }
            Err(e) => log::warn!("Connecting {} failed: {}", name, e),
        }
        connected
    }

    /// Session-start discovery. Reconnects the remembered wallet (or a known
    /// fallback) and yields its signer, or `None` when there is nothing to
    /// connect to.
    pub async fn auto_connect(&self) -> Option<ExtensionSigner> {
        if self.inner.wallets.is_empty() {
            log::info!("No extension wallets installed");
            self.state().no_connection = true;
            return None;
        }

        {
            let state = self.state();
            if state.connected {
                if let Some(wallet) = &state.wallet {
                    return Some(ExtensionSigner::new(self.clone(), Arc::clone(wallet)));
                }
            }
        }

        if self.inner.store.namespace(SUI_NAMESPACE).flag(DISCONNECTED_KEY) {
            log::info!("Skipping extension auto-connect after explicit logout");
            self.state().no_connection = true;
            return None;
        }

        let preferred = match self.inner.store.get::<String>(PREFERRED_WALLET_KEY) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Unreadable preferred wallet: {}", e);
                None
            }
        };
        let preferred = preferred.or_else(|| self.fallback_wallet_name());

        let Some(name) = preferred else {
            log::info!("No preferred extension wallet");
            self.state().no_connection = true;
            return None;
        };

        log::info!("Auto-connecting extension wallet {}", name);
        if self.select(&name).await {
            return self.signer();
        }

        self.state().no_connection = true;
        if let Err(e) = self.inner.store.remove(PREFERRED_WALLET_KEY) {
            log::warn!("Failed to forget preferred wallet: {}", e);
        }
        None
    }

    fn fallback_wallet_name(&self) -> Option<String> {
        if let Some(mobile) = self.find(MOBILE_WALLET_NAME) {
            return Some(mobile.name());
        }
        if self.inner.on_wallet_origin {
            return self.find(OWN_EXTENSION_WALLET_NAME).map(|w| w.name());
        }
        None
    }

    /// Signer for the connected wallet, if one is connected.
    pub fn signer(&self) -> Option<ExtensionSigner> {
        let state = self.state();
        match &state.wallet {
            Some(wallet) if state.connected => Some(ExtensionSigner::new(self.clone(), Arc::clone(wallet))),
            _ => None,
        }
    }

    /// True while `wallet` is the connected selection.
    fn is_current(&self, wallet: &Arc<dyn WalletAdapter>) -> bool {
        let state = self.state();
        state.connected
            && state
                .wallet
                .as_ref()
                .is_some_and(|current| Arc::as_ptr(current) as *const () == Arc::as_ptr(wallet) as *const ())
    }

    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        let wallet = {
            let mut state = self.state();
            state.connected = false;
            state.wallet.clone()
        };
        if let Err(e) = self.inner.store.remove(PREFERRED_WALLET_KEY) {
            log::warn!("Failed to forget preferred wallet: {}", e);
        }

        let wallet = wallet.ok_or(ConnectError::NotConnected)?;
        adapter_disconnect(wallet.as_ref()).await?;
        self.state().wallet = None;
        log::info!("Disconnected extension wallet {}", wallet.name());
        Ok(())
    }

    /// Forgets the selected wallet without calling into it, so discovery can run again.
    pub fn reset(&self) {
        let mut state = self.state();
        state.wallet = None;
        state.connected = false;
        state.connecting = false;
        state.no_connection = false;
    }
}

/// Signer bound to the wallet that was connected when it was handed out.
/// Once the connector disconnects or switches to another wallet it answers
/// `NotConnected`.
#[derive(Clone)]
pub struct ExtensionSigner {
    connector: ExtensionConnector,
    wallet: Arc<dyn WalletAdapter>,
}

impl ExtensionSigner {
    fn new(connector: ExtensionConnector, wallet: Arc<dyn WalletAdapter>) -> Self {
        Self { connector, wallet }
    }

    pub fn icon(&self) -> Option<String> {
        self.wallet.icon()
    }

    fn wallet(&self) -> Result<&dyn WalletAdapter, ConnectError> {
        if self.connector.is_current(&self.wallet) {
            Ok(self.wallet.as_ref())
        } else {
            Err(ConnectError::NotConnected)
        }
    }
}

#[async_trait]
impl WalletSigner for ExtensionSigner {
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        self.wallet()?.get_accounts().await
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        adapter_sign_and_execute(self.wallet()?, transaction, options).await
    }

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError> {
        adapter_sign(self.wallet()?, message).await
    }

    async fn request_preapproval(&self, preapproval: Value) -> Result<bool, ConnectError> {
        adapter_request_preapproval(self.wallet()?, preapproval).await
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        self.wallet()?;
        self.connector.disconnect().await
    }

    fn get_name(&self) -> String {
        self.wallet.name()
    }
}
