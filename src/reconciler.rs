// src/reconciler.rs
//! Picks the one authoritative signer out of the hosted, extension and mobile
//! discovery sources.
//!
//! Sources report independently and in any order. The first non-null signer
//! wins and is latched until logout; "no connection" is only published once
//! every registered method has reported without one. A method that never
//! reports holds the negative outcome back indefinitely, so callers that need
//! a bound must apply their own timeout around [`SignerReconciler::outcome`].

use crate::config::ConnectConfig;
use crate::error::ConnectError;
use crate::frame::channel::HostedFrameChannel;
use crate::provider::NetworkProvider;
use crate::signer::extension::ExtensionConnector;
use crate::signer::hosted::HostedSigner;
use crate::signer::mobile::MobileTransport;
use crate::signer::{SignData, SignableTransaction, SignerKind, SignerType, TransactionResponse, WalletSigner};
use crate::storage::{Store, DISCONNECTED_KEY, PREFERRED_WALLET_KEY, SUI_NAMESPACE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Hosted,
    Extension,
    Mobile,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiscoveryMethod::Hosted => "hosted",
            DiscoveryMethod::Extension => "extension",
            DiscoveryMethod::Mobile => "mobile",
        };
        f.write_str(name)
    }
}

/// Per-session bookkeeping: which registered methods reported, and whether a
/// signer was already found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryState {
    signer_found: bool,
    reported: BTreeMap<DiscoveryMethod, bool>,
}

impl DiscoveryState {
    pub fn new(methods: impl IntoIterator<Item = DiscoveryMethod>) -> Self {
        Self {
            signer_found: false,
            reported: methods.into_iter().map(|m| (m, false)).collect(),
        }
    }

    pub fn signer_found(&self) -> bool {
        self.signer_found
    }

    pub fn is_registered(&self, method: DiscoveryMethod) -> bool {
        self.reported.contains_key(&method)
    }

    pub fn has_reported(&self, method: DiscoveryMethod) -> bool {
        self.reported.get(&method).copied().unwrap_or(false)
    }

    /// Vacuously true when no method is registered.
    pub fn all_reported(&self) -> bool {
        self.reported.values().all(|reported| *reported)
    }

    pub fn methods(&self) -> impl Iterator<Item = DiscoveryMethod> + '_ {
        self.reported.keys().copied()
    }

    fn mark(&mut self, method: DiscoveryMethod) {
        if let Some(reported) = self.reported.get_mut(&method) {
            *reported = true;
        }
    }

    fn reset(&mut self) {
        self.signer_found = false;
        for reported in self.reported.values_mut() {
            *reported = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Loading,
    NoConnection,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ProviderAndSigner {
    pub provider: NetworkProvider,
    pub signer: ActiveSigner,
}

/// What the reconciler currently publishes.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    /// No conclusion yet.
    Discovering,
    /// Every registered method reported and none had a signer.
    NoConnection,
    Connected(ProviderAndSigner),
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Discovering => ConnectionStatus::Loading,
            ConnectionState::NoConnection => ConnectionStatus::NoConnection,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionState::Discovering)
    }

    pub fn provider(&self) -> Option<&NetworkProvider> {
        match self {
            ConnectionState::Connected(connected) => Some(&connected.provider),
            _ => None,
        }
    }

    pub fn signer(&self) -> Option<&ActiveSigner> {
        match self {
            ConnectionState::Connected(connected) => Some(&connected.signer),
            _ => None,
        }
    }
}

/// What a single report did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// A signer was already latched (or the report came from a previous session).
    Ignored,
    /// Null report, other methods still outstanding.
    Waiting,
    Connected,
    NoConnection,
}

/// Where each discovery method gets its answer from.
#[derive(Clone, Default)]
pub struct DiscoverySources {
    pub hosted: Option<HostedFrameChannel>,
    pub extension: Option<ExtensionConnector>,
    pub mobile: Option<Arc<dyn MobileTransport>>,
}

pub struct SignerReconciler {
    config: ConnectConfig,
    store: Store,
    state: Mutex<DiscoveryState>,
    published: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
    session: Mutex<Option<Arc<AtomicBool>>>,
    sources: Mutex<Option<DiscoverySources>>,
    weak_self: Weak<SignerReconciler>,
}

impl SignerReconciler {
    pub fn new(config: ConnectConfig, store: Store) -> Arc<Self> {
        let state = DiscoveryState::new(config.methods.iter().copied());
        let (published, _) = watch::channel(ConnectionState::Discovering);
        Arc::new_cyclic(|weak_self| Self {
            config,
            store,
            state: Mutex::new(state),
            published,
            epoch: AtomicU64::new(0),
            session: Mutex::new(None),
            sources: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, DiscoveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.lock_state().clone()
    }

    pub fn current(&self) -> ConnectionState {
        self.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.published.subscribe()
    }

    /// Waits for the next terminal outcome. Never resolves while a method is
    /// still silent and nothing has been found.
    pub async fn outcome(&self) -> ConnectionState {
        let mut rx = self.subscribe();
        let result = rx.wait_for(ConnectionState::is_terminal).await.map(|state| state.clone());
        // the sender lives as long as self
        result.unwrap_or_else(|_| self.current())
    }

    /// Folds one source's answer into the session.
    pub fn report(&self, signer: Option<SignerType>, method: DiscoveryMethod) -> ReportOutcome {
        let mut state = self.lock_state();
        log::debug!(
            "Report from {} (signer: {}, found: {})",
            method,
            signer.is_some(),
            state.signer_found
        );
        if state.signer_found {
            return ReportOutcome::Ignored;
        }

        state.mark(method);

        match signer {
            Some(signer) => {
                state.signer_found = true;
                let session = Arc::new(AtomicBool::new(true));
                if let Some(previous) = self.replace_session(Some(Arc::clone(&session))) {
                    previous.store(false, Ordering::SeqCst);
                }
                log::info!("✅ {:?} signer {} selected via {}", signer.kind(), signer.get_name(), method);
                let connected = ProviderAndSigner {
                    provider: NetworkProvider::new(self.config.network.clone()),
                    signer: ActiveSigner {
                        signer,
                        session,
                        reconciler: self.weak_self.clone(),
                    },
                };
                self.published.send_replace(ConnectionState::Connected(connected));
                ReportOutcome::Connected
            }
            None if !state.all_reported() => ReportOutcome::Waiting,
            None => {
                log::info!("No signer available from any discovery method");
                self.published.send_replace(ConnectionState::NoConnection);
                ReportOutcome::NoConnection
            }
        }
    }

    fn report_in_epoch(&self, epoch: u64, signer: Option<SignerType>, method: DiscoveryMethod) -> ReportOutcome {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            log::debug!("Dropping {} report from a previous session", method);
            return ReportOutcome::Ignored;
        }
        self.report(signer, method)
    }

    fn replace_session(&self, session: Option<Arc<AtomicBool>>) -> Option<Arc<AtomicBool>> {
        let mut current = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, session)
    }

    /// Starts every source. Registered methods without a source, and the
    /// hosted method without an API key, report absence right away.
    pub fn discover(&self, sources: DiscoverySources) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        *self.sources.lock().unwrap_or_else(PoisonError::into_inner) = Some(sources.clone());

        let registered: Vec<DiscoveryMethod> = self.lock_state().methods().collect();
        if registered.is_empty() {
            log::info!("No discovery methods enabled");
            self.published.send_replace(ConnectionState::NoConnection);
            return;
        }

        match sources.hosted {
            Some(channel) if self.config.has_api_key() => {
                let weak = self.weak_self.clone();
                let chain = self.config.chain;
                let store = self.store.clone();
                tokio::spawn(async move {
                    let signer = match HostedSigner::discover(&channel, chain, &store).await {
                        Ok(signer) => signer,
                        Err(e) => {
                            log::warn!("Hosted wallet discovery failed: {}", e);
                            None
                        }
                    };
                    if let Some(this) = weak.upgrade() {
                        this.report_in_epoch(epoch, signer.map(SignerType::Hosted), DiscoveryMethod::Hosted);
                    }
                });
            }
            Some(_) => {
                log::info!("No API key configured, skipping hosted wallet");
                self.report(None, DiscoveryMethod::Hosted);
            }
            None if registered.contains(&DiscoveryMethod::Hosted) => {
                self.report(None, DiscoveryMethod::Hosted);
            }
            None => {}
        }

        match sources.extension {
            Some(connector) => {
                let weak = self.weak_self.clone();
                tokio::spawn(async move {
                    let signer = connector.auto_connect().await;
                    if let Some(this) = weak.upgrade() {
                        this.report_in_epoch(epoch, signer.map(SignerType::Extension), DiscoveryMethod::Extension);
                    }
                });
            }
            None if registered.contains(&DiscoveryMethod::Extension) => {
                self.report(None, DiscoveryMethod::Extension);
            }
            None => {}
        }

        match sources.mobile {
            Some(transport) => {
                log::debug!("Listening for mobile connection");
                let weak = self.weak_self.clone();
                transport.listen(Box::new(move |signer| {
                    if let Some(this) = weak.upgrade() {
                        this.report_in_epoch(epoch, signer.map(SignerType::Mobile), DiscoveryMethod::Mobile);
                    }
                }));
            }
            None if registered.contains(&DiscoveryMethod::Mobile) => {
                self.report(None, DiscoveryMethod::Mobile);
            }
            None => {}
        }
    }

    /// Explicit user pick of an extension wallet after discovery started.
    /// Ignored without touching the wallet while a signer is latched.
    pub async fn select_extension(&self, name: &str) -> Result<ReportOutcome, ConnectError> {
        if self.lock_state().signer_found() {
            log::info!("Signer already selected, ignoring selection of {}", name);
            return Ok(ReportOutcome::Ignored);
        }
        let connector = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|sources| sources.extension.clone())
            .ok_or_else(|| ConnectError::Config("no extension wallets registered".to_string()))?;

        if !connector.select(name).await {
            return Err(ConnectError::Wallet(format!("Could not connect {}", name)));
        }
        let signer = connector.signer().map(SignerType::Extension);
        Ok(self.report(signer, DiscoveryMethod::Extension))
    }

    /// Drops the current signer and reopens discovery. Previously published
    /// signers stop working, and the auto-reconnect markers are updated so the
    /// old wallet is not picked again on its own.
    pub fn logout(&self) {
        self.lock_state().reset();
        if let Some(previous) = self.replace_session(None) {
            previous.store(false, Ordering::SeqCst);
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(sources) = self.sources.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if let Some(extension) = &sources.extension {
                extension.reset();
            }
        }

        if let Err(e) = self.store.namespace(SUI_NAMESPACE).set(DISCONNECTED_KEY, true) {
            log::warn!("Failed to persist logout marker: {}", e);
        }
        if let Err(e) = self.store.remove(PREFERRED_WALLET_KEY) {
            log::warn!("Failed to clear preferred wallet: {}", e);
        }

        log::info!("👋 Logged out, discovery reset");
        self.published.send_replace(ConnectionState::Discovering);
    }
}

/// The published signer. Stops working once the reconciler logs out or picks
/// another signer; callers must then re-discover.
#[derive(Clone)]
pub struct ActiveSigner {
    signer: SignerType,
    session: Arc<AtomicBool>,
    reconciler: Weak<SignerReconciler>,
}

impl ActiveSigner {
    pub fn is_active(&self) -> bool {
        self.session.load(Ordering::SeqCst)
    }

    pub fn kind(&self) -> SignerKind {
        self.signer.kind()
    }

    pub fn inner(&self) -> &SignerType {
        &self.signer
    }

    fn ensure_active(&self) -> Result<&SignerType, ConnectError> {
        if self.is_active() {
            Ok(&self.signer)
        } else {
            Err(ConnectError::NotConnected)
        }
    }

    fn end_session(&self) {
        if let Some(reconciler) = self.reconciler.upgrade() {
            reconciler.logout();
        }
    }

    /// Like `disconnect`, but a hosted signer also ends the wallet-side session.
    pub async fn logout(&self) -> Result<(), ConnectError> {
        match self.ensure_active()? {
            SignerType::Hosted(hosted) => hosted.logout().await?,
            other => other.disconnect().await?,
        }
        self.end_session();
        Ok(())
    }
}

impl std::fmt::Debug for ActiveSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSigner")
            .field("signer", &self.signer)
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
impl WalletSigner for ActiveSigner {
    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        self.ensure_active()?.get_accounts().await
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        self.ensure_active()?.sign_and_execute_transaction(transaction, options).await
    }

    async fn sign(&self, message: SignData) -> Result<Value, ConnectError> {
        self.ensure_active()?.sign(message).await
    }

    async fn request_preapproval(&self, preapproval: Value) -> Result<bool, ConnectError> {
        self.ensure_active()?.request_preapproval(preapproval).await
    }

    /// Disconnects the wallet, then logs the reconciler out.
    async fn disconnect(&self) -> Result<(), ConnectError> {
        self.ensure_active()?.disconnect().await?;
        self.end_session();
        Ok(())
    }

    fn get_name(&self) -> String {
        self.signer.get_name()
    }
}
