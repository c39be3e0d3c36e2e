// src/test.rs
//! Fakes shared by the unit tests.
use crate::config::ConnectConfig;
use crate::error::ConnectError;
use crate::frame::channel::{FrameConfig, HostedFrameChannel};
use crate::frame::protocol::{HostMessage, HostedUser, InboundMessage, UserAccount};
use crate::frame::transport::ChannelTransport;
use crate::signer::extension::{WalletAdapter, WalletMethod};
use crate::signer::mobile::{MobileConnectionCallback, MobileSigner, MobileTransport};
use crate::signer::{SignData, SignableTransaction, TransactionResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const APP_ID: &str = "test-app";
pub const WALLET_ORIGIN: &str = "https://wallet.example";

pub fn test_config() -> ConnectConfig {
    ConnectConfig {
        app_id: APP_ID.to_string(),
        hosted_wallet_url: WALLET_ORIGIN.to_string(),
        ..ConnectConfig::default()
    }
}

/// Hosted frame stand-in: captures what the host posts and replies from the
/// trusted origin.
pub struct FakeFrame {
    pub channel: HostedFrameChannel,
    pub outbox: mpsc::UnboundedReceiver<HostMessage>,
}

impl FakeFrame {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config<F: FnOnce(&mut FrameConfig)>(configure: F) -> Self {
        let mut config = FrameConfig::from(&test_config());
        configure(&mut config);
        let (transport, outbox) = ChannelTransport::new();
        Self {
            channel: HostedFrameChannel::new(config, Arc::new(transport)),
            outbox,
        }
    }

    pub fn user(email: &str, addresses: &[&str]) -> HostedUser {
        HostedUser {
            email: Some(email.to_string()),
            accounts: addresses
                .iter()
                .map(|address| UserAccount {
                    chain: "sui".to_string(),
                    address: address.to_string(),
                })
                .collect(),
        }
    }

    pub async fn next_posted(&mut self) -> HostMessage {
        self.outbox.recv().await.expect("frame outbox closed")
    }

    pub fn reply(&self, action: &str, data: Value) -> bool {
        self.channel
            .deliver(InboundMessage::new(WALLET_ORIGIN, json!({ "action": action, "data": data })))
    }

    pub fn reply_user(&self, user: Option<HostedUser>) -> bool {
        self.reply("user", json!({ "appId": APP_ID, "user": user }))
    }
}

#[derive(Default)]
struct MockWalletState {
    accounts: Vec<String>,
    fail_connect: bool,
    stuck_connecting: bool,
    unsupported: HashSet<&'static str>,
    connect_calls: usize,
    disconnect_calls: usize,
    transactions: Vec<Value>,
}

/// Injected wallet double. Clones share state so tests can inspect calls
/// after handing the wallet to a connector.
#[derive(Clone)]
pub struct MockWallet {
    name: String,
    state: Arc<Mutex<MockWalletState>>,
}

impl MockWallet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockWalletState::default())),
        }
    }

    pub fn with_accounts(self, accounts: &[&str]) -> Self {
        self.state.lock().unwrap().accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn failing_connect(self) -> Self {
        self.state.lock().unwrap().fail_connect = true;
        self
    }

    /// Reports `connecting()` until the next disconnect.
    pub fn stuck_connecting(self) -> Self {
        self.state.lock().unwrap().stuck_connecting = true;
        self
    }

    pub fn without(self, method: WalletMethod) -> Self {
        self.state.lock().unwrap().unsupported.insert(method.name());
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn transactions(&self) -> Vec<Value> {
        self.state.lock().unwrap().transactions.clone()
    }
}

#[async_trait]
impl WalletAdapter for MockWallet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn connecting(&self) -> bool {
        self.state.lock().unwrap().stuck_connecting
    }

    fn supports(&self, method: WalletMethod) -> bool {
        !self.state.lock().unwrap().unsupported.contains(method.name())
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(ConnectError::Wallet("connection refused".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        state.stuck_connecting = false;
        Ok(())
    }

    async fn get_accounts(&self) -> Result<Vec<String>, ConnectError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn sign_and_execute_transaction(
        &self,
        transaction: SignableTransaction,
        _options: Option<Value>,
    ) -> Result<TransactionResponse, ConnectError> {
        self.state.lock().unwrap().transactions.push(transaction);
        Ok(json!({ "digest": "mock-digest" }))
    }

    async fn sign_message(&self, message: &SignData) -> Result<Value, ConnectError> {
        Ok(json!({ "signature": "mock-signature", "message": message.to_value() }))
    }

    async fn request_preapproval(&self, _preapproval: Value) -> Result<bool, ConnectError> {
        Ok(true)
    }
}

/// Mobile transport whose connection is triggered by the test.
#[derive(Clone, Default)]
pub struct ManualMobileTransport {
    callback: Arc<Mutex<Option<MobileConnectionCallback>>>,
}

impl ManualMobileTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the pending callback. False if nobody is listening.
    pub fn connect(&self, signer: Option<MobileSigner>) -> bool {
        let callback = self.callback.lock().unwrap().take();
        match callback {
            Some(callback) => {
                callback(signer);
                true
            }
            None => false,
        }
    }
}

impl MobileTransport for ManualMobileTransport {
    fn listen(&self, on_connection: MobileConnectionCallback) {
        *self.callback.lock().unwrap() = Some(on_connection);
    }
}
