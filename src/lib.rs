// src/lib.rs
//! Wallet signer discovery and hosted-wallet messaging.
//!
//! A [`SignerReconciler`] runs the hosted frame, extension and mobile
//! discovery sources side by side and publishes exactly one outcome: the
//! first signer found, or "no connection" once every enabled source gave up.

pub mod config;
pub mod error;
pub mod frame;
pub mod provider;
pub mod reconciler;
pub mod signer;
pub mod storage;

#[cfg(test)]
mod test;

pub use config::{Chain, ConnectConfig};
pub use error::ConnectError;
pub use frame::{HostedFrameChannel, HostedInteraction, HostedInteractionResponse};
pub use provider::NetworkProvider;
pub use reconciler::{
    ActiveSigner, ConnectionState, ConnectionStatus, DiscoveryMethod, DiscoverySources, ProviderAndSigner,
    ReportOutcome, SignerReconciler,
};
pub use signer::{SignData, SignerKind, SignerType, WalletSigner};
pub use storage::{KeyValueStore, Store, StorageError};
