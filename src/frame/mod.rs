// src/frame/mod.rs
//! postMessage plumbing between the host page and the hosted wallet frame.
pub mod channel;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use channel::{FrameConfig, HostedFrameChannel, HostedInteraction, HostedInteractionResponse};
pub use protocol::{FrameAction, FrameReply, HostMessage, HostedUser, InboundMessage, UserAccount};
pub use registry::{CorrelationKey, ListenerRegistry, ListenerToken};
pub use transport::{ChannelTransport, FrameTransport};
