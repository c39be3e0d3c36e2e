// src/frame/transport.rs
use crate::error::ConnectError;
use crate::frame::protocol::HostMessage;
use tokio::sync::mpsc;

/// Posts host messages into the hosted wallet frame's content window.
///
/// Delivery is fire-and-forget: a frame that is not loaded or navigated away
/// is not detected here.
pub trait FrameTransport: Send + Sync {
    fn post_message(&self, message: &HostMessage) -> Result<(), ConnectError>;
}

/// Transport that forwards posted messages over an unbounded channel, for
/// hosts that pump the frame themselves (and for tests).
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<HostMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FrameTransport for ChannelTransport {
    fn post_message(&self, message: &HostMessage) -> Result<(), ConnectError> {
        self.sender
            .send(message.clone())
            .map_err(|_| ConnectError::Transport("hosted frame is gone".to_string()))
    }
}
