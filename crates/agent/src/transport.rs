//! Transport seam between the engine and whatever carries the user.
//!
//! The engine never talks to a console, an HTTP response, or a real-time
//! audio bridge directly; it goes through [`TransportAdapter`]. Live
//! transports also expose `disconnect` so the idle monitor can release
//! the channel.

use std::collections::VecDeque;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport receive failed: {0}")]
    Receive(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Delivery channel for one live session.
///
/// `receive_text` suspends until the user says something; `Ok(None)`
/// means the channel is closed and no further input will arrive.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Voice rendition of `text`. Text-only transports forward to
    /// `send_text`.
    async fn speak(&self, text: &str) -> Result<(), TransportError> {
        self.send_text(text).await
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport that swallows sends and never produces input.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl TransportAdapter for NoopTransport {
    async fn send_text(&self, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedChannel {
    incoming: VecDeque<String>,
    sent: Vec<String>,
    spoken: Vec<String>,
    disconnects: u32,
    fail_sends: bool,
}

/// Transport double that replays scripted user lines and records every
/// outbound delivery. Once the script runs dry, `receive_text` reports a
/// closed channel.
#[derive(Default)]
pub struct ScriptedTransport {
    channel: Mutex<ScriptedChannel>,
}

impl ScriptedTransport {
    pub fn with_incoming<T: Into<String>>(lines: Vec<T>) -> Self {
        Self {
            channel: Mutex::new(ScriptedChannel {
                incoming: lines.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
        }
    }

    /// Make every send fail, for exercising the degraded-delivery paths.
    pub fn failing_sends() -> Self {
        Self {
            channel: Mutex::new(ScriptedChannel { fail_sends: true, ..Default::default() }),
        }
    }

    pub async fn sent(&self) -> Vec<String> {
        self.channel.lock().await.sent.clone()
    }

    pub async fn spoken(&self) -> Vec<String> {
        self.channel.lock().await.spoken.clone()
    }

    pub async fn disconnects(&self) -> u32 {
        self.channel.lock().await.disconnects
    }
}

#[async_trait]
impl TransportAdapter for ScriptedTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        let mut channel = self.channel.lock().await;
        if channel.fail_sends {
            return Err(TransportError::Send("scripted send failure".to_string()));
        }
        channel.sent.push(text.to_string());
        Ok(())
    }

    async fn speak(&self, text: &str) -> Result<(), TransportError> {
        let mut channel = self.channel.lock().await;
        if channel.fail_sends {
            return Err(TransportError::Send("scripted send failure".to_string()));
        }
        channel.spoken.push(text.to_string());
        Ok(())
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError> {
        let mut channel = self.channel.lock().await;
        Ok(channel.incoming.pop_front())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut channel = self.channel.lock().await;
        channel.disconnects += 1;
        Ok(())
    }
}
