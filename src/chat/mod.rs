//! Chat transport boundary.
//!
//! The transport itself (Telegram, Slack, iMessage bridge — whatever the
//! deployment wires up) lives outside this crate. It delivers
//! [`CommandEnvelope`]s over an mpsc channel and exposes an async
//! [`Replier`]. Receiving an envelope from the channel is the ack; the
//! dispatch loop then processes envelopes strictly one at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::commands::CommandService;

/// One inbound chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Transport-level user id.
    pub user_id: String,
    /// Channel to reply into.
    pub channel_id: String,
    /// Raw command text.
    pub text: String,
}

/// Async reply capability provided by the transport.
#[async_trait]
pub trait Replier: Send + Sync {
    /// Deliver a reply into a channel.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot deliver.
    async fn reply(&self, channel_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Replier that collects replies in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct BufferedReplier {
    replies: tokio::sync::Mutex<Vec<(String, String)>>,
}

impl BufferedReplier {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain collected `(channel_id, text)` pairs.
    pub async fn drain(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.replies.lock().await)
    }
}

#[async_trait]
impl Replier for BufferedReplier {
    async fn reply(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.replies
            .lock()
            .await
            .push((channel_id.to_owned(), text.to_owned()));
        Ok(())
    }
}

/// Run the chat dispatch loop until shutdown or channel close.
///
/// Envelopes are processed serially; the command service's own lock makes
/// concurrent dispatchers safe, but this loop never creates them.
pub async fn run_chat_loop(
    mut rx: mpsc::Receiver<CommandEnvelope>,
    commands: Arc<CommandService>,
    replier: Arc<dyn Replier>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("chat loop started");
    loop {
        let envelope = tokio::select! {
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => {
                    info!("chat channel closed");
                    break;
                }
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("chat loop shutting down");
                    break;
                }
                continue;
            }
        };

        let now = chrono::Local::now().naive_local();
        match commands.handle(&envelope.text, now).await {
            Ok(reply) => {
                if let Err(e) = replier.reply(&envelope.channel_id, &reply.text).await {
                    warn!(channel = %envelope.channel_id, error = %e, "reply failed");
                }
            }
            Err(e) => {
                error!(error = %e, "command handling failed");
                let _ = replier
                    .reply(
                        &envelope.channel_id,
                        "Something went wrong handling that command.",
                    )
                    .await;
            }
        }
    }
    info!("chat loop stopped");
}
