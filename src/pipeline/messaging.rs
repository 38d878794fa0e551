//! Outbound digest delivery.

use super::prompt;
use crate::clients::{ChannelRef, MessageSender};
use crate::decision::MessagingPolicy;
use crate::model::Category;
use crate::server::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

impl SendReport {
    pub fn any_sent(&self) -> bool {
        self.sent > 0
    }
}

/// Sends one message per category through the messaging agent.
#[derive(Clone)]
pub struct DigestSender {
    sender: Arc<dyn MessageSender>,
    channel: ChannelRef,
    policy: MessagingPolicy,
    send_delay: Duration,
}

impl DigestSender {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        channel: ChannelRef,
        policy: MessagingPolicy,
        send_delay: Duration,
    ) -> Self {
        Self {
            sender,
            channel,
            policy,
            send_delay,
        }
    }

    pub fn policy(&self) -> &MessagingPolicy {
        &self.policy
    }

    /// Sends `items` in order, pausing between sends.
    ///
    /// A failed send is logged and does not stop the remaining ones.
    pub async fn send_digest(&self, recipient: &str, items: &[(Category, String)]) -> SendReport {
        let mut report = SendReport::default();

        for (index, (category, content)) in items.iter().enumerate() {
            if index > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            let text = prompt::digest_message(recipient, *category, content);
            match self.sender.send(&self.channel, &text).await {
                Ok(()) => {
                    report.sent += 1;
                    metrics::record_message_send("success");
                    info!("Sent {} digest to {}", category, recipient);
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::record_message_send("failed");
                    warn!("Failed to send {} digest to {}: {}", category, recipient, e);
                }
            }
        }

        report
    }
}
