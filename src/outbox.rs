use crate::gateway::MessagingGateway;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

/// A reply delivered as its own outbound message rather than in the webhook
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
}

/// Bounded queue drained by one background sender.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbox {
    pub fn spawn(gateway: Arc<dyn MessagingGateway>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let delivered = gateway.send_message(&message.to, &message.text).await;
                debug!(target = "listing.outbox", to = %message.to, delivered, "outbound message processed");
            }
        });
        (Self { tx }, handle)
    }

    /// Waits for queue space; a closed queue drops the message with a warning.
    pub async fn enqueue(&self, to: &str, text: &str) {
        let message = OutboundMessage {
            to: to.to_string(),
            text: text.to_string(),
        };
        if self.tx.send(message).await.is_err() {
            warn!(target = "listing.outbox", to = %to, "outbox closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    #[tokio::test]
    async fn messages_are_sent_in_order() {
        let gateway = Arc::new(FakeGateway::default());
        let (outbox, handle) = Outbox::spawn(gateway.clone(), 4);

        outbox.enqueue("whatsapp:+1", "bir").await;
        outbox.enqueue("whatsapp:+1", "iki").await;
        drop(outbox);
        handle.await.expect("worker");

        assert_eq!(
            gateway.sent(),
            vec![
                ("whatsapp:+1".to_string(), "bir".to_string()),
                ("whatsapp:+1".to_string(), "iki".to_string()),
            ]
        );
    }
}
