use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::{Result, ServerError};

/// A rendered notification, ready to hand to a `NotificationSink`.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

/// Delivery seam so `AlertDispatcher` never hardcodes a transport. Tests
/// substitute `RecordingSink`; production wires up `SmtpNotificationSink`.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, to: &[String], msg: &NotificationMessage) -> Result<()>;
}

pub struct SmtpNotificationSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotificationSink {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| ServerError::Config(format!("invalid SMTP_HOST {host}: {e}")))?
            .port(port)
            .timeout(Some(StdDuration::from_secs(10)));

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        let from_mailbox = from
            .parse::<Mailbox>()
            .map_err(|e| ServerError::Config(format!("invalid SMTP_FROM address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
        })
    }
}

#[async_trait]
impl NotificationSink for SmtpNotificationSink {
    async fn deliver(&self, to: &[String], msg: &NotificationMessage) -> Result<()> {
        for recipient in to {
            let to_mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| ServerError::Notification(format!("invalid recipient {recipient}: {e}")))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to_mailbox)
                .subject(&msg.subject)
                .body(msg.body.clone())
                .map_err(|e| ServerError::Notification(e.to_string()))?;

            self.transport
                .send(email)
                .await
                .map_err(|e| ServerError::Notification(e.to_string()))?;
        }
        Ok(())
    }
}

/// Test double that records every delivery attempt instead of sending mail.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: tokio::sync::Mutex<Vec<(Vec<String>, NotificationMessage)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, to: &[String], msg: &NotificationMessage) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((to.to_vec(), msg.clone()));
        Ok(())
    }
}

/// Work item placed on the dispatcher's mpsc channel.
pub struct NotificationJob {
    pub recipients: Vec<String>,
    pub message: NotificationMessage,
}

/// Dedicated consumer task so ingestion/sweeper latency never waits on
/// SMTP latency. `dispatch()` only has to succeed at the channel send.
pub struct NotificationWorker {
    sink: Arc<dyn NotificationSink>,
    receiver: mpsc::UnboundedReceiver<NotificationJob>,
}

impl NotificationWorker {
    pub fn new(sink: Arc<dyn NotificationSink>) -> (Self, mpsc::UnboundedSender<NotificationJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sink,
                receiver: rx,
            },
            tx,
        )
    }

    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            if job.recipients.is_empty() {
                warn!("no recipients configured, skipping notification send");
                continue;
            }
            if let Err(err) = self.sink.deliver(&job.recipients, &job.message).await {
                error!(error = %err, "notification delivery failed, not retried");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_delivery() {
        let sink = RecordingSink::new();
        let msg = NotificationMessage {
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        sink.deliver(&["a@example.com".to_string()], &msg)
            .await
            .unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec!["a@example.com".to_string()]);
    }

    #[tokio::test]
    async fn worker_skips_empty_recipient_list_without_calling_sink() {
        let sink = Arc::new(RecordingSink::new());
        let (worker, tx) = NotificationWorker::new(sink.clone());
        let handle = tokio::spawn(worker.run());

        tx.send(NotificationJob {
            recipients: vec![],
            message: NotificationMessage {
                subject: "s".to_string(),
                body: "b".to_string(),
            },
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(sink.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn worker_forwards_job_to_sink() {
        let sink = Arc::new(RecordingSink::new());
        let (worker, tx) = NotificationWorker::new(sink.clone());
        let handle = tokio::spawn(worker.run());

        tx.send(NotificationJob {
            recipients: vec!["a@example.com".to_string()],
            message: NotificationMessage {
                subject: "subject".to_string(),
                body: "body".to_string(),
            },
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(sink.sent.lock().await.len(), 1);
    }
}
