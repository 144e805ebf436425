//! Notifier - Alert Delivery
//!
//! ## Responsibilities
//!
//! - Alert delivery boundary: a count and its snapshots in, one message out
//! - SMTP email adapter with inline JPEG attachments

use crate::error::{Error, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// One attachment handed to the notifier: file name plus JPEG bytes
#[derive(Debug, Clone)]
pub struct SnapshotAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Boundary to alert delivery.
///
/// One call delivers one alert message for one firing.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert for `count` tracked intruders
    async fn send(&self, count: usize, attachments: &[SnapshotAttachment]) -> Result<()>;

    /// Close the underlying session (graceful drain)
    async fn close(&self) -> Result<()>;
}

/// SMTP email notifier
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Create a notifier over a STARTTLS relay.
    ///
    /// The sender address doubles as the SMTP login.
    pub fn new(smtp_host: &str, from_email: &str, to_email: &str, password: &str) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| Error::Config(format!("SMTP relay setup failed: {}", e)))?
            .credentials(Credentials::new(
                from_email.to_string(),
                password.to_string(),
            ))
            .build();

        let from: Mailbox = from_email
            .parse()
            .map_err(|e| Error::Config(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = to_email
            .parse()
            .map_err(|e| Error::Config(format!("Invalid to address: {}", e)))?;

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    /// Build the alert message for one firing
    fn build_message(&self, count: usize, attachments: &[SnapshotAttachment]) -> Result<Message> {
        let body = format!("<p>ALERT - {} intruder(s) has been detected !!</p>", count);

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::html(body));

        let jpeg = ContentType::parse("image/jpeg")
            .map_err(|e| Error::Notify(format!("content type: {}", e)))?;
        for attachment in attachments {
            multipart = multipart.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), jpeg.clone()),
            );
        }

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject("Intrusion Security Alert")
            .multipart(multipart)
            .map_err(|e| Error::Notify(format!("message build failed: {}", e)))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, count: usize, attachments: &[SnapshotAttachment]) -> Result<()> {
        let message = self.build_message(count, attachments)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        tracing::info!(
            count,
            attachments = attachments.len(),
            to = %self.to,
            "Alert email sent"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Pooled SMTP connections QUIT when the transport drops; nothing
        // further to tear down here
        tracing::debug!("SMTP session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_notifier() -> EmailNotifier {
        EmailNotifier::new(
            "localhost",
            "watcher@example.com",
            "guard@example.com",
            "secret",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_message_headers() {
        let notifier = test_notifier();
        let message = notifier.build_message(2, &[]).unwrap();

        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("Subject: Intrusion Security Alert"));
        assert!(formatted.contains("From: watcher@example.com"));
        assert!(formatted.contains("To: guard@example.com"));
        assert!(formatted.contains("2 intruder(s)"));
    }

    #[tokio::test]
    async fn test_build_message_attaches_snapshots() {
        let notifier = test_notifier();
        let attachments = vec![
            SnapshotAttachment {
                filename: "intruder_1.jpg".to_string(),
                data: vec![0xFF, 0xD8, 0xFF],
            },
            SnapshotAttachment {
                filename: "intruder_2.jpg".to_string(),
                data: vec![0xFF, 0xD8, 0xFF],
            },
        ];

        let message = notifier.build_message(2, &attachments).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert_eq!(formatted.matches("image/jpeg").count(), 2);
        assert!(formatted.contains("intruder_1.jpg"));
        assert!(formatted.contains("intruder_2.jpg"));
    }

    #[tokio::test]
    async fn test_invalid_address_is_config_error() {
        let result = EmailNotifier::new("localhost", "not-an-address", "guard@example.com", "x");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
