//! HTML email delivery over SMTP.

use crate::transport::{ChannelTransport, TransportError};
use bondwatch_core::{validate::is_valid_email, Brand, BreachEvent, ChannelKind};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailTransport {
    pub fn new(config: EmailConfig) -> Result<Self, TransportError> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| TransportError::Email(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();
        Ok(Self {
            mailer,
            from: config.from,
        })
    }

    async fn send_email(
        &self,
        to: &str,
        brand: Brand,
        subject: &str,
        plain: String,
        html: String,
    ) -> Result<(), TransportError> {
        if !is_valid_email(to) {
            return Err(TransportError::InvalidDestination(to.to_string()));
        }

        let from: Mailbox = format!("{} Notifications <{}>", brand.display_name(), self.from)
            .parse()
            .map_err(|e| TransportError::Email(format!("bad sender address: {}", e)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|_| TransportError::InvalidDestination(to.to_string()))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(plain, html))
            .map_err(|e| TransportError::Email(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| TransportError::Email(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send_verification_code(
        &self,
        destination: &str,
        code: &str,
        brand: Brand,
    ) -> Result<(), TransportError> {
        let subject = format!("{} Balance Notification Verification", brand.display_name());
        self.send_email(
            destination,
            brand,
            &subject,
            verification_plain(code, brand),
            verification_html(code, brand),
        )
        .await
    }

    async fn send_breach_alert(
        &self,
        destination: &str,
        event: &BreachEvent,
    ) -> Result<(), TransportError> {
        let subject = format!("{} Balance Alert", event.brand.display_name());
        self.send_email(
            destination,
            event.brand,
            &subject,
            alert_plain(event),
            alert_html(event),
        )
        .await?;
        info!(destination = destination, "Email alert sent");
        Ok(())
    }
}

fn verification_plain(code: &str, brand: Brand) -> String {
    format!(
        "{} Balance Notification Verification\n\n\
         Your verification code is: {}\n\
         This code expires in 10 minutes.\n\n\
         If you did not request this, you can ignore this email.",
        brand.display_name(),
        code
    )
}

fn verification_html(code: &str, brand: Brand) -> String {
    format!(
        "<div style=\"font-family: sans-serif; max-width: 480px;\">\
           <h2>🔐 {} Balance Notification Verification</h2>\
           <p>Your verification code is:</p>\
           <p style=\"font-size: 28px; font-weight: bold; letter-spacing: 4px;\">{}</p>\
           <p>This code expires in 10 minutes.</p>\
           <p style=\"color: #888;\">If you did not request this, you can ignore this email.</p>\
         </div>",
        brand.display_name(),
        code
    )
}

fn alert_plain(event: &BreachEvent) -> String {
    format!(
        "{} Balance Alert\n\n\
         Bond Address: {}\n\
         Current Balance: {} SOL\n\
         Threshold: {} SOL\n\n\
         Your balance has dropped below your set threshold!",
        event.brand.display_name(),
        event.address,
        event.balance_display(),
        event.threshold
    )
}

fn alert_html(event: &BreachEvent) -> String {
    format!(
        "<div style=\"font-family: sans-serif; max-width: 480px;\">\
           <h2>⚠️ {} Balance Alert</h2>\
           <table style=\"border-collapse: collapse;\">\
             <tr><td style=\"padding: 4px 12px 4px 0;\"><b>Bond Address</b></td><td><code>{}</code></td></tr>\
             <tr><td style=\"padding: 4px 12px 4px 0;\"><b>Current Balance</b></td><td>{} SOL</td></tr>\
             <tr><td style=\"padding: 4px 12px 4px 0;\"><b>Threshold</b></td><td>{} SOL</td></tr>\
           </table>\
           <p>Your balance has dropped below your set threshold!</p>\
         </div>",
        event.brand.display_name(),
        event.address,
        event.balance_display(),
        event.threshold
    )
}
