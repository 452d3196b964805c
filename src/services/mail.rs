//! Outbound mail for account activation and password recovery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Config, MailTransportConfig};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation_email(&self, to: &str, token: &str) -> Result<()>;

    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<()>;
}

#[must_use]
pub fn activation_link(website_url: &str, token: &str) -> String {
    format!("{}/activate?token={token}", website_url.trim_end_matches('/'))
}

#[must_use]
pub fn reset_link(website_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={token}",
        website_url.trim_end_matches('/')
    )
}

fn render(intro: &str, link: &str) -> String {
    let link = html_escape::encode_double_quoted_attribute(link);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body>
    <p>{intro}</p>
    <p><a href="{link}">{link}</a></p>
    <p>This is an automated message, please do not reply to this email.</p>
</body>
</html>"#
    )
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// [`Mailer`] backed by lettre, over SMTP or into `.eml` files.
pub struct LettreMailer {
    transport: Transport,
    from: Mailbox,
    website_url: String,
}

impl LettreMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let mail = &config.mail;

        let transport = match &mail.transport {
            MailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    warn!("SMTP TLS is disabled");
                }

                let mut builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .context("Failed to create SMTP transport")?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                }
                .port(*port);

                if let Some(username) = username {
                    builder = builder.credentials(Credentials::new(
                        username.clone(),
                        password.clone().unwrap_or_default(),
                    ));
                }

                Transport::Smtp(builder.build())
            }
            MailTransportConfig::File { path } => {
                let dir = Path::new(path);
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create mail directory {path}"))?;
                Transport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        let from = format!("{} <{}>", mail.from_name, mail.from_email)
            .parse::<Mailbox>()
            .context("Invalid mail.from_email")?;

        Ok(Self {
            transport,
            from,
            website_url: config.general.website_url.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let to = to.parse::<Mailbox>().context("Invalid recipient address")?;
        let plain = html2text::from_read(html.as_bytes(), 80)
            .context("Failed to render plain-text body")?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(plain, html))
            .context("Failed to build email message")?;

        match &self.transport {
            Transport::Smtp(smtp) => {
                smtp.send(message).await.context("Failed to send SMTP email")?;
            }
            Transport::File(file) => {
                file.send(message).await.context("Failed to write email file")?;
            }
        }

        debug!(subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send_activation_email(&self, to: &str, token: &str) -> Result<()> {
        let link = activation_link(&self.website_url, token);
        let html = render("Click the link below to activate your account:", &link);
        self.send(to, "Activate your account", html).await
    }

    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<()> {
        let link = reset_link(&self.website_url, token);
        let html = render("Click the link below to reset your password:", &link);
        self.send(to, "Reset your password", html).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Activation,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub kind: MailKind,
    pub to: String,
    pub token: String,
}

/// Keeps messages in memory instead of delivering them. Used by tests and
/// by deployments without mail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Token of the most recent message of `kind` sent to `to`.
    #[must_use]
    pub fn last_token(&self, kind: MailKind, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
            .map(|m| m.token)
    }

    fn record(&self, kind: MailKind, to: &str, token: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("mail transport unavailable");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mail log poisoned"))?
            .push(SentMail {
                kind,
                to: to.to_string(),
                token: token.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_activation_email(&self, to: &str, token: &str) -> Result<()> {
        self.record(MailKind::Activation, to, token)
    }

    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<()> {
        self.record(MailKind::PasswordReset, to, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        assert_eq!(
            activation_link("https://home.example/", "abc"),
            "https://home.example/activate?token=abc"
        );
        assert_eq!(
            reset_link("https://home.example", "abc"),
            "https://home.example/reset-password?token=abc"
        );
    }

    #[test]
    fn test_render_contains_link() {
        let html = render("Hi", "https://x/activate?token=1&a=2");
        assert!(html.contains("https://x/activate?token=1&amp;a=2"));
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = std::env::temp_dir().join(format!("homebase-mail-{}", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.mail.transport = MailTransportConfig::File {
            path: dir.to_string_lossy().into_owned(),
        };

        let mailer = LettreMailer::new(&config).unwrap();
        mailer
            .send_activation_email("alice@x.com", "tok123")
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_recording_mailer() {
        let mailer = RecordingMailer::new();
        mailer.send_activation_email("a@x.com", "t1").await.unwrap();
        mailer.send_password_reset_email("a@x.com", "t2").await.unwrap();

        assert_eq!(mailer.sent().len(), 2);
        assert_eq!(
            mailer.last_token(MailKind::PasswordReset, "a@x.com").as_deref(),
            Some("t2")
        );
        assert!(mailer.last_token(MailKind::Activation, "b@x.com").is_none());

        let failing = RecordingMailer::failing();
        assert!(failing.send_activation_email("a@x.com", "t").await.is_err());
        assert!(failing.sent().is_empty());
    }
}
