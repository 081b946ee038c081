use std::sync::Arc;

use axum::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, to: &str, token: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
            .port(cfg.port)
            .credentials(Credentials::new(cfg.user.clone(), cfg.pass.clone()))
            .build();
        let from: Mailbox = cfg.from.parse()?;
        Ok(Self {
            transport,
            from,
            base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let link = format!("{}/auth/confirm-email?token={}", self.base_url, token);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject("Verify your account")
            .body(format!("Click to verify: {link}"))?;
        self.transport.send(message).await?;
        info!(email = %to, "verification email sent");
        Ok(())
    }
}

/// Best-effort background delivery, decoupled from the request. A failure is
/// logged and never fails the triggering request.
pub fn spawn_verification(mailer: Arc<dyn Mailer>, to: String, token: String) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send_verification(&to, &token).await {
            warn!(error = %e, email = %to, "verification email delivery failed");
        }
    });
}
