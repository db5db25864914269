use super::config::NotificationConfig;
use crate::domain::{Error, NotificationSink, Result};
use lettre::Transport;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::SmtpTransport;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use std::time::Duration;
use tracing::{debug, error, info};

const SUBJECT: &str = "hostfleet: grupo suspenso";
const SMTPS_PORT: u16 = 465;

/// Sink used when no mail settings are configured: the alert only goes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, image: &str) -> Result<()> {
        error!("🚨 Grupo {} SUSPENSO; nenhum destinatário de e-mail configurado", image);
        Ok(())
    }
}

/// Delivers suspension alerts over SMTP.
///
/// Port 465 uses implicit TLS; any other port upgrades with STARTTLS when the
/// server offers it.
pub struct MailNotifier {
    config: NotificationConfig,
    transport: SmtpTransport,
}

impl MailNotifier {
    pub fn new(config: NotificationConfig, timeout: Duration) -> Result<Self> {
        let tls_parameters = TlsParameters::new(config.host.clone())
            .map_err(|e| Error::Notify(format!("TLS para {}: {e}", config.host)))?;
        let tls = if config.port == SMTPS_PORT {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let mut builder = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls)
            .timeout(Some(timeout));
        if !config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn server(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

impl NotificationSink for MailNotifier {
    fn notify(&self, image: &str) -> Result<()> {
        let message = build_message(&self.config, image)?;
        debug!("Enviando alerta para {}", self.config.recipient);

        self.transport
            .send(&message)
            .map_err(|e| Error::Notify(format!("SMTP {}: {e}", self.server())))?;

        info!("📧 Alerta de suspensão de {} enviado para {}", image, self.config.recipient);
        Ok(())
    }

    /// The server must accept a connection and the login.
    fn check(&self) -> Result<()> {
        info!("Verificando servidor SMTP {}...", self.server());

        let connected = self
            .transport
            .test_connection()
            .map_err(|e| Error::Notify(format!("SMTP {}: {e}", self.server())))?;
        if !connected {
            return Err(Error::Notify(format!(
                "SMTP {} não respondeu ao teste de conexão",
                self.server()
            )));
        }

        info!("Configuração SMTP válida");
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| Error::Notify(format!("endereço inválido '{address}': {e}")))
}

/// Plain-text message announcing that `image` was suspended.
pub fn build_message(config: &NotificationConfig, image: &str) -> Result<Message> {
    let body = [
        format!("hostfleet suspendeu o grupo {image} após falhas consecutivas ao iniciar containers."),
        String::new(),
        "O que fazer:".to_string(),
        "  - rode hostfleet com -d (ou log_level \"debug\") e acompanhe as tentativas;".to_string(),
        "  - inspecione os logs dos containers que falharam (docker logs <id>);".to_string(),
        "  - corrigida a causa, reinicie o hostfleet para reativar o grupo.".to_string(),
    ]
    .join("\n");

    Message::builder()
        .from(mailbox(&config.user)?)
        .to(mailbox(&config.recipient)?)
        .subject(format!("{SUBJECT} ({image})"))
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| Error::Notify(e.to_string()))
}
