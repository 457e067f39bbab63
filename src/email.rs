use crate::config::EmailConfig;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

/// Send an update report email with text and HTML alternatives. Returns
/// whether the send succeeded; failures are logged, not propagated.
pub fn send_email(config: &EmailConfig, subject: &str, text_body: &str, html_body: &str) -> bool {
    let (user, password) = match (&config.smtp_user, &config.smtp_password) {
        (Some(user), Some(password)) => (user.clone(), password.clone()),
        _ => {
            error!("SMTP credentials not configured");
            return false;
        }
    };

    let to = match &config.to {
        Some(to) => to.clone(),
        None => {
            error!("No recipient configured for update email");
            return false;
        }
    };
    let from = config.from.clone().unwrap_or_else(|| user.clone());

    let message = Message::builder()
        .from(match from.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                error!("Invalid sender address '{}': {}", from, e);
                return false;
            }
        })
        .to(match to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                error!("Invalid recipient address '{}': {}", to, e);
                return false;
            }
        })
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(
            text_body.to_string(),
            html_body.to_string(),
        ));

    let message = match message {
        Ok(message) => message,
        Err(e) => {
            error!("Failed to build email message: {}", e);
            return false;
        }
    };

    let credentials = Credentials::new(user, password);

    // 465 is implicit TLS; anything else goes through STARTTLS
    let transport = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    };
    let mailer = match transport {
        Ok(builder) => builder
            .port(config.smtp_port)
            .credentials(credentials)
            .build(),
        Err(e) => {
            error!("Failed to create SMTP transport: {}", e);
            return false;
        }
    };

    match mailer.send(&message) {
        Ok(_) => {
            info!("Email sent successfully to {}", to);
            true
        }
        Err(e) => {
            error!("Failed to send email: {}", e);
            false
        }
    }
}
