//! Notification boundary.
//!
//! Delivery is best-effort: callers log a failed send and carry on. The
//! default sender for local dev is [`LogEmailSender`], which logs and returns
//! `Ok(())`.

use anyhow::Result;
use tracing::info;
use url::Url;

use crate::verification::VerificationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it was not sent.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Build the frontend verification link included in outbound emails.
///
/// # Errors
///
/// Returns an error if `frontend_base_url` is not a valid URL.
pub fn build_verify_url(frontend_base_url: &str, token: &VerificationToken) -> Result<Url> {
    let mut url = Url::parse(frontend_base_url)?.join("verify-email")?;
    url.set_fragment(Some(&format!("token={token}")));
    Ok(url)
}

/// Verification email for a freshly registered address.
#[must_use]
pub fn verification_message(to: &str, from: &str, verify_url: &Url) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        from: from.to_string(),
        subject: "Confirm your email address".to_string(),
        body: format!(
            "Welcome!\n\nConfirm your email address by opening the link below:\n\n{verify_url}\n\nIf you did not sign up, ignore this message.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::new_verification_token;
    use uuid::Uuid;

    #[test]
    fn verify_url_carries_token_in_fragment() -> Result<()> {
        let token = new_verification_token(Uuid::new_v4());
        let url = build_verify_url("https://tessera.dev/", &token)?;
        assert_eq!(url.path(), "/verify-email");
        assert_eq!(url.fragment(), Some(format!("token={token}").as_str()));
        Ok(())
    }

    #[test]
    fn verify_url_rejects_invalid_base() {
        let token = new_verification_token(Uuid::new_v4());
        assert!(build_verify_url("not a url", &token).is_err());
    }

    #[test]
    fn message_contains_link() -> Result<()> {
        let token = new_verification_token(Uuid::new_v4());
        let url = build_verify_url("https://tessera.dev", &token)?;
        let message = verification_message("a@b.com", "no-reply@tessera.dev", &url);
        assert_eq!(message.to, "a@b.com");
        assert!(message.body.contains(url.as_str()));
        Ok(())
    }

    #[test]
    fn log_sender_accepts_messages() {
        let message = EmailMessage {
            to: "a@b.com".to_string(),
            from: "no-reply@tessera.dev".to_string(),
            subject: "hi".to_string(),
            body: "body".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
