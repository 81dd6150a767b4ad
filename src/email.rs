//! Outbound mail capability for the token-carrying flows.
//!
//! The portal mails exactly two things: password-reset links and account
//! validation links. Delivery is behind a trait so deployments can plug in a
//! real relay; the default implementation logs the message, which is also
//! what the tests observe. Sends are synchronous from the caller's point of
//! view on purpose: the forgot-password flow must not store its lock when the
//! mail could not be produced.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait EmailSender: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    /// Returns an error when the message could not be handed off; callers
    /// abort their flow and tell the user to retry later.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Log-only sender used by default and in tests.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

/// Mail carrying the password-reset token.
#[must_use]
pub fn password_reset_message(to: &str, username: &str, reset_url: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Password reset procedure".to_string(),
        body: format!(
            "A password reset was requested for {username}.\n\
             Follow this link to choose a new password:\n\n{reset_url}\n\n\
             If you did not request this, you can ignore this message."
        ),
    }
}

/// Mail carrying the account validation token.
#[must_use]
pub fn account_validation_message(to: &str, username: &str, activation_url: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Confirm your account".to_string(),
        body: format!(
            "Welcome {username}!\n\
             Follow this link to confirm your address and activate your \
             account:\n\n{activation_url}\n\n\
             The link expires; if it does, just register again."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_embed_the_link() {
        let message = password_reset_message(
            "alice@example.test",
            "alice",
            "https://portal.example.test/reset?token=abc",
        );
        assert_eq!(message.to, "alice@example.test");
        assert!(message.body.contains("https://portal.example.test/reset?token=abc"));

        let message = account_validation_message(
            "bob@example.test",
            "bob",
            "https://portal.example.test/activate?token=xyz",
        );
        assert!(message.body.contains("token=xyz"));
        assert!(message.body.contains("bob"));
    }

    #[test]
    fn log_sender_accepts_messages() {
        let sender = LogEmailSender;
        let message = password_reset_message("a@b.test", "a", "https://x.test");
        assert!(sender.send(&message).is_ok());
    }
}
