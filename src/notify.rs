//! Bulk notification of generated cards.
//!
//! Delivery is behind [`Notifier`]. The only implementation is a simulated
//! mailer that logs the message and accepts any address containing `@`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::enrich::GeminiClient;

/// Editable email template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub content: String,
}

pub fn email_templates() -> Vec<EmailTemplate> {
    vec![
        EmailTemplate {
            id: "activation".into(),
            name: "Account Activation".into(),
            subject: "Activate Your CampusCard Account".into(),
            content: "Hello [User Name],\n\nWelcome to CampusCard! Please click the link below to \
                      activate your account and access your new digital ID.\n\nActivation Link: \
                      [Activation Link]\n\nIf you did not sign up for this service, please ignore \
                      this email."
                .into(),
        },
        EmailTemplate {
            id: "notification".into(),
            name: "ID Card Notification".into(),
            subject: "Your New Digital ID Card is Ready!".into(),
            content: "Hello [User Name],\n\nYour new digital ID card with number [Card Number] has \
                      been generated. It is valid until [Expiry Date].\n\nYou can view and manage \
                      your ID through the student portal.\n\nThank you,\nThe CampusID Team"
                .into(),
        },
    ]
}

/// One outgoing bulk message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Number of cards the message covers.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyResult {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &BulkEmail) -> NotifyResult;
}

/// Logs instead of sending.
#[derive(Debug, Clone)]
pub struct SimulatedMailer {
    delay: Duration,
}

impl Default for SimulatedMailer {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }
}

impl SimulatedMailer {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Notifier for SimulatedMailer {
    async fn send(&self, email: &BulkEmail) -> NotifyResult {
        tracing::info!(
            recipient = %email.recipient,
            subject = %email.subject,
            count = email.count,
            "Simulating bulk email"
        );
        tracing::debug!(body = %email.body, "Bulk email body");
        tokio::time::sleep(self.delay).await;

        if email.recipient.contains('@') {
            NotifyResult {
                success: true,
                message: format!("{} ID card(s) sent successfully!", email.count),
            }
        } else {
            tracing::warn!(recipient = %email.recipient, "Invalid email address");
            NotifyResult {
                success: false,
                message: "Invalid email address provided.".into(),
            }
        }
    }
}

/// Body used when no writer is configured or the writer fails.
pub fn bulk_email_body(names: &[String]) -> String {
    format!(
        "Hello,\n\nYour new digital ID cards for the following participants are ready:\n\n- {}\n\n\
         You can now distribute them or have the participants access them via the portal.\n\n\
         Thank you,\nThe CampusID Team",
        names.join("\n- ")
    )
}

fn bulk_email_prompt(template: &EmailTemplate, names: &[String]) -> String {
    format!(
        "Based on the following email template for a single user:\n---\nSubject: {}\nContent: {}\n---\n\n\
         Now, write a friendly and professional email body to a single recipient (e.g., an \
         administrator or a group leader) to inform them that the digital ID cards for the \
         following people are ready: {}.\n\nDo not include a subject line.\nThe email should list \
         the names clearly.\nAdapt the tone from the template for a bulk notification.\nKeep it concise.",
        template.subject,
        template.content,
        names.join(", ")
    )
}

/// Draft a bulk notification body, with Gemini when available.
pub async fn compose_bulk_body(writer: Option<&GeminiClient>, names: &[String]) -> String {
    let Some(writer) = writer else {
        return bulk_email_body(names);
    };
    let templates = email_templates();
    let Some(template) = templates.iter().find(|t| t.id == "notification") else {
        return bulk_email_body(names);
    };
    match writer.generate_text(&bulk_email_prompt(template, names)).await {
        Ok(body) if !body.trim().is_empty() => body,
        Ok(_) => bulk_email_body(names),
        Err(e) => {
            tracing::warn!(error = %e, "Bulk email drafting failed, using fallback body");
            bulk_email_body(names)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn email(to: &str, count: usize) -> BulkEmail {
        BulkEmail {
            recipient: to.into(),
            subject: "Your IDs".into(),
            body: "hi".into(),
            count,
        }
    }

    #[tokio::test]
    async fn test_simulated_mailer() {
        let mailer = SimulatedMailer::with_delay(Duration::ZERO);
        assert_eq!(
            mailer.send(&email("admin@example.com", 3)).await,
            NotifyResult { success: true, message: "3 ID card(s) sent successfully!".into() }
        );
        assert_eq!(
            mailer.send(&email("nobody", 3)).await,
            NotifyResult { success: false, message: "Invalid email address provided.".into() }
        );
    }

    #[test]
    fn test_fallback_body_lists_names() {
        let body = bulk_email_body(&["Priya".into(), "Ravi".into()]);
        assert!(body.starts_with("Hello,\n\n"));
        assert!(body.contains("\n\n- Priya\n- Ravi\n\n"));
        assert!(body.ends_with("The CampusID Team"));
    }

    #[tokio::test]
    async fn test_compose_without_writer_uses_fallback() {
        let names = vec!["Priya".to_string()];
        assert_eq!(compose_bulk_body(None, &names).await, bulk_email_body(&names));
    }

    #[test]
    fn test_prompt_uses_notification_template() {
        let templates = email_templates();
        let prompt = bulk_email_prompt(&templates[1], &["A".into(), "B".into()]);
        assert!(prompt.contains("Subject: Your New Digital ID Card is Ready!"));
        assert!(prompt.contains("following people are ready: A, B."));
    }
}
