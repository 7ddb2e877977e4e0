use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::AppError;
use crate::models::actor::Contact;
use crate::models::notification::NotificationTemplate;

/// Outbound email. Rendering the template is the mailer's business.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Contact,
        context: &Value,
    ) -> Result<(), AppError>;
}

/// Writes every mail to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Contact,
        context: &Value,
    ) -> Result<(), AppError> {
        info!(
            template = ?template,
            to = %recipient.email,
            subject = template.subject(),
            context = %context,
            "mail sent"
        );
        Ok(())
    }
}
