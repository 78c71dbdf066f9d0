use anyhow::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;
use fstransfer_contract::{RequestError, TransferRequest};
use serde::Serialize;
use tracing::{info, warn};

use crate::settings::NotificationSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureAlert {
    pub sender_name: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound channel for failure alerts. Delivery is fire-and-forget from the
/// executor's point of view.
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, alert: &FailureAlert) -> Result<()>;
}

/// Writes alerts to the log instead of a mail relay.
#[derive(Debug, Clone, Default)]
pub struct TracingAlertSender;

#[async_trait]
impl AlertSender for TracingAlertSender {
    async fn send(&self, alert: &FailureAlert) -> Result<()> {
        warn!(
            recipients = ?alert.recipients,
            subject = %alert.subject,
            "transfer failure alert"
        );
        info!(body = %alert.body, "transfer failure alert body");
        Ok(())
    }
}

/// Builds the alert for a failed attempt, or `None` when notifications are
/// off or nobody is configured to receive them.
pub fn render_failure_alert(
    settings: &NotificationSettings,
    request: &TransferRequest,
    error: &RequestError,
) -> Option<FailureAlert> {
    if !settings.enabled {
        return None;
    }

    let mut recipients: Vec<String> = Vec::new();
    for address in [settings.mail_recipient.as_deref(), request.contact_mail.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
    {
        if !address.is_empty() && !recipients.iter().any(|known| known == address) {
            recipients.push(address.to_string());
        }
    }
    if recipients.is_empty() {
        return None;
    }

    Some(FailureAlert {
        sender_name: settings.application_name.clone(),
        sender: settings.mail_sender.clone(),
        recipients,
        subject: settings.mail_subject.clone(),
        body: render_body(&settings.application_name, request, error),
    })
}

fn render_body(application: &str, request: &TransferRequest, error: &RequestError) -> String {
    let context = if request.request_context.is_empty() {
        String::new()
    } else {
        format!("  context:         {}\n", request.request_context)
    };

    format!(
        "{application}: transfer request {id} failed\n\n\
         Request\n\
         \x20 file key:        {old_file_key}\n\
         \x20 source provider: {source}\n\
         \x20 target provider: {target}\n\
         \x20 status:          {status}\n\
         \x20 retry count:     {retry_count}\n\
         \x20 next execution:  {next_execution}\n\
         {context}\n\
         Error\n\
         \x20 code:    {code}\n\
         \x20 message: {message}\n\
         \x20 at:      {failed_at}\n\
         \n{trace}",
        id = request.id,
        old_file_key = request.old_file_key,
        source = request.source_provider_name,
        target = request.target_provider_name,
        status = request.status,
        retry_count = request.retry_count,
        next_execution = request
            .execution_time
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        code = error.code,
        message = error.error_message,
        failed_at = error.execution_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        trace = error.error_trace,
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use fstransfer_contract::{RequestError, RequestStatus, TransferRequest};

    use super::render_failure_alert;
    use crate::settings::NotificationSettings;

    fn request(contact_mail: Option<&str>) -> TransferRequest {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        TransferRequest {
            id: 3,
            old_file_key: "doc-3".to_string(),
            source_provider_name: "local".to_string(),
            target_provider_name: "archive".to_string(),
            new_file_key: String::new(),
            status: RequestStatus::Failed,
            retry_count: 1,
            execution_time: at,
            creation_time: at,
            request_context: "case=12".to_string(),
            contact_mail: contact_mail.map(str::to_string),
        }
    }

    fn error() -> RequestError {
        RequestError {
            id: 1,
            request_id: 3,
            code: 404,
            error_message: "file doc-3 not found".to_string(),
            error_trace: "trace line".to_string(),
            execution_time: Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap(),
        }
    }

    fn enabled(recipient: Option<&str>) -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            mail_recipient: recipient.map(str::to_string),
            ..NotificationSettings::default()
        }
    }

    #[test]
    fn disabled_notifications_render_nothing() {
        let settings = NotificationSettings {
            mail_recipient: Some("ops@example.org".to_string()),
            ..NotificationSettings::default()
        };
        assert!(render_failure_alert(&settings, &request(None), &error()).is_none());
    }

    #[test]
    fn alert_goes_to_configured_recipient_and_contact() {
        let alert = render_failure_alert(
            &enabled(Some("ops@example.org")),
            &request(Some("owner@example.org")),
            &error(),
        )
        .expect("alert");

        assert_eq!(alert.recipients, vec!["ops@example.org", "owner@example.org"]);
        assert_eq!(alert.subject, "File transfer failure");
        assert!(alert.body.contains("transfer request 3 failed"));
        assert!(alert.body.contains("code:    404"));
        assert!(alert.body.contains("context:         case=12"));
        assert!(alert.body.ends_with("trace line"));
    }

    #[test]
    fn contact_alone_is_enough_and_duplicates_collapse() {
        let only_contact =
            render_failure_alert(&enabled(None), &request(Some("owner@example.org")), &error())
                .expect("alert");
        assert_eq!(only_contact.recipients, vec!["owner@example.org"]);

        let same = render_failure_alert(
            &enabled(Some("owner@example.org")),
            &request(Some(" owner@example.org ")),
            &error(),
        )
        .expect("alert");
        assert_eq!(same.recipients, vec!["owner@example.org"]);
    }

    #[test]
    fn no_recipient_means_no_alert() {
        assert!(render_failure_alert(&enabled(None), &request(None), &error()).is_none());
        assert!(render_failure_alert(&enabled(Some("  ")), &request(None), &error()).is_none());
    }
}
