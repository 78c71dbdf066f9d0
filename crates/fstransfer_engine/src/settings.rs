use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub retry: RetrySettings,
    pub executor: ExecutorSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub delay_secs: u64,
    /// Attempts allowed before a request is marked `ERROR`. Zero means no
    /// retries.
    pub limit: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            delay_secs: 3600,
            limit: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Selection limit for one invocation. Zero or negative is unbounded.
    pub batch_limit: i64,
    pub concurrency: usize,
    pub claim_ttl_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            concurrency: 1,
            claim_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub mail_subject: String,
    pub mail_sender: String,
    pub mail_recipient: Option<String>,
    pub application_name: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mail_subject: "File transfer failure".to_string(),
            mail_sender: "noreply@localhost".to_string(),
            mail_recipient: None,
            application_name: "fstransfer".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TransferSettings;

    #[test]
    fn empty_document_uses_defaults() {
        let settings: TransferSettings = toml::from_str("").expect("parse");
        assert_eq!(settings.retry.delay_secs, 3600);
        assert_eq!(settings.retry.limit, 0);
        assert!(!settings.notifications.enabled);
        assert_eq!(settings.executor.concurrency, 1);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: TransferSettings = toml::from_str(
            r#"
            [retry]
            limit = 3

            [notifications]
            enabled = true
            mail_recipient = "ops@example.org"
            "#,
        )
        .expect("parse");

        assert_eq!(settings.retry.limit, 3);
        assert_eq!(settings.retry.delay_secs, 3600);
        assert!(settings.notifications.enabled);
        assert_eq!(
            settings.notifications.mail_recipient.as_deref(),
            Some("ops@example.org")
        );
        assert_eq!(settings.notifications.mail_subject, "File transfer failure");
    }
}
