//! Transient per-identity notices.
//!
//! Background work (a rolled-back cart update, say) has no response to
//! report through, so it leaves a notice here; the next page or fragment
//! rendered for that identity takes and shows it. Unclaimed notices expire.

use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use market_pulse_core::Email;

/// How long an unclaimed notice is kept.
const NOTICE_TTL: Duration = Duration::from_secs(60);

/// Upper bound on identities with pending notices.
const MAX_QUEUES: u64 = 10_000;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

impl NoticeLevel {
    /// CSS modifier used by the notices partial.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// A dismissible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Notice queues keyed by identity.
#[derive(Clone)]
pub struct Notifications {
    queues: Cache<Email, Vec<Notice>>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Cache::builder()
                .max_capacity(MAX_QUEUES)
                .time_to_live(NOTICE_TTL)
                .build(),
        }
    }

    /// Queue a notice for `email`.
    pub async fn push(&self, email: &Email, notice: Notice) {
        self.queues
            .entry(email.clone())
            .and_upsert_with(|existing| {
                let mut notices = existing.map(moka::Entry::into_value).unwrap_or_default();
                notices.push(notice);
                std::future::ready(notices)
            })
            .await;
    }

    /// Take every pending notice for `email`, oldest first.
    pub async fn take(&self, email: &Email) -> Vec<Notice> {
        self.queues.remove(email).await.unwrap_or_default()
    }

    /// Drop pending notices for `email`.
    pub async fn clear(&self, email: &Email) {
        self.queues.invalidate(email).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_drains_in_order() {
        let notifications = Notifications::new();
        let email = Email::parse("buyer@market.example").unwrap();

        notifications.push(&email, Notice::error("first")).await;
        notifications.push(&email, Notice::info("second")).await;

        let notices = notifications.take(&email).await;
        assert_eq!(notices, vec![Notice::error("first"), Notice::info("second")]);
        assert!(notifications.take(&email).await.is_empty());
    }

    #[tokio::test]
    async fn test_queues_are_per_identity() {
        let notifications = Notifications::new();
        let a = Email::parse("a@market.example").unwrap();
        let b = Email::parse("b@market.example").unwrap();

        notifications.push(&a, Notice::error("for a")).await;
        assert!(notifications.take(&b).await.is_empty());
        assert_eq!(notifications.take(&a).await.len(), 1);
    }
}
