use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::TELEGRAM_API_URL;
use crate::error::{AppError, Result};
use crate::format::{render_alert, with_watch_note};
use crate::state::Watchlist;
use crate::types::{Opportunity, SubscriberId};

/// "Deliver text to subscriber", fallible. No retries within a cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage`; the subscriber id is the chat id.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(TELEGRAM_API_URL, token, timeout)
    }

    pub fn with_base_url(base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "chat_id": subscriber,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            // the request URL carries the bot token
            .map_err(|e| AppError::Http(e.without_url()))?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(AppError::Notify(format!("sendMessage to {subscriber} failed: {status} {body}")))
    }
}

/// Used when no bot token is configured: alerts only reach the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        info!(subscriber, "ALERT\n{text}");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send every alert to every subscriber. Each (subscriber, alert) pair is
/// independent: a failure is logged and the rest still go out. Alerts that
/// hit a subscriber's watchlist say so in that subscriber's copy.
pub async fn dispatch(
    notifier: &dyn Notifier,
    recipients: &[(SubscriberId, Watchlist)],
    alerts: &[Opportunity],
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for o in alerts {
        let text = render_alert(o);
        for (sub, watch) in recipients {
            let text = with_watch_note(&text, &watch.matches(o));
            match notifier.deliver(*sub, &text).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = *sub, opportunity = %o.id, "delivery failed: {e}");
                    report.failed += 1;
                }
            }
        }
    }
    report
}
