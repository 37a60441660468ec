use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::delivery::push::{PushError, PushProvider};
use crate::delivery::types::{OptIn, PushMessage, PushTicket, Recipient};
use crate::signals::enricher::{DisplayPayload, Enricher, Entitlement};

const ANDROID_CHANNEL: &str = "signals";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub recipients: usize,
    pub queued: usize,
    pub skipped_invalid_token: usize,
    pub skipped_disabled: usize,
    pub skipped_opt_out: usize,
    pub opt_in_defaulted: usize,
    pub chunks_sent: usize,
    pub chunks_failed: usize,
    pub tickets_ok: usize,
    pub tickets_error: usize,
}

impl FanoutReport {
    pub fn skipped(&self) -> usize {
        self.skipped_invalid_token + self.skipped_disabled + self.skipped_opt_out
    }
}

/// Per-recipient messages for one alert, filtered and masked.
pub fn build_messages(
    recipients: &[Recipient],
    display: &DisplayPayload,
    enricher: &Enricher,
    provider: &dyn PushProvider,
) -> (Vec<PushMessage>, FanoutReport) {
    let mut report = FanoutReport {
        recipients: recipients.len(),
        ..FanoutReport::default()
    };
    let mut messages = Vec::with_capacity(recipients.len());

    for recipient in recipients {
        if !provider.is_valid_token(&recipient.token) {
            report.skipped_invalid_token += 1;
            continue;
        }
        if !recipient.settings.notifications_enabled {
            report.skipped_disabled += 1;
            continue;
        }
        match recipient.settings.opt_in(display.signal) {
            OptIn::Disabled => {
                report.skipped_opt_out += 1;
                continue;
            }
            OptIn::Defaulted => report.opt_in_defaulted += 1,
            OptIn::Enabled => {}
        }

        let entitlement = Entitlement {
            is_pro: recipient.settings.is_pro,
        };
        let payload = enricher.apply_entitlement(display.clone(), entitlement);
        messages.push(to_message(&recipient.token, payload));
    }

    report.queued = messages.len();
    (messages, report)
}

fn to_message(token: &str, payload: DisplayPayload) -> PushMessage {
    let title = format!("{} {}", payload.icon, payload.title);
    let body = payload.body.clone();
    let data = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);

    PushMessage {
        to: token.to_string(),
        title,
        body,
        data,
        sound: "default".to_string(),
        priority: "high".to_string(),
        channel_id: Some(ANDROID_CHANNEL.to_string()),
    }
}

type ChunkResult = (usize, Result<Vec<PushTicket>, PushError>);

/// Sends `messages` in provider-sized chunks. A failed chunk is logged and
/// counted; the remaining chunks still go out.
pub async fn deliver(
    provider: Arc<dyn PushProvider>,
    messages: &[PushMessage],
    max_concurrent_chunks: usize,
    chunk_timeout: Duration,
    report: &mut FanoutReport,
) {
    if messages.is_empty() {
        return;
    }

    let chunk_size = provider.max_chunk_size().max(1);
    // Owned chunks keep the in-flight futures 'static and Send.
    let chunks: Vec<Vec<PushMessage>> = messages.chunks(chunk_size).map(<[PushMessage]>::to_vec).collect();

    let results: Vec<ChunkResult> = stream::iter(chunks.into_iter().enumerate())
        .map(move |(index, chunk)| send_one(Arc::clone(&provider), index, chunk, chunk_timeout))
        .buffer_unordered(max_concurrent_chunks.max(1))
        .collect()
        .await;

    for (index, result) in results {
        match result {
            Ok(tickets) => {
                report.chunks_sent += 1;
                for ticket in &tickets {
                    match ticket {
                        PushTicket::Ok { .. } => report.tickets_ok += 1,
                        PushTicket::Error { message, .. } => {
                            report.tickets_error += 1;
                            warn!("Push ticket error in chunk {}: {}", index, message);
                        }
                    }
                }
            }
            Err(e) => {
                report.chunks_failed += 1;
                warn!("Push chunk {} failed: {}", index, e);
            }
        }
    }

    info!(
        "Fan-out complete: {} queued, {} chunks sent, {} failed, {} ok tickets, {} error tickets",
        report.queued, report.chunks_sent, report.chunks_failed, report.tickets_ok, report.tickets_error
    );
}

async fn send_one(
    provider: Arc<dyn PushProvider>,
    index: usize,
    chunk: Vec<PushMessage>,
    timeout: Duration,
) -> ChunkResult {
    let result = match tokio::time::timeout(timeout, provider.send_chunk(&chunk)).await {
        Ok(result) => result,
        Err(_) => Err(PushError::Timeout(timeout.as_millis() as u64)),
    };
    (index, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresentationConfig;
    use crate::delivery::fake::FakePushProvider;
    use crate::delivery::types::RecipientSettings;
    use crate::signals::enricher::LOCKED;
    use crate::signals::types::{Alert, SignalKey};
    use chrono::Utc;

    fn recipient(token: &str, is_pro: bool) -> Recipient {
        Recipient {
            token: token.to_string(),
            settings: RecipientSettings {
                is_pro,
                ..RecipientSettings::default()
            },
        }
    }

    fn display(key: Option<SignalKey>) -> (Enricher, DisplayPayload) {
        let enricher = Enricher::new(PresentationConfig::default());
        let alert = Alert {
            strategy: "Horus Buy".to_string(),
            ticker: "NQ".to_string(),
            price: "20650".to_string(),
            timeframe: "M1".to_string(),
            action: "buy".to_string(),
            raw_message: None,
            received_at: Utc::now(),
        };
        let payload = enricher.display(&alert, key);
        (enricher, payload)
    }

    #[test]
    fn test_filters_invalid_disabled_and_opted_out() {
        let provider = FakePushProvider::default();
        let (enricher, payload) = display(Some(SignalKey::HorusBuy));

        let mut disabled = recipient("ExponentPushToken[disabled]", true);
        disabled.settings.notifications_enabled = false;
        let mut opted_out = recipient("ExponentPushToken[optout]", true);
        opted_out.settings.signals.insert("horus_Buy".to_string(), false);
        let mut opted_in = recipient("ExponentPushToken[optin]", true);
        opted_in.settings.signals.insert("horus_Buy".to_string(), true);

        let recipients = vec![
            recipient("not-a-token", true),
            disabled,
            opted_out,
            opted_in,
            recipient("ExponentPushToken[default]", false),
        ];

        let (messages, report) = build_messages(&recipients, &payload, &enricher, &provider);
        let tokens: Vec<&str> = messages.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(tokens, vec!["ExponentPushToken[optin]", "ExponentPushToken[default]"]);
        assert_eq!(report.skipped_invalid_token, 1);
        assert_eq!(report.skipped_disabled, 1);
        assert_eq!(report.skipped_opt_out, 1);
        assert_eq!(report.opt_in_defaulted, 1);
        assert_eq!(report.queued, 2);
        assert_eq!(report.skipped(), 3);
    }

    #[test]
    fn test_mask_applied_per_recipient() {
        let provider = FakePushProvider::default();
        let (enricher, payload) = display(Some(SignalKey::HorusBuy));
        let recipients = vec![
            recipient("ExponentPushToken[pro]", true),
            recipient("ExponentPushToken[free]", false),
        ];

        let (messages, _) = build_messages(&recipients, &payload, &enricher, &provider);
        assert_eq!(messages[0].data["price"], "20650");
        assert_eq!(messages[0].data["locked"], false);
        assert_eq!(messages[1].data["price"], LOCKED);
        assert_eq!(messages[1].data["message"], LOCKED);
        assert_eq!(messages[1].data["locked"], true);
    }

    #[test]
    fn test_unclassified_still_delivered() {
        let provider = FakePushProvider::default();
        let (enricher, payload) = display(None);
        let recipients = vec![recipient("ExponentPushToken[a]", true)];
        let (messages, report) = build_messages(&recipients, &payload, &enricher, &provider);
        assert_eq!(messages.len(), 1);
        assert_eq!(report.opt_in_defaulted, 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_does_not_abort_remaining() {
        let provider = FakePushProvider::new(2);
        provider.fail_chunk(1);
        let (enricher, payload) = display(Some(SignalKey::HorusBuy));
        let recipients: Vec<Recipient> = (0..5)
            .map(|i| recipient(&format!("ExponentPushToken[{}]", i), true))
            .collect();

        let (messages, mut report) = build_messages(&recipients, &payload, &enricher, &provider);
        deliver(Arc::new(provider.clone()), &messages, 1, Duration::from_secs(1), &mut report).await;

        assert_eq!(provider.calls(), 3);
        assert_eq!(report.chunks_sent, 2);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.tickets_ok, 3);
        let sent: Vec<String> = provider.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(sent, vec!["ExponentPushToken[0]", "ExponentPushToken[1]", "ExponentPushToken[4]"]);
    }

    #[tokio::test]
    async fn test_ticket_errors_are_counted() {
        let provider = FakePushProvider::default();
        provider.reject_token("ExponentPushToken[gone]");
        let (enricher, payload) = display(Some(SignalKey::HorusBuy));
        let recipients = vec![
            recipient("ExponentPushToken[gone]", true),
            recipient("ExponentPushToken[here]", true),
        ];

        let (messages, mut report) = build_messages(&recipients, &payload, &enricher, &provider);
        deliver(Arc::new(provider.clone()), &messages, 4, Duration::from_secs(1), &mut report).await;

        assert_eq!(report.chunks_sent, 1);
        assert_eq!(report.tickets_ok, 1);
        assert_eq!(report.tickets_error, 1);
    }
}
