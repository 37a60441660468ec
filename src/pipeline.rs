use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::delivery::fanout::{build_messages, deliver, FanoutReport};
use crate::delivery::push::PushProvider;
use crate::monitoring::logger::CsvLogger;
use crate::signals::classifier::classify_alert;
use crate::signals::enricher::Enricher;
use crate::signals::normalizer::Normalizer;
use crate::signals::types::{Alert, SignalKey};
use crate::storage::persistence::{SignalStore, StoreError};

/// Result of handling one inbound alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub signal: Option<SignalKey>,
    pub signal_id: Option<i64>,
    pub persisted: bool,
    pub recipients_loaded: bool,
    pub dry_run: bool,
    pub report: FanoutReport,
}

/// normalize -> classify -> enrich -> persist -> read recipients -> fan out.
///
/// Each stage after enrichment is best-effort: a failed write never blocks
/// delivery and a failed delivery never undoes the write.
pub struct Pipeline {
    normalizer: Normalizer,
    enricher: Enricher,
    store: Arc<dyn SignalStore>,
    provider: Arc<dyn PushProvider>,
    audit: Option<CsvLogger>,
    dry_run: bool,
    store_timeout: Duration,
    push_timeout: Duration,
    max_concurrent_chunks: usize,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn SignalStore>,
        provider: Arc<dyn PushProvider>,
        audit: Option<CsvLogger>,
    ) -> Result<Self> {
        Ok(Self {
            normalizer: Normalizer::new()?,
            enricher: Enricher::new(config.presentation.clone()),
            store,
            provider,
            audit,
            dry_run: config.system.dry_run,
            store_timeout: config.dispatch.store_timeout(),
            push_timeout: config.push.request_timeout(),
            max_concurrent_chunks: config.push.max_concurrent_chunks,
        })
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn PushProvider> {
        &self.provider
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub async fn handle_webhook(&self, body: &str, received_at: DateTime<Utc>) -> DispatchOutcome {
        let alert = self.normalizer.normalize_body(body, received_at);
        let key = classify_alert(&alert);

        let record = self.enricher.record(&alert, key);
        let signal_id = match bounded(self.store_timeout, self.store.insert_signal(&record)).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to persist signal for {}: {}", alert.ticker, e);
                None
            }
        };

        info!(
            signal = key.map(|k| k.as_str()).unwrap_or("unclassified"),
            ticker = %alert.ticker,
            strategy = %alert.strategy,
            persisted = signal_id.is_some(),
            "Webhook alert received"
        );

        let mut outcome = DispatchOutcome {
            signal: key,
            signal_id,
            persisted: signal_id.is_some(),
            recipients_loaded: false,
            dry_run: self.dry_run,
            report: FanoutReport::default(),
        };

        let recipients = match bounded(self.store_timeout, self.store.recipients()).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!("Failed to load recipients, skipping fan-out: {}", e);
                self.audit(&alert, &outcome);
                return outcome;
            }
        };
        outcome.recipients_loaded = true;

        let display = self.enricher.display(&alert, key);
        let (messages, mut report) =
            build_messages(&recipients, &display, &self.enricher, self.provider.as_ref());

        if report.opt_in_defaulted > 0 {
            info!(
                target: "audit",
                "Delivering {} to {} recipients without an explicit opt-in",
                key.map(|k| k.as_str()).unwrap_or("unclassified"),
                report.opt_in_defaulted
            );
        }

        if self.dry_run {
            info!("Dry run: {} messages built, none sent", messages.len());
        } else {
            deliver(
                Arc::clone(&self.provider),
                &messages,
                self.max_concurrent_chunks,
                self.push_timeout,
                &mut report,
            )
            .await;
        }

        outcome.report = report;
        self.audit(&alert, &outcome);
        outcome
    }

    fn audit(&self, alert: &Alert, outcome: &DispatchOutcome) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_dispatch(alert, outcome.signal, outcome.persisted, &outcome.report) {
                warn!("Failed to write dispatch audit row: {}", e);
            }
        }
    }
}

/// Bounds a store call with a timeout.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
    }
}
