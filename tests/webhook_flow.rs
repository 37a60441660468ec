use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use signal_relay::config::Config;
use signal_relay::delivery::fake::FakePushProvider;
use signal_relay::delivery::types::{Recipient, RecipientSettings};
use signal_relay::pipeline::Pipeline;
use signal_relay::server::{signals, webhook, AppState, HistoryQuery};
use signal_relay::signals::enricher::{COLOR_BEARISH, LOCKED};
use signal_relay::storage::memory::MemoryStore;
use signal_relay::storage::persistence::SignalStore;

struct Harness {
    state: AppState,
    store: Arc<MemoryStore>,
    provider: FakePushProvider,
}

fn harness_with(config: Config, provider: FakePushProvider) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(&config, store.clone(), Arc::new(provider.clone()), None).unwrap();
    Harness {
        state: AppState::new(pipeline, &config.storage),
        store,
        provider,
    }
}

fn harness() -> Harness {
    harness_with(Config::default(), FakePushProvider::default())
}

async fn register(store: &MemoryStore, token: &str, is_pro: bool) {
    let recipient = Recipient {
        token: token.to_string(),
        settings: RecipientSettings {
            is_pro,
            ..RecipientSettings::default()
        },
    };
    store.upsert_recipient(&recipient).await.unwrap();
}

async fn post(h: &Harness, body: &str) -> serde_json::Value {
    let (status, Json(value)) = webhook(State(h.state.clone()), Bytes::from(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    value
}

async fn latest(h: &Harness) -> serde_json::Value {
    let (_, Json(rows)) = signals(State(h.state.clone()), Query(HistoryQuery { limit: Some(1) })).await;
    rows[0].clone()
}

#[tokio::test]
async fn pro4x_buy_is_persisted_with_buy_type() {
    let h = harness();
    let response = post(&h, r#"{"strategy":"Pro4x Buy","ticker":"NQ","price":20650}"#).await;
    assert_eq!(response["status"], "success");
    assert_eq!(response["signal"], "pro4x_Buy");

    let row = latest(&h).await;
    assert_eq!(row["pair"], "NQ");
    assert_eq!(row["type"], "BUY");
    assert_eq!(row["price"], 20650.0);
    assert_eq!(row["data"]["signal"], "pro4x_Buy");
}

#[tokio::test]
async fn horus_get_ready_is_not_a_direction() {
    let h = harness();
    let response = post(&h, r#"{"strategy":"Horus Get Ready","ticker":"NQ-TEST-GR"}"#).await;
    assert_eq!(response["signal"], "horus_GetReady");

    let row = latest(&h).await;
    assert_eq!(row["pair"], "NQ-TEST-GR");
}

#[tokio::test]
async fn delimited_text_falls_back_to_extraction() {
    let h = harness();
    let response = post(&h, "ENTRY|SELL|LEVEL=20500.50|POWER=85").await;
    assert_eq!(response["persisted"], true);

    let row = latest(&h).await;
    assert_eq!(row["type"], "SELL");
    assert_eq!(row["price"], 20500.5);
    assert_eq!(row["data"]["strategy"], "Unknown Strategy");
}

#[tokio::test]
async fn action_word_drives_color_without_direction_in_label() {
    let h = harness();
    register(&h.store, "ExponentPushToken[pro]", true).await;

    let response = post(
        &h,
        r#"{"strategy":"Pro4x.2","action":"sell","message":"Bearish Structural Alignment"}"#,
    )
    .await;
    assert_eq!(response["signal"], "pro4xx_Sell");

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data["color"], COLOR_BEARISH);
    assert_eq!(latest(&h).await["data"]["color"], COLOR_BEARISH);
}

#[tokio::test]
async fn free_recipients_receive_masked_payload() {
    let h = harness();
    register(&h.store, "ExponentPushToken[pro]", true).await;
    register(&h.store, "ExponentPushToken[free]", false).await;

    post(
        &h,
        r#"{"strategy":"Horus Sell","ticker":"ES","price":"5,210.25","message":"Below VWAP"}"#,
    )
    .await;

    let sent = h.provider.sent();
    let pro = sent.iter().find(|m| m.to.ends_with("[pro]")).unwrap();
    let free = sent.iter().find(|m| m.to.ends_with("[free]")).unwrap();
    assert_eq!(pro.data["price"], "5,210.25");
    assert_eq!(pro.data["message"], "Below VWAP");
    assert_eq!(free.data["price"], LOCKED);
    assert_eq!(free.data["message"], LOCKED);
    assert_ne!(pro.title, free.title);

    // the stored record is never masked
    let row = latest(&h).await;
    assert_eq!(row["price"], 5210.25);
}

#[tokio::test]
async fn fanout_skips_and_chunk_failures_are_reported() {
    let provider = FakePushProvider::new(2);
    provider.fail_chunk(0);
    let h = harness_with(Config::default(), provider);

    register(&h.store, "not-a-push-token", true).await;
    for i in 0..4 {
        register(&h.store, &format!("ExponentPushToken[{}]", i), true).await;
    }
    let mut muted = RecipientSettings::default();
    muted.notifications_enabled = false;
    h.store
        .upsert_recipient(&Recipient {
            token: "ExponentPushToken[muted]".to_string(),
            settings: muted,
        })
        .await
        .unwrap();

    let response = post(&h, r#"{"strategy":"Shadow Buy","ticker":"CL"}"#).await;
    assert_eq!(response["signal"], "shadow_Buy");
    assert_eq!(response["queued"], 4);
    assert_eq!(response["skipped"], 2);
    assert_eq!(response["chunksFailed"], 1);
    assert_eq!(h.provider.calls(), 2);
    assert_eq!(h.provider.sent().len(), 2);
}

#[tokio::test]
async fn unclassified_alert_is_still_recorded() {
    let h = harness();
    register(&h.store, "ExponentPushToken[a]", true).await;

    let response = post(&h, r#"{"strategy":"Mystery Indicator","ticker":"BTC","action":"alert"}"#).await;
    assert_eq!(response["status"], "unclassified");
    assert!(response["signal"].is_null());
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.provider.sent().len(), 1);
}

#[tokio::test]
async fn dry_run_builds_but_does_not_send() {
    let mut config = Config::default();
    config.system.dry_run = true;
    let h = harness_with(config, FakePushProvider::default());
    register(&h.store, "ExponentPushToken[a]", true).await;

    let response = post(&h, r#"{"strategy":"Horus Buy","ticker":"NQ"}"#).await;
    assert_eq!(response["queued"], 1);
    assert_eq!(h.provider.calls(), 0);
}
