use serde::{Deserialize, Serialize};

use crate::config::PresentationConfig;
use crate::signals::classifier::{is_get_ready, normalize_label};
use crate::signals::types::{
    record_type, Alert, ClassifiedSignal, Direction, Family, SignalData, SignalKey,
};

pub const LOCKED: &str = "LOCKED";

pub const COLOR_BULLISH: &str = "#00C853";
pub const COLOR_BEARISH: &str = "#FF1744";
pub const COLOR_GET_READY: &str = "#FFD700";
pub const COLOR_NEUTRAL: &str = "#2196F3";

const ICON_DEFAULT: &str = "🔔";
const ICON_PRO4X: &str = "⚡";
const ICON_HORUS: &str = "🦅";
const ICON_SHADOW: &str = "🌑";
const ICON_SCALP: &str = "🎯";
const ICON_MONEY: &str = "💰";

/// Recipient entitlement as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub is_pro: bool,
}

impl Entitlement {
    pub const PRO: Entitlement = Entitlement { is_pro: true };
    pub const FREE: Entitlement = Entitlement { is_pro: false };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPayload {
    pub signal: Option<SignalKey>,
    pub strategy: String,
    pub ticker: String,
    pub timeframe: String,
    pub price: String,
    pub message: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub color: String,
    pub video_url: Option<String>,
    pub locked: bool,
}

pub struct Enricher {
    config: PresentationConfig,
}

impl Enricher {
    pub fn new(config: PresentationConfig) -> Self {
        Self { config }
    }

    /// Presentation for the given alert and recipient entitlement.
    pub fn enrich(
        &self,
        alert: &Alert,
        key: Option<SignalKey>,
        entitlement: Entitlement,
    ) -> DisplayPayload {
        self.apply_entitlement(self.display(alert, key), entitlement)
    }

    /// Full-detail presentation, independent of any recipient.
    pub fn display(&self, alert: &Alert, key: Option<SignalKey>) -> DisplayPayload {
        let label = normalize_label(&alert.strategy);
        let (title, body) = copy_for(alert, key);

        DisplayPayload {
            signal: key,
            strategy: alert.strategy.clone(),
            ticker: alert.ticker.clone(),
            timeframe: alert.timeframe.clone(),
            price: alert.price.clone(),
            message: alert.raw_message.clone().unwrap_or_else(|| body.clone()),
            title: scrub_signal_word(&title),
            body: scrub_signal_word(&body),
            icon: icon_for(&label, key).to_string(),
            color: color_for(alert, &label, key).to_string(),
            video_url: self.video_for(key),
            locked: false,
        }
    }

    /// Masks detail for free recipients unless the family is always free.
    pub fn apply_entitlement(
        &self,
        mut payload: DisplayPayload,
        entitlement: Entitlement,
    ) -> DisplayPayload {
        if entitlement.is_pro || is_always_free(&payload) {
            return payload;
        }

        payload.title = self.config.upsell_title.clone();
        payload.body = self.config.upsell_body.clone();
        payload.price = LOCKED.to_string();
        payload.message = LOCKED.to_string();
        payload.video_url = None;
        payload.locked = true;
        payload
    }

    /// Persisted record for the alert. Always carries full detail.
    pub fn record(&self, alert: &Alert, key: Option<SignalKey>) -> ClassifiedSignal {
        let display = self.display(alert, key);
        ClassifiedSignal {
            id: None,
            pair: alert.ticker.clone(),
            signal_type: record_type(key, alert),
            price: alert.price_value().unwrap_or(0.0),
            timestamp: alert.received_at,
            data: SignalData {
                strategy: display.strategy,
                ticker: display.ticker,
                price: display.price,
                timeframe: display.timeframe,
                signal: key,
                message: alert.raw_message.clone(),
                title: display.title,
                icon: display.icon,
                color: display.color,
                video_url: display.video_url,
            },
        }
    }

    fn video_for(&self, key: Option<SignalKey>) -> Option<String> {
        match key {
            Some(SignalKey::Pro4xBuy) | Some(SignalKey::Pro4xxBuy) => {
                self.config.pro4x_buy_video_url.clone()
            }
            _ => None,
        }
    }
}

/// Volatility and regime studies are never masked, whatever key they classify to.
fn is_always_free(payload: &DisplayPayload) -> bool {
    let label = normalize_label(&payload.strategy);
    label.starts_with("vol_") || label.contains("regime")
}

/// Later layers override earlier ones.
fn icon_for(label: &str, key: Option<SignalKey>) -> &'static str {
    let family = key.map(|k| k.family());
    let mut icon = ICON_DEFAULT;
    if label.contains("pro4x") || matches!(family, Some(Family::Pro4x | Family::Pro4xx)) {
        icon = ICON_PRO4X;
    }
    if label.contains("horus") || family == Some(Family::Horus) {
        icon = ICON_HORUS;
    }
    if label.contains("shadow") || label.contains("shadoow") || family == Some(Family::Shadow) {
        icon = ICON_SHADOW;
    }
    if label.contains("scalp") || family == Some(Family::Scalp) {
        icon = ICON_SCALP;
    }
    if label.contains("money") {
        icon = ICON_MONEY;
    }
    icon
}

/// Action word first, then the label. Get-ready and setup-forming alerts go
/// gold regardless of direction.
fn color_for(alert: &Alert, label: &str, key: Option<SignalKey>) -> &'static str {
    if key.is_some_and(|k| k.is_get_ready())
        || is_get_ready(label)
        || label.contains("setup_forming")
    {
        return COLOR_GET_READY;
    }

    let action = alert.action.to_lowercase();
    for text in [action.as_str(), label] {
        if is_bullish(text) {
            return COLOR_BULLISH;
        }
        if is_bearish(text) {
            return COLOR_BEARISH;
        }
    }

    match key.map(|k| k.direction()) {
        Some(Direction::Buy) => COLOR_BULLISH,
        Some(Direction::Sell) => COLOR_BEARISH,
        _ => COLOR_NEUTRAL,
    }
}

fn is_bullish(text: &str) -> bool {
    text.contains("buy") || text.contains("bull") || text.contains("long")
}

fn is_bearish(text: &str) -> bool {
    text.contains("sell") || text.contains("bear") || text.contains("short")
}

fn side_word(key: SignalKey) -> &'static str {
    match key.direction() {
        Direction::Buy => "Buy",
        Direction::Sell => "Sell",
        Direction::Neutral => "Watch",
    }
}

/// Family copy. Specific keys first, generic template last.
fn copy_for(alert: &Alert, key: Option<SignalKey>) -> (String, String) {
    let ticker = &alert.ticker;
    let price = &alert.price;
    let tf = &alert.timeframe;

    let Some(key) = key else {
        return (
            format!("{} • {}", alert.strategy, ticker),
            format!("{} alert on {} at {} ({})", alert.action.to_uppercase(), ticker, price, tf),
        );
    };

    use SignalKey::*;
    match key {
        Pro4xxGetReady | Pro4xxGetReadyBuy | Pro4xxGetReadySell | Pro4xGetReady
        | HorusGetReady => {
            let lean = match key.direction() {
                Direction::Neutral => String::new(),
                _ => format!(" with a {} bias", side_word(key).to_lowercase()),
            };
            (
                format!("Get Ready • {}", ticker),
                format!("Setup forming on {} ({}){}. Wait for confirmation.", ticker, tf, lean),
            )
        }
        Pro4xxBuy | Pro4xxSell => (
            format!("Pro4x.2 {} Setup • {}", side_word(key), ticker),
            format!(
                "Institutional {} structure confirmed on {} at {} ({}).",
                side_word(key).to_lowercase(),
                ticker,
                price,
                tf
            ),
        ),
        Pro4xBuy | Pro4xSell => (
            format!("Pro4x {} Setup • {}", side_word(key), ticker),
            format!("{} setup confirmed on {} at {} ({}).", side_word(key), ticker, price, tf),
        ),
        HorusAdvBuy | HorusAdvSell => (
            format!("Horus Advanced {} Entry • {}", side_word(key), ticker),
            format!(
                "Institutional flow aligned for a {} entry on {} near {}.",
                side_word(key).to_lowercase(),
                ticker,
                price
            ),
        ),
        HorusBuy | HorusSell => (
            format!("Horus {} Alignment • {}", side_word(key), ticker),
            format!("{} alignment on {} at {} ({}).", side_word(key), ticker, price, tf),
        ),
        ScalpOverSold => (
            format!("Oversold Zone • {}", ticker),
            format!("{} is stretched to the downside at {}. Watch for a bounce.", ticker, price),
        ),
        ScalpOverBought => (
            format!("Overbought Zone • {}", ticker),
            format!("{} is stretched to the upside at {}. Watch for a pullback.", ticker, price),
        ),
        ScalpTakeProfitPump => (
            format!("Take Profit • {}", ticker),
            format!("Pump extension reached on {} at {}. Consider securing gains.", ticker, price),
        ),
        ScalpTakeProfitPush => (
            format!("Take Profit • {}", ticker),
            format!("Push extension reached on {} at {}. Consider securing gains.", ticker, price),
        ),
        ScalpSyncroResBuy => (
            format!("Syncro Support • {}", ticker),
            format!("{} is holding synchronized support near {}.", ticker, price),
        ),
        ScalpSyncroResSell => (
            format!("Syncro Resistance • {}", ticker),
            format!("{} is rejecting synchronized resistance near {}.", ticker, price),
        ),
        ShadowBuy | ShadowSell => (
            format!("Shadow Mode {} • {}", side_word(key), ticker),
            format!("Shadow {} setup on {} at {} ({}).", side_word(key).to_lowercase(), ticker, price, tf),
        ),
        ShadowMode => (
            format!("Shadow Mode • {}", ticker),
            format!("Shadow activity detected on {} ({}).", ticker, tf),
        ),
        H1SyncroBullish | H1SyncroBearish | M1SyncroBullish | M1SyncroBearish => {
            let frame = if key.family() == Family::H1 { "H1" } else { "M1" };
            let bias = if key.direction() == Direction::Buy {
                "Bullish"
            } else {
                "Bearish"
            };
            (
                format!("{} {} Alignment • {}", frame, bias, ticker),
                format!("{} timeframes synchronized {} on {} at {}.", frame, bias.to_lowercase(), ticker, price),
            )
        }
        InfoSupportBuy | InfoSupportSell => (
            format!("Support Zone {} • {}", side_word(key), ticker),
            format!("{} is trading into a key support zone near {}.", ticker, price),
        ),
    }
}

/// Product copy never says "signal".
fn scrub_signal_word(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    if !lower.contains("signal") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.to_ascii_lowercase().find("signal") {
        out.push_str(&rest[..pos]);
        out.push_str("Setup");
        rest = &rest[pos + "signal".len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::classifier::classify_alert;
    use chrono::Utc;

    fn enricher() -> Enricher {
        Enricher::new(PresentationConfig {
            pro4x_buy_video_url: Some("https://cdn.example.com/pro4x-buy.mp4".to_string()),
            ..PresentationConfig::default()
        })
    }

    fn alert(strategy: &str, action: &str) -> Alert {
        Alert {
            strategy: strategy.to_string(),
            ticker: "NQ".to_string(),
            price: "20650".to_string(),
            timeframe: "M5".to_string(),
            action: action.to_string(),
            raw_message: Some("Structure confirmed".to_string()),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_enrich_is_pure() {
        let e = enricher();
        let a = alert("Horus Adv Buy", "buy");
        let key = classify_alert(&a);
        assert_eq!(e.enrich(&a, key, Entitlement::FREE), e.enrich(&a, key, Entitlement::FREE));
        assert_eq!(e.enrich(&a, key, Entitlement::PRO), e.enrich(&a, key, Entitlement::PRO));
    }

    #[test]
    fn test_free_recipient_is_masked() {
        let e = enricher();
        let a = alert("Pro4x Buy", "buy");
        let masked = e.enrich(&a, Some(SignalKey::Pro4xBuy), Entitlement::FREE);
        assert_eq!(masked.price, LOCKED);
        assert_eq!(masked.message, LOCKED);
        assert!(masked.locked);
        assert_eq!(masked.video_url, None);
        assert_eq!(masked.ticker, "NQ");

        let full = e.enrich(&a, Some(SignalKey::Pro4xBuy), Entitlement::PRO);
        assert_eq!(full.price, "20650");
        assert_eq!(full.message, "Structure confirmed");
        assert!(!full.locked);
    }

    #[test]
    fn test_allowlisted_family_is_never_masked() {
        let e = enricher();
        let a = alert("Vol_Regime Shift", "alert");
        let payload = e.enrich(&a, None, Entitlement::FREE);
        assert!(!payload.locked);
        assert_eq!(payload.price, "20650");

        let a = alert("Market Regime Change", "alert");
        assert!(!e.enrich(&a, None, Entitlement::FREE).locked);
    }

    #[test]
    fn test_allowlist_applies_to_classified_labels() {
        let e = enricher();
        for strategy in ["Vol_Regime Buy", "Regime Change Sell"] {
            let a = alert(strategy, "alert");
            let key = classify_alert(&a);
            assert!(key.is_some(), "{}", strategy);
            let payload = e.enrich(&a, key, Entitlement::FREE);
            assert!(!payload.locked, "{}", strategy);
            assert_eq!(payload.price, "20650");
        }
    }

    #[test]
    fn test_action_word_drives_color() {
        let e = enricher();
        let a = alert("Pro4x.2", "sell");
        let key = classify_alert(&a);
        assert_eq!(e.display(&a, key).color, COLOR_BEARISH);
        let a = alert("Horus Buy", "alert");
        assert_eq!(e.display(&a, Some(SignalKey::HorusBuy)).color, COLOR_BULLISH);
        let a = alert("Unknown Strategy", "alert");
        assert_eq!(e.display(&a, None).color, COLOR_NEUTRAL);
    }

    #[test]
    fn test_get_ready_is_gold_even_with_direction() {
        let e = enricher();
        let a = alert("Pro4xx Get Ready Buy", "buy");
        let payload = e.display(&a, Some(SignalKey::Pro4xxGetReadyBuy));
        assert_eq!(payload.color, COLOR_GET_READY);
        assert!(payload.title.starts_with("Get Ready"));
    }

    #[test]
    fn test_icon_layers() {
        assert_eq!(icon_for("pro4x_buy", Some(SignalKey::Pro4xBuy)), ICON_PRO4X);
        assert_eq!(icon_for("horus_sell", Some(SignalKey::HorusSell)), ICON_HORUS);
        assert_eq!(icon_for("shadow_mode", Some(SignalKey::ShadowMode)), ICON_SHADOW);
        assert_eq!(icon_for("scalp_oversold", Some(SignalKey::ScalpOverSold)), ICON_SCALP);
        assert_eq!(icon_for("pro4x_money_buy", Some(SignalKey::Pro4xBuy)), ICON_MONEY);
        assert_eq!(icon_for("unknown_strategy", None), ICON_DEFAULT);
    }

    #[test]
    fn test_video_only_for_pro4x_buys() {
        let e = enricher();
        let a = alert("Pro4x Buy", "buy");
        assert!(e.display(&a, Some(SignalKey::Pro4xBuy)).video_url.is_some());
        assert!(e.display(&a, Some(SignalKey::Pro4xxBuy)).video_url.is_some());
        assert!(e.display(&a, Some(SignalKey::Pro4xSell)).video_url.is_none());
        assert!(e.display(&a, Some(SignalKey::HorusBuy)).video_url.is_none());
    }

    #[test]
    fn test_copy_never_says_signal() {
        let e = enricher();
        let a = alert("Super Signal", "Signal");
        let payload = e.display(&a, None);
        assert!(!payload.title.to_lowercase().contains("signal"));
        assert!(!payload.body.to_lowercase().contains("signal"));
        assert_eq!(payload.title, "Super Setup • NQ");
        for key in SignalKey::ALL {
            let payload = e.display(&a, Some(key));
            assert!(!payload.title.to_lowercase().contains("signal"), "{}", key);
            assert!(!payload.body.to_lowercase().contains("signal"), "{}", key);
        }
    }

    #[test]
    fn test_record_keeps_full_detail() {
        let e = enricher();
        let a = alert("Pro4x Buy", "buy");
        let record = e.record(&a, Some(SignalKey::Pro4xBuy));
        assert_eq!(record.pair, "NQ");
        assert_eq!(record.signal_type, "BUY");
        assert_eq!(record.price, 20650.0);
        assert_eq!(record.data.signal, Some(SignalKey::Pro4xBuy));
        assert_eq!(record.data.message.as_deref(), Some("Structure confirmed"));
        assert_eq!(record.timestamp, a.received_at);
    }
}
