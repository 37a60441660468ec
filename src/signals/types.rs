use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const UNKNOWN_STRATEGY: &str = "Unknown Strategy";
pub const UNKNOWN_TICKER: &str = "Unknown Ticker";
pub const DEFAULT_PRICE: &str = "0";
pub const DEFAULT_TIMEFRAME: &str = "M1";
pub const DEFAULT_ACTION: &str = "alert";

/// Closed trade-alert taxonomy. Wire names are shared with the mobile client
/// and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKey {
    Pro4xxBuy,
    Pro4xxSell,
    Pro4xxGetReadyBuy,
    Pro4xxGetReadySell,
    Pro4xxGetReady,
    Pro4xBuy,
    Pro4xSell,
    Pro4xGetReady,
    HorusBuy,
    HorusSell,
    HorusGetReady,
    HorusAdvBuy,
    HorusAdvSell,
    ScalpOverSold,
    ScalpOverBought,
    ScalpTakeProfitPump,
    ScalpTakeProfitPush,
    ScalpSyncroResBuy,
    ScalpSyncroResSell,
    ShadowBuy,
    ShadowSell,
    H1SyncroBullish,
    H1SyncroBearish,
    M1SyncroBullish,
    M1SyncroBearish,
    InfoSupportBuy,
    InfoSupportSell,
    /// Direction-less shadow alert. Only used for settings lookups; not part
    /// of the display taxonomy in [`SignalKey::ALL`].
    ShadowMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Pro4xx,
    Pro4x,
    Horus,
    Scalp,
    Shadow,
    H1,
    M1,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

impl SignalKey {
    pub const ALL: [SignalKey; 27] = [
        SignalKey::Pro4xxBuy,
        SignalKey::Pro4xxSell,
        SignalKey::Pro4xxGetReadyBuy,
        SignalKey::Pro4xxGetReadySell,
        SignalKey::Pro4xxGetReady,
        SignalKey::Pro4xBuy,
        SignalKey::Pro4xSell,
        SignalKey::Pro4xGetReady,
        SignalKey::HorusBuy,
        SignalKey::HorusSell,
        SignalKey::HorusGetReady,
        SignalKey::HorusAdvBuy,
        SignalKey::HorusAdvSell,
        SignalKey::ScalpOverSold,
        SignalKey::ScalpOverBought,
        SignalKey::ScalpTakeProfitPump,
        SignalKey::ScalpTakeProfitPush,
        SignalKey::ScalpSyncroResBuy,
        SignalKey::ScalpSyncroResSell,
        SignalKey::ShadowBuy,
        SignalKey::ShadowSell,
        SignalKey::H1SyncroBullish,
        SignalKey::H1SyncroBearish,
        SignalKey::M1SyncroBullish,
        SignalKey::M1SyncroBearish,
        SignalKey::InfoSupportBuy,
        SignalKey::InfoSupportSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKey::Pro4xxBuy => "pro4xx_Buy",
            SignalKey::Pro4xxSell => "pro4xx_Sell",
            SignalKey::Pro4xxGetReadyBuy => "pro4xx_GetReady_Buy",
            SignalKey::Pro4xxGetReadySell => "pro4xx_GetReady_Sell",
            SignalKey::Pro4xxGetReady => "pro4xx_GetReady",
            SignalKey::Pro4xBuy => "pro4x_Buy",
            SignalKey::Pro4xSell => "pro4x_Sell",
            SignalKey::Pro4xGetReady => "pro4x_GetReady",
            SignalKey::HorusBuy => "horus_Buy",
            SignalKey::HorusSell => "horus_Sell",
            SignalKey::HorusGetReady => "horus_GetReady",
            SignalKey::HorusAdvBuy => "horus_Adv_Buy",
            SignalKey::HorusAdvSell => "horus_Adv_Sell",
            SignalKey::ScalpOverSold => "scalp_OverSold",
            SignalKey::ScalpOverBought => "scalp_OverBought",
            SignalKey::ScalpTakeProfitPump => "scalp_TakeProfitPump",
            SignalKey::ScalpTakeProfitPush => "scalp_TakeProfitPush",
            SignalKey::ScalpSyncroResBuy => "scalp_SyncroResBuy",
            SignalKey::ScalpSyncroResSell => "scalp_SyncroResSell",
            SignalKey::ShadowBuy => "shadow_Buy",
            SignalKey::ShadowSell => "shadow_Sell",
            SignalKey::H1SyncroBullish => "h1_SyncroBullish",
            SignalKey::H1SyncroBearish => "h1_SyncroBearish",
            SignalKey::M1SyncroBullish => "m1_SyncroBullish",
            SignalKey::M1SyncroBearish => "m1_SyncroBearish",
            SignalKey::InfoSupportBuy => "info_SupportBuy",
            SignalKey::InfoSupportSell => "info_SupportSell",
            SignalKey::ShadowMode => "shadow_Mode",
        }
    }

    pub fn family(&self) -> Family {
        use SignalKey::*;
        match self {
            Pro4xxBuy | Pro4xxSell | Pro4xxGetReadyBuy | Pro4xxGetReadySell | Pro4xxGetReady => {
                Family::Pro4xx
            }
            Pro4xBuy | Pro4xSell | Pro4xGetReady => Family::Pro4x,
            HorusBuy | HorusSell | HorusGetReady | HorusAdvBuy | HorusAdvSell => Family::Horus,
            ScalpOverSold | ScalpOverBought | ScalpTakeProfitPump | ScalpTakeProfitPush
            | ScalpSyncroResBuy | ScalpSyncroResSell => Family::Scalp,
            ShadowBuy | ShadowSell | ShadowMode => Family::Shadow,
            H1SyncroBullish | H1SyncroBearish => Family::H1,
            M1SyncroBullish | M1SyncroBearish => Family::M1,
            InfoSupportBuy | InfoSupportSell => Family::Info,
        }
    }

    pub fn direction(&self) -> Direction {
        use SignalKey::*;
        match self {
            Pro4xxBuy | Pro4xxGetReadyBuy | Pro4xBuy | HorusBuy | HorusAdvBuy | ScalpOverSold
            | ScalpSyncroResBuy | ShadowBuy | H1SyncroBullish | M1SyncroBullish
            | InfoSupportBuy => Direction::Buy,
            Pro4xxSell | Pro4xxGetReadySell | Pro4xSell | HorusSell | HorusAdvSell
            | ScalpOverBought | ScalpSyncroResSell | ShadowSell | H1SyncroBearish
            | M1SyncroBearish | InfoSupportSell => Direction::Sell,
            Pro4xxGetReady | Pro4xGetReady | HorusGetReady | ScalpTakeProfitPump
            | ScalpTakeProfitPush | ShadowMode => Direction::Neutral,
        }
    }

    /// Pending, pre-confirmation state. Never a firm entry.
    pub fn is_get_ready(&self) -> bool {
        matches!(
            self,
            SignalKey::Pro4xxGetReady
                | SignalKey::Pro4xxGetReadyBuy
                | SignalKey::Pro4xxGetReadySell
                | SignalKey::Pro4xGetReady
                | SignalKey::HorusGetReady
        )
    }

    /// Keys consulted in a recipient's opt-in settings for this alert.
    pub fn settings_keys(&self) -> Vec<SignalKey> {
        match self.family() {
            Family::Shadow if *self != SignalKey::ShadowMode => vec![*self, SignalKey::ShadowMode],
            _ => vec![*self],
        }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal key: {0}")]
pub struct UnknownSignalKey(pub String);

impl FromStr for SignalKey {
    type Err = UnknownSignalKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKey::ALL
            .iter()
            .chain(std::iter::once(&SignalKey::ShadowMode))
            .find(|key| key.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownSignalKey(s.to_string()))
    }
}

impl Serialize for SignalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical inbound alert. Every field is populated after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub strategy: String,
    pub ticker: String,
    pub price: String,
    pub timeframe: String,
    pub action: String,
    pub raw_message: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Alert {
    pub fn price_value(&self) -> Option<f64> {
        self.price
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
    }

    /// Action word plus raw message, used as ancillary classification text.
    pub fn ancillary_text(&self) -> String {
        match &self.raw_message {
            Some(message) => format!("{} {}", self.action, message),
            None => self.action.clone(),
        }
    }

    pub fn action_direction(&self) -> Direction {
        let action = self.action.to_lowercase();
        if action.contains("buy") || action.contains("long") {
            Direction::Buy
        } else if action.contains("sell") || action.contains("short") {
            Direction::Sell
        } else {
            Direction::Neutral
        }
    }
}

/// Persisted, immutable record of one classified alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub pair: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub data: SignalData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalData {
    pub strategy: String,
    pub ticker: String,
    pub price: String,
    pub timeframe: String,
    pub signal: Option<SignalKey>,
    pub message: Option<String>,
    pub title: String,
    pub icon: String,
    pub color: String,
    pub video_url: Option<String>,
}

/// `BUY`/`SELL` from the key's direction, falling back to the action word.
pub fn record_type(key: Option<SignalKey>, alert: &Alert) -> String {
    let direction = match key.map(|k| k.direction()) {
        Some(Direction::Buy) => Direction::Buy,
        Some(Direction::Sell) => Direction::Sell,
        _ => alert.action_direction(),
    };
    match direction {
        Direction::Buy => "BUY".to_string(),
        Direction::Sell => "SELL".to_string(),
        Direction::Neutral => alert.action.to_uppercase(),
    }
}
