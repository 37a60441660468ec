//! Ordered cascade mapping free-text strategy labels onto [`SignalKey`]s.
//!
//! Pure and I/O-free: the mobile client links this same module for local
//! history labeling. First match wins, and within a family get-ready checks
//! always precede bare buy/sell checks.

use crate::signals::types::{Alert, Direction, SignalKey};

/// Classify an alert using its strategy label, with the action word and raw
/// message as ancillary text.
pub fn classify_alert(alert: &Alert) -> Option<SignalKey> {
    classify(&alert.strategy, Some(&alert.ancillary_text()))
}

pub fn classify(label: &str, ancillary: Option<&str>) -> Option<SignalKey> {
    let s = normalize_label(label);
    let extra = ancillary.map(|a| a.to_lowercase()).unwrap_or_default();
    let dir = || direction(&s).or_else(|| direction(&extra));

    // 1. Pro4x.2 / Pro4xx
    if s.contains("pro4xx") || s.contains("pro4x.2") || s.contains("pro4x_2") {
        if is_get_ready(&s) {
            return Some(match direction(&s) {
                Some(Direction::Buy) => SignalKey::Pro4xxGetReadyBuy,
                Some(Direction::Sell) => SignalKey::Pro4xxGetReadySell,
                _ => SignalKey::Pro4xxGetReady,
            });
        }
        if s.contains("get") {
            return None;
        }
        return match dir() {
            Some(Direction::Buy) => Some(SignalKey::Pro4xxBuy),
            Some(Direction::Sell) => Some(SignalKey::Pro4xxSell),
            _ => None,
        };
    }

    // 2. Legacy Pro4x
    if s.contains("pro4x") {
        if is_get_ready(&s) {
            return Some(SignalKey::Pro4xGetReady);
        }
        return match dir() {
            Some(Direction::Buy) => Some(SignalKey::Pro4xBuy),
            Some(Direction::Sell) => Some(SignalKey::Pro4xSell),
            _ => None,
        };
    }

    let horus = s.contains("horus");
    if horus && is_get_ready(&s) {
        return Some(SignalKey::HorusGetReady);
    }

    // 3. Horus Advanced, including the legacy "institutional scalping" name
    let advanced = (horus && (s.contains("adv") || s.contains("advanced")))
        || (s.contains("institutional") && s.contains("scalping"));
    if advanced {
        match dir() {
            Some(Direction::Buy) => return Some(SignalKey::HorusAdvBuy),
            Some(Direction::Sell) => return Some(SignalKey::HorusAdvSell),
            _ => {}
        }
    }

    // 4. Delimited entry format (`ENTRY|SELL|LEVEL=...`) carried in the raw text
    if extra.contains("level=") && extra.contains("entry") {
        match direction(&extra) {
            Some(Direction::Buy) => return Some(SignalKey::HorusAdvBuy),
            Some(Direction::Sell) => return Some(SignalKey::HorusAdvSell),
            _ => {}
        }
    }

    // 5. Horus
    if horus {
        match dir() {
            Some(Direction::Buy) => return Some(SignalKey::HorusBuy),
            Some(Direction::Sell) => return Some(SignalKey::HorusSell),
            _ => {}
        }
    }

    // 6. Shadow, tolerating the "shadoow" spelling
    if s.contains("shadow") || s.contains("shadoow") {
        return Some(match dir() {
            Some(Direction::Buy) => SignalKey::ShadowBuy,
            Some(Direction::Sell) => SignalKey::ShadowSell,
            _ => SignalKey::ShadowMode,
        });
    }

    // 7. Scalp
    if s.contains("oversold") {
        return Some(SignalKey::ScalpOverSold);
    }
    if s.contains("overbought") {
        return Some(SignalKey::ScalpOverBought);
    }
    if s.contains("pump") {
        return Some(SignalKey::ScalpTakeProfitPump);
    }
    if s.contains("push") {
        return Some(SignalKey::ScalpTakeProfitPush);
    }

    if s.contains("info") && s.contains("support") {
        match dir() {
            Some(Direction::Buy) => return Some(SignalKey::InfoSupportBuy),
            Some(Direction::Sell) => return Some(SignalKey::InfoSupportSell),
            _ => {}
        }
    }

    // 8. Syncro
    if s.contains("syncro") {
        if s.contains("resistance") || s.contains("sell_res") {
            return Some(SignalKey::ScalpSyncroResSell);
        }
        if s.contains("support") || s.contains("buy_res") {
            return Some(SignalKey::ScalpSyncroResBuy);
        }
        if s.contains("m1") {
            if s.contains("bullish") || s.contains("buy") {
                return Some(SignalKey::M1SyncroBullish);
            }
            if s.contains("bearish") || s.contains("sell") {
                return Some(SignalKey::M1SyncroBearish);
            }
        }
    }

    // 9. H1
    if s.contains("h1") {
        if s.contains("bull") {
            return Some(SignalKey::H1SyncroBullish);
        }
        if s.contains("bear") {
            return Some(SignalKey::H1SyncroBearish);
        }
    }

    // 10. Bare direction words fall back to legacy Pro4x
    if s.contains("buy") {
        return Some(SignalKey::Pro4xBuy);
    }
    if s.contains("sell") {
        return Some(SignalKey::Pro4xSell);
    }

    None
}

/// Trim, lowercase and collapse whitespace runs to `_`.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn is_get_ready(normalized: &str) -> bool {
    normalized.contains("get_ready")
        || normalized.contains("getready")
        || normalized.contains("get-ready")
}

fn direction(text: &str) -> Option<Direction> {
    if text.contains("buy") {
        Some(Direction::Buy)
    } else if text.contains("sell") {
        Some(Direction::Sell)
    } else {
        None
    }
}
