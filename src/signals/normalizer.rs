use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::signals::types::{
    Alert, DEFAULT_ACTION, DEFAULT_PRICE, DEFAULT_TIMEFRAME, UNKNOWN_STRATEGY, UNKNOWN_TICKER,
};

/// Inbound body after shape detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(Map<String, Value>),
    Text(String),
}

/// Lookup rule for one canonical field of a key/value mapping.
struct FieldLookup {
    exact: &'static [&'static str],
    /// Substring needles tried in priority order when no exact key exists.
    near: &'static [&'static str],
}

const STRATEGY: FieldLookup = FieldLookup {
    exact: &["strategy"],
    near: &["strat", "alert", "name", "type"],
};
const TICKER: FieldLookup = FieldLookup {
    exact: &["ticker", "symbol"],
    near: &["pair", "sym", "coin", "asset"],
};
const PRICE: FieldLookup = FieldLookup {
    exact: &["price", "close", "level"],
    near: &[],
};
const TIMEFRAME: FieldLookup = FieldLookup {
    exact: &["timeframe", "interval", "tf"],
    near: &[],
};
const ACTION: FieldLookup = FieldLookup {
    exact: &["action", "signal", "side"],
    near: &[],
};
const MESSAGE: FieldLookup = FieldLookup {
    exact: &["message", "msg", "text"],
    near: &[],
};

/// Turns arbitrary webhook bodies into [`Alert`]s. Never fails once built.
pub struct Normalizer {
    strategy_re: Regex,
    ticker_re: Regex,
    price_re: Regex,
    action_re: Regex,
    bare_action_re: Regex,
    timeframe_re: Regex,
    form_key_re: Regex,
}

impl Normalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            strategy_re: Regex::new(r"(?i)\bstrategy\s*[:=]\s*([^\r\n|]+)")?,
            ticker_re: Regex::new(r"(?i)\b(?:ticker|symbol)\s*[:=]\s*([^\s|&;,]+)")?,
            price_re: Regex::new(r"(?i)\b(?:price|level)\s*[:=]\s*\$?([0-9][0-9,]*(?:\.[0-9]+)?)")?,
            action_re: Regex::new(r"(?i)\b(?:action|signal)\s*[:=]\s*([^\r\n|&;,]+)")?,
            bare_action_re: Regex::new(r"(?i)\b(buy|sell)\b")?,
            timeframe_re: Regex::new(r"(?i)\b(?:timeframe|tf|interval)\s*[:=]\s*([^\s|&;,]+)")?,
            form_key_re: Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-\[\]]*$")?,
        })
    }

    /// Detects the body shape: JSON object, form-encoded pairs, or free text.
    pub fn parse_body(&self, raw: &str) -> Payload {
        let trimmed = raw.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => return Payload::Fields(map),
            Ok(Value::String(inner)) => return self.parse_body(&inner),
            _ => {}
        }
        match self.parse_form(trimmed) {
            Some(map) => Payload::Fields(map),
            None => Payload::Text(raw.to_string()),
        }
    }

    pub fn normalize(&self, payload: &Payload, received_at: DateTime<Utc>) -> Alert {
        match payload {
            Payload::Fields(map) => self.from_fields(map, received_at),
            Payload::Text(text) => self.from_text(text, received_at),
        }
    }

    /// Convenience for the webhook path: shape detection plus normalization.
    pub fn normalize_body(&self, raw: &str, received_at: DateTime<Utc>) -> Alert {
        self.normalize(&self.parse_body(raw), received_at)
    }

    fn from_fields(&self, map: &Map<String, Value>, received_at: DateTime<Utc>) -> Alert {
        Alert {
            strategy: lookup(map, &STRATEGY).unwrap_or_else(|| UNKNOWN_STRATEGY.to_string()),
            ticker: lookup(map, &TICKER).unwrap_or_else(|| UNKNOWN_TICKER.to_string()),
            price: lookup(map, &PRICE).unwrap_or_else(|| DEFAULT_PRICE.to_string()),
            timeframe: lookup(map, &TIMEFRAME).unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
            action: lookup(map, &ACTION).unwrap_or_else(|| DEFAULT_ACTION.to_string()),
            raw_message: lookup(map, &MESSAGE),
            received_at,
        }
    }

    fn from_text(&self, text: &str, received_at: DateTime<Utc>) -> Alert {
        let action = capture(&self.action_re, text)
            .or_else(|| capture(&self.bare_action_re, text))
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());

        Alert {
            strategy: capture(&self.strategy_re, text)
                .unwrap_or_else(|| UNKNOWN_STRATEGY.to_string()),
            ticker: capture(&self.ticker_re, text).unwrap_or_else(|| UNKNOWN_TICKER.to_string()),
            price: capture(&self.price_re, text)
                .map(|p| p.replace(',', ""))
                .unwrap_or_else(|| DEFAULT_PRICE.to_string()),
            timeframe: capture(&self.timeframe_re, text)
                .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
            action,
            raw_message: Some(text.to_string()).filter(|t| !t.trim().is_empty()),
            received_at,
        }
    }

    /// `k=v&k=v` on a single line with identifier-like keys.
    fn parse_form(&self, text: &str) -> Option<Map<String, Value>> {
        if text.is_empty() || text.contains('\n') || !text.contains('=') {
            return None;
        }

        let mut map = Map::new();
        for pair in text.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=')?;
            if !self.form_key_re.is_match(key) {
                return None;
            }
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            map.insert(key.to_string(), Value::String(value));
        }

        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// JSON value as a field string. Containers, null and empty strings are absent.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Exact key, then case-insensitive key, then near-name substrings.
///
/// The near-name pass walks `near` in priority order and, for each needle,
/// takes the first matching key in sorted key order, so the result never
/// depends on how the sender ordered its JSON object.
fn lookup(map: &Map<String, Value>, field: &FieldLookup) -> Option<String> {
    for name in field.exact {
        if let Some(v) = map.get(*name).and_then(value_to_string) {
            return Some(v);
        }
    }

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for name in field.exact {
        let found = keys
            .iter()
            .find(|k| k.eq_ignore_ascii_case(name))
            .and_then(|k| map.get(k.as_str()))
            .and_then(value_to_string);
        if found.is_some() {
            return found;
        }
    }

    for needle in field.near {
        let found = keys
            .iter()
            .filter(|k| k.to_lowercase().contains(needle))
            .find_map(|k| map.get(k.as_str()).and_then(value_to_string));
        if found.is_some() {
            return found;
        }
    }

    None
}
