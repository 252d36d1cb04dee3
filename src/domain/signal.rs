use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Direction of the signalled move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "LONG", alias = "buy", alias = "BUY")]
    Long,
    #[serde(alias = "SHORT", alias = "sell", alias = "SELL")]
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inbound signal as delivered by the external ingester.
///
/// Every field is required and unknown fields are rejected, so a payload
/// that drifted from the schema fails here instead of defaulting later.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSignal {
    pub symbol: String,
    pub strategy: String,
    pub direction: Direction,
    pub price: Decimal,
    pub delta_pct: f64,
    pub buys_per_sec: f64,
    pub vol_raise_pct: f64,
    pub volume_24h: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_signal: String,
}

/// Validated pump/drop signal. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    pub symbol: String,
    pub strategy: String,
    pub direction: Direction,
    pub price: Decimal,
    pub delta_pct: f64,
    pub buys_per_sec: f64,
    pub vol_raise_pct: f64,
    pub volume_24h: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_signal: String,
}

impl MarketSignal {
    /// Parse and validate a JSON payload in the inbound schema
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        let raw: RawSignal = serde_json::from_str(text)?;
        Ok(Self::try_from(raw)?)
    }

    /// Strategy tag reduced to lowercase alphanumerics
    pub fn strategy_key(&self) -> String {
        normalize_tag(&self.strategy)
    }

    /// Provenance text reduced to lowercase alphanumerics
    pub fn provenance_key(&self) -> String {
        normalize_tag(&self.raw_signal)
    }
}

impl TryFrom<RawSignal> for MarketSignal {
    type Error = SignalError;

    fn try_from(raw: RawSignal) -> Result<Self, Self::Error> {
        let symbol = raw.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(SignalError::MissingField("symbol"));
        }
        if raw.strategy.trim().is_empty() {
            return Err(SignalError::MissingField("strategy"));
        }
        if raw.price <= Decimal::ZERO {
            return Err(SignalError::NonPositivePrice(raw.price.to_string()));
        }

        for (field, value) in [
            ("delta_pct", raw.delta_pct),
            ("buys_per_sec", raw.buys_per_sec),
            ("vol_raise_pct", raw.vol_raise_pct),
            ("volume_24h", raw.volume_24h),
        ] {
            if !value.is_finite() {
                return Err(SignalError::NotFinite { field });
            }
        }
        for (field, value) in [
            ("buys_per_sec", raw.buys_per_sec),
            ("volume_24h", raw.volume_24h),
        ] {
            if value < 0.0 {
                return Err(SignalError::Negative { field, value });
            }
        }

        Ok(Self {
            symbol,
            strategy: raw.strategy.trim().to_string(),
            direction: raw.direction,
            price: raw.price,
            delta_pct: raw.delta_pct,
            buys_per_sec: raw.buys_per_sec,
            vol_raise_pct: raw.vol_raise_pct,
            volume_24h: raw.volume_24h,
            timestamp: raw.timestamp,
            raw_signal: raw.raw_signal,
        })
    }
}

/// Lowercase and strip everything but ASCII alphanumerics
/// ("Drops Detection" and "drops_detection" both become "dropsdetection").
pub fn normalize_tag(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "symbol": "pepeusdt",
            "strategy": "TopMarket",
            "direction": "long",
            "price": "0.0000123",
            "delta_pct": 17.31,
            "buys_per_sec": 33.0,
            "vol_raise_pct": 150.0,
            "volume_24h": 5_400_000.0,
            "timestamp": "2026-10-19T12:00:00Z",
            "raw_signal": "TopMarket: PEPE +17.31%"
        })
    }

    #[test]
    fn test_parse_valid_signal() {
        let signal = MarketSignal::from_json(&payload().to_string()).unwrap();
        assert_eq!(signal.symbol, "PEPEUSDT");
        assert_eq!(signal.price, dec!(0.0000123));
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.strategy_key(), "topmarket");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut value = payload();
        value["leverage"] = serde_json::json!(10);
        assert!(MarketSignal::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("volume_24h");
        assert!(MarketSignal::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let mut value = payload();
        value["price"] = serde_json::json!("0");
        let err = MarketSignal::from_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("Non-positive price"));
    }

    #[test]
    fn test_direction_aliases() {
        let mut value = payload();
        value["direction"] = serde_json::json!("SELL");
        let signal = MarketSignal::from_json(&value.to_string()).unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("Drops Detection"), "dropsdetection");
        assert_eq!(normalize_tag("buys_per_sec"), "buyspersec");
    }
}
