use std::collections::HashMap;

use chrono::{Datelike, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::types::OrderSide;
use crate::data::MarketKind;
use crate::error::{CoreError, CoreResult};

const MS_PER_DAY: i64 = 86_400_000;

/// Built-in market-rule registry, overridable by the caller.
const BUILTIN_RULES: &str = include_str!("../../markets.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct MarketRule {
    pub timezone: String,
    #[serde(default)]
    pub always_open: bool,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub days: Vec<u32>,
    pub lot_increment: f64,
    pub settlement_days: i64,
    #[serde(default)]
    pub price_limit_pct: f64,
    #[serde(default)]
    pub st_price_limit_pct: f64,
    pub commission_rate: f64,
    #[serde(default)]
    pub min_commission: f64,
    #[serde(default)]
    pub sell_stamp_rate: f64,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    markets: HashMap<String, MarketRule>,
}

/// Session, lot, settlement, price-limit and fee rules per market.
#[derive(Debug, Clone)]
pub struct MarketRules {
    rules: HashMap<MarketKind, MarketRule>,
}

impl MarketRules {
    /// Parse the registry shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_RULES).expect("built-in markets.toml is valid")
    }

    /// Parse a caller-supplied registry document.
    pub fn from_toml(doc: &str) -> CoreResult<Self> {
        let parsed: RulesFile = toml::from_str(doc)
            .map_err(|e| CoreError::InvalidInput(format!("market rules: {e}")))?;
        let mut rules = HashMap::new();
        for (name, rule) in parsed.markets {
            let kind = match name.as_str() {
                "crypto" => MarketKind::Crypto,
                "us" => MarketKind::Us,
                "cn" => MarketKind::Cn,
                "hk" => MarketKind::Hk,
                other => {
                    return Err(CoreError::InvalidInput(format!(
                        "unknown market in rules file: {other}"
                    )))
                }
            };
            rules.insert(kind, rule);
        }
        Ok(Self { rules })
    }

    pub fn rule(&self, market: MarketKind) -> CoreResult<&MarketRule> {
        self.rules
            .get(&market)
            .ok_or_else(|| CoreError::InvalidInput(format!("no rules for market {market}")))
    }

    /// Whether the market's session is open at `now_ms` (epoch ms).
    pub fn is_open(&self, market: MarketKind, now_ms: i64) -> CoreResult<bool> {
        let rule = self.rule(market)?;
        if rule.always_open {
            return Ok(true);
        }
        let tz: Tz = rule
            .timezone
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("bad timezone: {}", rule.timezone)))?;
        let Some(utc) = Utc.timestamp_millis_opt(now_ms).single() else {
            return Ok(false);
        };
        let local = utc.with_timezone(&tz);

        let weekday = local.weekday().number_from_monday();
        if !rule.days.contains(&weekday) {
            return Ok(false);
        }

        let (Some(open), Some(close)) = (parse_hhmm(rule.open.as_deref()), parse_hhmm(rule.close.as_deref()))
        else {
            return Ok(false);
        };
        let t = local.time();
        let now_min = t.hour() * 60 + t.minute();
        let open_min = open.hour() * 60 + open.minute();
        let close_min = close.hour() * 60 + close.minute();
        Ok(now_min >= open_min && now_min < close_min)
    }

    /// Whether `quantity` is a valid multiple of the market's lot
    /// increment. Markets with increment 0 accept any positive quantity.
    pub fn lot_valid(&self, market: MarketKind, quantity: f64) -> CoreResult<bool> {
        let rule = self.rule(market)?;
        if quantity <= 0.0 {
            return Ok(false);
        }
        if rule.lot_increment <= 0.0 {
            return Ok(true);
        }
        let lots = quantity / rule.lot_increment;
        Ok((lots - lots.round()).abs() < 1e-9)
    }

    /// Commission on a fill: rate × notional with a per-market minimum,
    /// plus sell-side stamp duty where the market levies one.
    pub fn commission(&self, market: MarketKind, side: OrderSide, notional: f64) -> CoreResult<f64> {
        let rule = self.rule(market)?;
        let mut fee = (notional * rule.commission_rate).max(rule.min_commission);
        if side == OrderSide::Sell {
            fee += notional * rule.sell_stamp_rate;
        }
        Ok(fee)
    }

    /// T+N settlement instant for a lot bought at `now_ms`, or `None`
    /// for same-day markets.
    pub fn settlable_after(&self, market: MarketKind, now_ms: i64) -> CoreResult<Option<i64>> {
        let rule = self.rule(market)?;
        if rule.settlement_days <= 0 {
            return Ok(None);
        }
        Ok(Some(now_ms + rule.settlement_days * MS_PER_DAY))
    }

    /// Daily allowed price band `(lower, upper)` around the previous
    /// close, or `None` when the market has no daily limit.
    pub fn price_band(
        &self,
        market: MarketKind,
        prev_close: f64,
        is_st: bool,
    ) -> CoreResult<Option<(f64, f64)>> {
        let rule = self.rule(market)?;
        let pct = if is_st && rule.st_price_limit_pct > 0.0 {
            rule.st_price_limit_pct
        } else {
            rule.price_limit_pct
        };
        if pct <= 0.0 || prev_close <= 0.0 {
            return Ok(None);
        }
        let band = prev_close * pct / 100.0;
        Ok(Some((prev_close - band, prev_close + band)))
    }
}

fn parse_hhmm(value: Option<&str>) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value?, "%H:%M").ok()
}
