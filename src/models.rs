// src/models.rs
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Opaque identity handed to the ledger by the authentication layer.
pub type UserId = i64;

/// A price snapshot for a symbol at lookup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

/// A bare price under the provider's canonical symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(format!("unknown trade action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub user_id: UserId,
    pub username: String,
    pub cash: Decimal,
}

/// A user's aggregate position in one symbol. Only exists while `shares > 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub user_id: UserId,
    pub symbol: String,
    pub name: String,
    pub shares: u32,
    pub last_price: Decimal,
    pub total_value: Decimal,
}

impl Holding {
    /// Builds a holding priced at `price`; `total_value` is always derived here.
    pub fn priced(
        user_id: UserId,
        symbol: &str,
        name: &str,
        shares: u32,
        price: Decimal,
    ) -> Result<Self, LedgerError> {
        let total_value = Decimal::from(shares).checked_mul(price).ok_or_else(|| {
            LedgerError::Validation(format!("{} x {} overflows", shares, price))
        })?;
        Ok(Self {
            user_id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            shares,
            last_price: price,
            total_value,
        })
    }
}

/// An executed trade as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: UserId,
    pub symbol: String,
    pub shares: u32,
    pub price: Decimal,
    pub action: TradeAction,
    pub executed_at: DateTime<Utc>,
}

/// Outcome of a successful buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub action: TradeAction,
    pub symbol: String,
    pub name: String,
    pub shares: u32,
    pub price: Decimal,
    pub total: Decimal,
    pub cash: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValue {
    pub symbol: String,
    pub name: String,
    pub shares: u32,
    pub price: Decimal,
    pub total: Decimal,
}

/// Live valuation of a user's cash and holdings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub cash: Decimal,
    pub positions: Vec<PositionValue>,
    pub holdings_value: Decimal,
    pub net_worth: Decimal,
}

/// A validated, strictly positive whole number of shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShareCount(u32);

impl ShareCount {
    pub fn new(shares: i64) -> Result<Self, LedgerError> {
        if shares <= 0 {
            return Err(LedgerError::Validation(format!(
                "share count must be positive, got {}",
                shares
            )));
        }
        u32::try_from(shares)
            .map(ShareCount)
            .map_err(|_| LedgerError::Validation(format!("share count {} is too large", shares)))
    }

    /// Parses user input. Fractional counts are rejected rather than truncated.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::Validation("missing shares".to_string()));
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|_| LedgerError::Validation(format!("invalid share count: {}", trimmed)))?;
        if !value.fract().is_zero() {
            return Err(LedgerError::Validation(
                "cannot trade fractional shares".to_string(),
            ));
        }
        let whole = i64::try_from(value.trunc())
            .map_err(|_| LedgerError::Validation(format!("share count {} is too large", trimmed)))?;
        Self::new(whole)
    }

    /// Accepts a JSON number or string, as submitted by a form or client.
    pub fn from_json(value: &Value) -> Result<Self, LedgerError> {
        match value {
            Value::Number(n) => Self::parse(&n.to_string()),
            Value::String(s) => Self::parse(s),
            Value::Null => Err(LedgerError::Validation("missing shares".to_string())),
            _ => Err(LedgerError::Validation("invalid share count".to_string())),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Parses a deposit amount; must be a positive decimal.
pub fn parse_amount(value: &Value) -> Result<Decimal, LedgerError> {
    let amount = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string())),
        Value::String(s) if !s.trim().is_empty() => Decimal::from_str(s.trim()),
        Value::Null => return Err(LedgerError::Validation("must add money".to_string())),
        _ => return Err(LedgerError::Validation("invalid amount".to_string())),
    }
    .map_err(|_| LedgerError::Validation(format!("invalid amount: {}", value)))?;

    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(amount)
}

/// Trims and upper-cases a ticker before lookup.
pub fn normalize_symbol(input: &str) -> Result<String, LedgerError> {
    let symbol = input.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(LedgerError::Validation(
            "must provide a stock symbol".to_string(),
        ));
    }
    Ok(symbol)
}
