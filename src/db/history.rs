// src/db/history.rs
use super::decimal_column;
use crate::error::StoreError;
use crate::models::{TradeAction, Transaction, UserId};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let action: String = row.get(5)?;
    let executed_at: String = row.get(6)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        shares: row.get(3)?,
        price: decimal_column(row, 4)?,
        action: action
            .parse::<TradeAction>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?,
        executed_at: DateTime::parse_from_rfc3339(&executed_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
    })
}

/// Appends one executed trade and returns it with its sequence id.
pub fn append(
    conn: &Connection,
    user_id: UserId,
    symbol: &str,
    shares: u32,
    price: Decimal,
    action: TradeAction,
) -> Result<Transaction, StoreError> {
    let executed_at = Utc::now();
    conn.execute(
        "INSERT INTO history (user_id, symbol, shares, price, action, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            symbol,
            shares,
            price.to_string(),
            action.as_str(),
            executed_at.to_rfc3339()
        ],
    )?;
    Ok(Transaction {
        id: conn.last_insert_rowid(),
        user_id,
        symbol: symbol.to_string(),
        shares,
        price,
        action,
        executed_at,
    })
}

/// All trades for `user_id` in insertion order.
pub fn for_user(conn: &Connection, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, symbol, shares, price, action, executed_at
         FROM history WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![user_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Whether `user_id` has ever traded `symbol`.
pub fn has_traded(conn: &Connection, user_id: UserId, symbol: &str) -> Result<bool, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM history WHERE user_id = ?1 AND symbol = ?2)",
        params![user_id, symbol],
        |row| row.get(0),
    )?;
    Ok(exists)
}
