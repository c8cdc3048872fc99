// src/db/holdings.rs
use super::decimal_column;
use crate::error::StoreError;
use crate::models::{Holding, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        user_id: row.get(0)?,
        symbol: row.get(1)?,
        name: row.get(2)?,
        shares: row.get(3)?,
        last_price: decimal_column(row, 4)?,
        total_value: decimal_column(row, 5)?,
    })
}

/// Returns `None` when the user holds no shares of `symbol`.
pub fn get(conn: &Connection, user_id: UserId, symbol: &str) -> Result<Option<Holding>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT user_id, symbol, name, shares, last_price, total_value
             FROM holdings WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection, user_id: UserId) -> Result<Vec<Holding>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, symbol, name, shares, last_price, total_value
         FROM holdings WHERE user_id = ?1 ORDER BY symbol",
    )?;
    let holdings = stmt
        .query_map(params![user_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(holdings)
}

/// Inserts or replaces the (user, symbol) position.
pub fn upsert(conn: &Connection, holding: &Holding) -> Result<(), StoreError> {
    if holding.shares == 0 {
        return Err(StoreError::Invariant(format!(
            "refusing to store an empty {} holding; delete it instead",
            holding.symbol
        )));
    }
    conn.execute(
        "INSERT INTO holdings (user_id, symbol, name, shares, last_price, total_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (user_id, symbol) DO UPDATE SET
            name = excluded.name,
            shares = excluded.shares,
            last_price = excluded.last_price,
            total_value = excluded.total_value",
        params![
            holding.user_id,
            holding.symbol,
            holding.name,
            holding.shares,
            holding.last_price.to_string(),
            holding.total_value.to_string()
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, user_id: UserId, symbol: &str) -> Result<(), StoreError> {
    let deleted = conn.execute(
        "DELETE FROM holdings WHERE user_id = ?1 AND symbol = ?2",
        params![user_id, symbol],
    )?;
    if deleted != 1 {
        return Err(StoreError::Invariant(format!(
            "expected one {} holding for user {}, found {}",
            symbol, user_id, deleted
        )));
    }
    Ok(())
}
