// src/db/accounts.rs
use super::decimal_column;
use crate::error::StoreError;
use crate::models::{Account, UserId};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

pub fn create(
    conn: &Connection,
    username: &str,
    hash: &str,
    starting_cash: Decimal,
) -> Result<UserId, StoreError> {
    ensure_non_negative(starting_cash)?;
    conn.execute(
        "INSERT INTO users (username, hash, cash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            username,
            hash,
            starting_cash.to_string(),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn username_exists(conn: &Connection, username: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns the id and password hash for `username`.
pub fn find_credentials(
    conn: &Connection,
    username: &str,
) -> Result<Option<(UserId, String)>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, hash FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}

pub fn get(conn: &Connection, user_id: UserId) -> Result<Option<Account>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, username, cash FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(Account {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    cash: decimal_column(row, 2)?,
                })
            },
        )
        .optional()?)
}

pub fn cash(conn: &Connection, user_id: UserId) -> Result<Option<Decimal>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT cash FROM users WHERE id = ?1",
            params![user_id],
            |row| decimal_column(row, 0),
        )
        .optional()?)
}

/// Overwrites the cash balance. Refuses to store a negative balance.
pub fn set_cash(conn: &Connection, user_id: UserId, cash: Decimal) -> Result<(), StoreError> {
    ensure_non_negative(cash)?;
    let updated = conn.execute(
        "UPDATE users SET cash = ?1 WHERE id = ?2",
        params![cash.to_string(), user_id],
    )?;
    if updated != 1 {
        return Err(StoreError::Invariant(format!(
            "cash update touched {} accounts for user {}",
            updated, user_id
        )));
    }
    Ok(())
}

fn ensure_non_negative(cash: Decimal) -> Result<(), StoreError> {
    if cash.is_sign_negative() && !cash.is_zero() {
        return Err(StoreError::Invariant(format!(
            "cash balance cannot be negative: {}",
            cash
        )));
    }
    Ok(())
}
