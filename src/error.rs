// src/error.rs
use crate::models::UserId;
use rust_decimal::Decimal;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store invariant violated: {0}")]
    Invariant(String),
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("no quote found for {0}")]
    NotFound(String),

    #[error("quote source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid symbol: {0}")]
    SymbolNotFound(String),

    #[error("quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("buy amount {cost} exceeds available cash {available}")]
    InsufficientFunds { cost: Decimal, available: Decimal },

    #[error("sell amount {requested} exceeds the {owned} shares of {symbol} owned")]
    InsufficientShares {
        symbol: String,
        requested: u32,
        owned: u32,
    },

    #[error("no position held in {0}")]
    NoPosition(String),

    #[error("no account for user {0}")]
    UnknownAccount(UserId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::SymbolNotFound(_) => "symbol_not_found",
            LedgerError::QuoteUnavailable { .. } => "quote_unavailable",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::InsufficientShares { .. } => "insufficient_shares",
            LedgerError::NoPosition(_) => "no_position",
            LedgerError::UnknownAccount(_) => "unknown_account",
            LedgerError::Store(_) => "store_failure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InsufficientShares { .. }
            | LedgerError::NoPosition(_) => StatusCode::BAD_REQUEST,
            LedgerError::SymbolNotFound(_) | LedgerError::UnknownAccount(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::QuoteUnavailable { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::InsufficientFunds { .. } => StatusCode::FORBIDDEN,
            LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("username has been taken")]
    UsernameTaken,

    #[error("invalid username and/or password")]
    InvalidCredentials,

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::UsernameTaken => "username_taken",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Hash(_) | AuthError::Token(_) | AuthError::Task(_) => "auth_failure",
            AuthError::Store(_) => "store_failure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::FORBIDDEN,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Hash(_)
            | AuthError::Token(_)
            | AuthError::Task(_)
            | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation error: {0}")]
    Validation(String),
}

/// Rejection carried through warp filters and rendered by [`handle_rejection`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl Reject for ApiError {}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError {
            status: err.status(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError {
            status: err.status(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, kind, message) = if let Some(api_error) = err.find::<ApiError>() {
        (api_error.status, api_error.kind, api_error.message.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "validation", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "validation",
            "request body too large".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "validation",
            "content-length required".to_string(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "validation",
            "expected a JSON body".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        )
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error".to_string(),
        )
    };

    let body = warp::reply::json(&ErrorBody {
        error: kind,
        message: &message,
    });
    Ok(warp::reply::with_status(body, status))
}
