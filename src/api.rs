// src/api.rs
use crate::auth::{AuthService, LoginRequest, RegisterRequest};
use crate::error::{handle_rejection, ApiError, AuthError};
use crate::ledger::Ledger;
use crate::models::{parse_amount, ShareCount, UserId};
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Deserialize)]
struct TradeRequest {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    shares: Value,
}

#[derive(Deserialize)]
struct DepositRequest {
    #[serde(default)]
    amount: Value,
}

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    ledger: Arc<Ledger>,
    auth: Arc<AuthService>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let register = warp::path("register")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_auth(auth.clone()))
        .and(json_body::<RegisterRequest>())
        .and_then(register_handler);

    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_auth(auth.clone()))
        .and(json_body::<LoginRequest>())
        .and_then(login_handler);

    let quote = warp::path!("quote" / String)
        .and(warp::get())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and_then(quote_handler);

    let portfolio = warp::path("portfolio")
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and_then(portfolio_handler);

    let cash = warp::path("cash")
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and(json_body::<DepositRequest>())
        .and_then(deposit_handler);

    let buy = warp::path("buy")
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and(json_body::<TradeRequest>())
        .and_then(buy_handler);

    let sell = warp::path("sell")
        .and(warp::path::end())
        .and(warp::post())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and(json_body::<TradeRequest>())
        .and_then(sell_handler);

    let history = warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(auth.clone()))
        .and(with_ledger(ledger.clone()))
        .and_then(history_handler);

    let account = warp::path("account")
        .and(warp::path::end())
        .and(warp::get())
        .and(authenticated(auth))
        .and(with_ledger(ledger))
        .and_then(account_handler);

    register
        .or(login)
        .or(quote)
        .or(portfolio)
        .or(cash)
        .or(buy)
        .or(sell)
        .or(history)
        .or(account)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(no_cache_headers()))
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with_ledger(
    ledger: Arc<Ledger>,
) -> impl Filter<Extract = (Arc<Ledger>,), Error = Infallible> + Clone {
    warp::any().map(move || ledger.clone())
}

fn with_auth(
    auth: Arc<AuthService>,
) -> impl Filter<Extract = (Arc<AuthService>,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}

/// Resolves `Authorization: Bearer <token>` to the caller's user id.
fn authenticated(
    auth: Arc<AuthService>,
) -> impl Filter<Extract = (UserId,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_auth(auth))
        .and_then(|header: Option<String>, auth: Arc<AuthService>| async move {
            let token = header
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty());
            match token {
                Some(token) => auth.verify_token(token).map_err(reject),
                None => Err(reject(AuthError::Unauthorized)),
            }
        })
}

fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

async fn register_handler(
    auth: Arc<AuthService>,
    req: RegisterRequest,
) -> Result<impl Reply, Rejection> {
    let user_id = auth.register(&req).await.map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "user_id": user_id })),
        StatusCode::CREATED,
    ))
}

async fn login_handler(
    auth: Arc<AuthService>,
    req: LoginRequest,
) -> Result<impl Reply, Rejection> {
    let response = auth.login(&req).await.map_err(reject)?;
    Ok(warp::reply::json(&response))
}

async fn quote_handler(
    symbol: String,
    _user_id: UserId,
    ledger: Arc<Ledger>,
) -> Result<impl Reply, Rejection> {
    let quote = ledger.quote(&symbol).await.map_err(reject)?;
    Ok(warp::reply::json(&quote))
}

async fn portfolio_handler(user_id: UserId, ledger: Arc<Ledger>) -> Result<impl Reply, Rejection> {
    let valuation = ledger.portfolio(user_id).await.map_err(reject)?;
    Ok(warp::reply::json(&valuation))
}

async fn deposit_handler(
    user_id: UserId,
    ledger: Arc<Ledger>,
    req: DepositRequest,
) -> Result<impl Reply, Rejection> {
    let amount = parse_amount(&req.amount).map_err(reject)?;
    let account = ledger.deposit(user_id, amount).await.map_err(reject)?;
    Ok(warp::reply::json(&account))
}

async fn buy_handler(
    user_id: UserId,
    ledger: Arc<Ledger>,
    req: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let shares = ShareCount::from_json(&req.shares).map_err(reject)?;
    let receipt = ledger
        .buy(user_id, &req.symbol, shares)
        .await
        .map_err(reject)?;
    info!(
        "Successfully bought {} shares of {}",
        receipt.shares, receipt.symbol
    );
    Ok(warp::reply::json(&receipt))
}

async fn sell_handler(
    user_id: UserId,
    ledger: Arc<Ledger>,
    req: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let shares = ShareCount::from_json(&req.shares).map_err(reject)?;
    let receipt = ledger
        .sell(user_id, &req.symbol, shares)
        .await
        .map_err(reject)?;
    info!(
        "Successfully sold {} shares of {}",
        receipt.shares, receipt.symbol
    );
    Ok(warp::reply::json(&receipt))
}

async fn history_handler(user_id: UserId, ledger: Arc<Ledger>) -> Result<impl Reply, Rejection> {
    let history = ledger.history(user_id).await.map_err(reject)?;
    Ok(warp::reply::json(&history))
}

async fn account_handler(user_id: UserId, ledger: Arc<Ledger>) -> Result<impl Reply, Rejection> {
    let account = ledger.account(user_id).await.map_err(reject)?;
    Ok(warp::reply::json(&account))
}
