// src/quote.rs
use crate::error::QuoteError;
use crate::models::Price;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Live price lookup. Implementations may be slow and are never transactional.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest price, under the provider's canonical symbol.
    async fn price(&self, symbol: &str) -> Result<Price, QuoteError>;

    /// Display name for a canonical symbol. Falls back to the symbol itself.
    async fn name(&self, symbol: &str) -> String;
}

#[async_trait]
impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    async fn price(&self, symbol: &str) -> Result<Price, QuoteError> {
        (**self).price(symbol).await
    }

    async fn name(&self, symbol: &str) -> String {
        (**self).name(symbol).await
    }
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<SymbolMatch>,
}

#[derive(Deserialize)]
struct SymbolMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
}

/// Quote source backed by the Alpha Vantage REST API.
pub struct AlphaVantage {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn fetch(&self, function: &str, param: &str, symbol: &str) -> Result<String, QuoteError> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", function),
                (param, symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| QuoteError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QuoteError::Unavailable(format!(
                "HTTP {} from quote provider",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| QuoteError::Unavailable(e.to_string()))
    }

}

#[async_trait]
impl QuoteSource for AlphaVantage {
    async fn price(&self, symbol: &str) -> Result<Price, QuoteError> {
        let body = self.fetch("GLOBAL_QUOTE", "symbol", symbol).await?;
        let (canonical, price) = parse_global_quote(&body, symbol)?;
        debug!("Quoted {} at {}", canonical, price);
        Ok(Price {
            symbol: canonical,
            price,
        })
    }

    async fn name(&self, symbol: &str) -> String {
        match self.fetch("SYMBOL_SEARCH", "keywords", symbol).await {
            Ok(body) => parse_display_name(&body, symbol).unwrap_or_else(|| symbol.to_string()),
            Err(e) => {
                warn!("Name lookup for {} failed: {}", symbol, e);
                symbol.to_string()
            }
        }
    }
}

fn parse_global_quote(body: &str, requested: &str) -> Result<(String, Decimal), QuoteError> {
    let response: GlobalQuoteResponse = serde_json::from_str(body)
        .map_err(|e| QuoteError::Unavailable(format!("malformed quote response: {}", e)))?;

    if let Some(message) = response.note.or(response.information) {
        return Err(QuoteError::Unavailable(message));
    }
    if response.error_message.is_some() {
        return Err(QuoteError::NotFound(requested.to_string()));
    }

    let quote = response
        .global_quote
        .ok_or_else(|| QuoteError::NotFound(requested.to_string()))?;
    let symbol = match quote.symbol {
        Some(symbol) if !symbol.trim().is_empty() => symbol.trim().to_uppercase(),
        _ => return Err(QuoteError::NotFound(requested.to_string())),
    };
    let raw_price = quote
        .price
        .ok_or_else(|| QuoteError::Unavailable(format!("no price for {}", symbol)))?;
    let price = Decimal::from_str(raw_price.trim())
        .map_err(|_| QuoteError::Unavailable(format!("unparseable price {:?}", raw_price)))?;
    if price <= Decimal::ZERO {
        return Err(QuoteError::Unavailable(format!(
            "non-positive price {} for {}",
            price, symbol
        )));
    }
    Ok((symbol, price))
}

fn parse_display_name(body: &str, symbol: &str) -> Option<String> {
    let response: SymbolSearchResponse = serde_json::from_str(body).ok()?;
    response
        .best_matches
        .into_iter()
        .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
        .map(|m| m.name)
}

/// Reuses prices for up to `ttl`. Only meant for the valuation read path.
pub struct CachedQuotes<Q> {
    inner: Q,
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Price)>>,
}

impl<Q: QuoteSource> CachedQuotes<Q> {
    pub fn new(inner: Q, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<Q: QuoteSource> QuoteSource for CachedQuotes<Q> {
    async fn price(&self, symbol: &str) -> Result<Price, QuoteError> {
        if self.ttl.is_zero() {
            return self.inner.price(symbol).await;
        }
        if let Some((fetched_at, price)) = self.entries.read().await.get(symbol) {
            if fetched_at.elapsed() < self.ttl {
                return Ok(price.clone());
            }
        }
        let price = self.inner.price(symbol).await?;
        self.entries
            .write()
            .await
            .insert(symbol.to_string(), (Instant::now(), price.clone()));
        Ok(price)
    }

    async fn name(&self, symbol: &str) -> String {
        self.inner.name(symbol).await
    }
}

/// In-process quote table. Used for offline runs and tests.
#[derive(Default)]
pub struct FixedQuotes {
    quotes: std::sync::RwLock<HashMap<String, (String, Decimal)>>,
    unavailable: std::sync::RwLock<Vec<String>>,
    lookups: AtomicUsize,
    name_lookups: AtomicUsize,
}

impl FixedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, name: &str, price: Decimal) {
        if let Ok(mut quotes) = self.quotes.write() {
            quotes.insert(symbol.to_uppercase(), (name.to_string(), price));
        }
    }

    /// Makes lookups of `symbol` fail as if the provider were down.
    pub fn fail(&self, symbol: &str) {
        if let Ok(mut unavailable) = self.unavailable.write() {
            unavailable.push(symbol.to_uppercase());
        }
    }

    /// Number of price lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn name_lookups(&self) -> usize {
        self.name_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FixedQuotes {
    async fn price(&self, symbol: &str) -> Result<Price, QuoteError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let symbol = symbol.to_uppercase();
        let down = self
            .unavailable
            .read()
            .map(|u| u.contains(&symbol))
            .unwrap_or(true);
        if down {
            return Err(QuoteError::Unavailable(format!("{} feed is down", symbol)));
        }
        let price = self
            .quotes
            .read()
            .map_err(|_| QuoteError::Unavailable("quote table poisoned".to_string()))?
            .get(&symbol)
            .map(|(_, price)| *price)
            .ok_or_else(|| QuoteError::NotFound(symbol.clone()))?;
        Ok(Price { symbol, price })
    }

    async fn name(&self, symbol: &str) -> String {
        self.name_lookups.fetch_add(1, Ordering::SeqCst);
        let symbol = symbol.to_uppercase();
        self.quotes
            .read()
            .ok()
            .and_then(|quotes| quotes.get(&symbol).map(|(name, _)| name.clone()))
            .unwrap_or(symbol)
    }
}
