// src/main.rs
use env_logger::{Builder, Env};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use stock_ledger::auth::AuthService;
use stock_ledger::db::Database;
use stock_ledger::ledger::Ledger;
use stock_ledger::quote::{AlphaVantage, CachedQuotes, QuoteSource};
use stock_ledger::settings::load_settings;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    let addr = match settings.server.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let db = match Database::open(&settings.database.path) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    info!("Opened ledger database at {}", settings.database.path);

    let live = match AlphaVantage::new(
        &settings.quotes.base_url,
        &settings.quotes.api_key,
        Duration::from_secs(settings.quotes.timeout_secs),
    ) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to build quote client: {}", e);
            return;
        }
    };
    let valuation: Arc<dyn QuoteSource> = Arc::new(CachedQuotes::new(
        live.clone(),
        Duration::from_secs(settings.quotes.valuation_cache_ttl_secs),
    ));
    let ledger = Arc::new(Ledger::new(db.clone(), live).with_valuation_quotes(valuation));
    let auth = Arc::new(AuthService::new(
        db,
        &settings.auth.jwt_secret,
        Duration::from_secs(settings.auth.token_ttl_secs),
        settings.auth.bcrypt_cost,
        settings.ledger.starting_cash,
    ));

    let api = stock_ledger::api::routes(ledger, auth);

    let (bound, server) = match warp::serve(api).try_bind_with_graceful_shutdown(addr, async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received.");
    }) {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("Server running on http://{}", bound);
    server.await;
}
