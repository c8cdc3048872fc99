// src/ledger.rs
//! The portfolio ledger engine.
//!
//! Buy, sell and deposit each run as one transition across the account,
//! holdings and history tables. Prices are fetched before the transition starts
//! and the same price is used for validation and commit. The read-validate-write
//! sequence runs inside a single `IMMEDIATE` database transaction, which also
//! serializes concurrent transitions for the same user. A rejected or failed
//! trade leaves no trace in any store.

use crate::db::{accounts, history, holdings, Database};
use crate::error::{LedgerError, QuoteError};
use crate::models::{
    normalize_symbol, Account, Holding, PortfolioValuation, PositionValue, Price, Quote,
    ShareCount, TradeAction, TradeReceipt, Transaction, UserId,
};
use crate::quote::QuoteSource;
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Ledger {
    db: Database,
    quotes: Arc<dyn QuoteSource>,
    valuation_quotes: Arc<dyn QuoteSource>,
}

impl Ledger {
    pub fn new(db: Database, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            db,
            valuation_quotes: quotes.clone(),
            quotes,
        }
    }

    /// Uses `quotes` for portfolio valuation only; trades always go live.
    pub fn with_valuation_quotes(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.valuation_quotes = quotes;
        self
    }

    /// Looks up a live quote, display name included, for user-supplied `symbol`.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, LedgerError> {
        let price = self.price(symbol).await?;
        let name = self.quotes.name(&price.symbol).await;
        Ok(Quote {
            symbol: price.symbol,
            name,
            price: price.price,
        })
    }

    async fn price(&self, symbol: &str) -> Result<Price, LedgerError> {
        let symbol = normalize_symbol(symbol)?;
        let price = self
            .quotes
            .price(&symbol)
            .await
            .map_err(|e| trade_quote_error(&symbol, e))?;
        if price.price <= Decimal::ZERO {
            return Err(LedgerError::QuoteUnavailable {
                symbol,
                reason: format!("non-positive price {}", price.price),
            });
        }
        Ok(price)
    }

    pub async fn buy(
        &self,
        user_id: UserId,
        symbol: &str,
        shares: ShareCount,
    ) -> Result<TradeReceipt, LedgerError> {
        let price = self.price(symbol).await?;
        let requested = shares.get();
        let cost = trade_value(requested, price.price)?;

        // Names are resolved only for new positions; an existing one keeps its own.
        let held = self
            .db
            .read(|conn| holdings::get(conn, user_id, &price.symbol))
            .await?;
        let new_name = match held {
            Some(_) => None,
            None => Some(self.quotes.name(&price.symbol).await),
        };

        let result = self
            .db
            .write(|conn| {
                let cash = accounts::cash(conn, user_id)?
                    .ok_or(LedgerError::UnknownAccount(user_id))?;
                if cost > cash {
                    return Err(LedgerError::InsufficientFunds {
                        cost,
                        available: cash,
                    });
                }

                let (owned, name) = match holdings::get(conn, user_id, &price.symbol)? {
                    Some(holding) => (holding.shares, holding.name),
                    None => (0, new_name.unwrap_or_else(|| price.symbol.clone())),
                };
                let new_shares = owned.checked_add(requested).ok_or_else(|| {
                    LedgerError::Validation(format!(
                        "position in {} would exceed {} shares",
                        price.symbol,
                        u32::MAX
                    ))
                })?;

                let new_cash = cash - cost;
                accounts::set_cash(conn, user_id, new_cash)?;
                holdings::upsert(
                    conn,
                    &Holding::priced(user_id, &price.symbol, &name, new_shares, price.price)?,
                )?;
                history::append(
                    conn,
                    user_id,
                    &price.symbol,
                    requested,
                    price.price,
                    TradeAction::Buy,
                )?;

                Ok(TradeReceipt {
                    action: TradeAction::Buy,
                    symbol: price.symbol.clone(),
                    name,
                    shares: requested,
                    price: price.price,
                    total: cost,
                    cash: new_cash,
                })
            })
            .await;

        log_outcome(user_id, &price, requested, TradeAction::Buy, &result);
        result
    }

    pub async fn sell(
        &self,
        user_id: UserId,
        symbol: &str,
        shares: ShareCount,
    ) -> Result<TradeReceipt, LedgerError> {
        let price = self.price(symbol).await?;
        let requested = shares.get();
        let proceeds = trade_value(requested, price.price)?;

        let result = self
            .db
            .write(|conn| {
                let holding = match holdings::get(conn, user_id, &price.symbol)? {
                    Some(holding) => holding,
                    // A closed-out position reads as zero shares owned.
                    None if history::has_traded(conn, user_id, &price.symbol)? => {
                        return Err(LedgerError::InsufficientShares {
                            symbol: price.symbol.clone(),
                            requested,
                            owned: 0,
                        });
                    }
                    None => return Err(LedgerError::NoPosition(price.symbol.clone())),
                };
                if requested > holding.shares {
                    return Err(LedgerError::InsufficientShares {
                        symbol: price.symbol.clone(),
                        requested,
                        owned: holding.shares,
                    });
                }
                let cash = accounts::cash(conn, user_id)?
                    .ok_or(LedgerError::UnknownAccount(user_id))?;

                let new_cash = cash.checked_add(proceeds).ok_or_else(|| {
                    LedgerError::Validation(format!(
                        "proceeds {} would overflow the cash balance",
                        proceeds
                    ))
                })?;
                accounts::set_cash(conn, user_id, new_cash)?;
                let remaining = holding.shares - requested;
                if remaining == 0 {
                    holdings::delete(conn, user_id, &price.symbol)?;
                } else {
                    holdings::upsert(
                        conn,
                        &Holding::priced(
                            user_id,
                            &price.symbol,
                            &holding.name,
                            remaining,
                            price.price,
                        )?,
                    )?;
                }
                history::append(
                    conn,
                    user_id,
                    &price.symbol,
                    requested,
                    price.price,
                    TradeAction::Sell,
                )?;

                Ok(TradeReceipt {
                    action: TradeAction::Sell,
                    symbol: price.symbol.clone(),
                    name: holding.name,
                    shares: requested,
                    price: price.price,
                    total: proceeds,
                    cash: new_cash,
                })
            })
            .await;

        log_outcome(user_id, &price, requested, TradeAction::Sell, &result);
        result
    }

    /// Credits `amount` to the user's cash balance.
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<Account, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let account = self
            .db
            .write(|conn| {
                let mut account = accounts::get(conn, user_id)?
                    .ok_or(LedgerError::UnknownAccount(user_id))?;
                account.cash = account.cash.checked_add(amount).ok_or_else(|| {
                    LedgerError::Validation(format!("amount {} is too large", amount))
                })?;
                accounts::set_cash(conn, user_id, account.cash)?;
                Ok::<_, LedgerError>(account)
            })
            .await?;

        info!(
            "User {} deposited {}; cash is now {}",
            user_id, amount, account.cash
        );
        Ok(account)
    }

    pub async fn account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        self.db
            .read(|conn| {
                accounts::get(conn, user_id)?.ok_or(LedgerError::UnknownAccount(user_id))
            })
            .await
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        self.db
            .read(|conn| {
                if accounts::get(conn, user_id)?.is_none() {
                    return Err(LedgerError::UnknownAccount(user_id));
                }
                Ok(history::for_user(conn, user_id)?)
            })
            .await
    }

    /// Values every holding at a fresh price. One failed quote fails the whole valuation.
    pub async fn portfolio(&self, user_id: UserId) -> Result<PortfolioValuation, LedgerError> {
        let (cash, positions) = self
            .db
            .read(|conn| {
                let cash = accounts::cash(conn, user_id)?
                    .ok_or(LedgerError::UnknownAccount(user_id))?;
                Ok::<_, LedgerError>((cash, holdings::list(conn, user_id)?))
            })
            .await?;

        let mut valued = Vec::with_capacity(positions.len());
        for holding in positions {
            let price = self
                .valuation_quotes
                .price(&holding.symbol)
                .await
                .map_err(|e| LedgerError::QuoteUnavailable {
                    symbol: holding.symbol.clone(),
                    reason: e.to_string(),
                })?;
            valued.push(PositionValue {
                total: trade_value(holding.shares, price.price)?,
                symbol: holding.symbol,
                name: holding.name,
                shares: holding.shares,
                price: price.price,
            });
        }
        valued.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.symbol.cmp(&b.symbol)));

        let holdings_value = valued
            .iter()
            .try_fold(Decimal::ZERO, |sum, p| sum.checked_add(p.total))
            .ok_or_else(|| LedgerError::Validation("holdings value overflows".to_string()))?;
        let net_worth = cash
            .checked_add(holdings_value)
            .ok_or_else(|| LedgerError::Validation("net worth overflows".to_string()))?;
        Ok(PortfolioValuation {
            cash,
            net_worth,
            holdings_value,
            positions: valued,
        })
    }
}

fn trade_value(shares: u32, price: Decimal) -> Result<Decimal, LedgerError> {
    Decimal::from(shares)
        .checked_mul(price)
        .ok_or_else(|| LedgerError::Validation(format!("{} x {} overflows", shares, price)))
}

fn trade_quote_error(symbol: &str, err: QuoteError) -> LedgerError {
    match err {
        QuoteError::NotFound(_) => LedgerError::SymbolNotFound(symbol.to_string()),
        QuoteError::Unavailable(reason) => LedgerError::QuoteUnavailable {
            symbol: symbol.to_string(),
            reason,
        },
    }
}

fn log_outcome(
    user_id: UserId,
    price: &Price,
    shares: u32,
    action: TradeAction,
    result: &Result<TradeReceipt, LedgerError>,
) {
    match result {
        Ok(receipt) => info!(
            "User {} {} {} {} @ {}; cash is now {}",
            user_id, action, shares, price.symbol, price.price, receipt.cash
        ),
        Err(LedgerError::Store(e)) => error!(
            "User {} {} {} {} rolled back: {}",
            user_id,
            action,
            shares,
            price.symbol,
            e
        ),
        Err(e) => warn!(
            "User {} {} {} {} rejected: {}",
            user_id, action, shares, price.symbol, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::FixedQuotes;
    use rust_decimal_macros::dec;

    async fn setup(cash: Decimal) -> (Ledger, Arc<FixedQuotes>, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .write(|conn| accounts::create(conn, "alice", "hash", cash))
            .await
            .unwrap();
        let quotes = Arc::new(FixedQuotes::new());
        quotes.set("AAPL", "Apple Inc", dec!(150));
        quotes.set("MSFT", "Microsoft Corp", dec!(400));
        (Ledger::new(db, quotes.clone()), quotes, user)
    }

    fn shares(n: i64) -> ShareCount {
        ShareCount::new(n).unwrap()
    }

    #[tokio::test]
    async fn buy_then_partial_sell_matches_worked_example() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;

        let bought = ledger.buy(user, "aapl", shares(10)).await.unwrap();
        assert_eq!(bought.cash, dec!(8500));
        assert_eq!(bought.total, dec!(1500));
        let holding = ledger
            .db
            .read(|conn| holdings::get(conn, user, "AAPL"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.shares, 10);
        assert_eq!(holding.total_value, dec!(1500));

        quotes.set("AAPL", "Apple Inc", dec!(160));
        let sold = ledger.sell(user, "AAPL", shares(4)).await.unwrap();
        assert_eq!(sold.cash, dec!(9140));
        let holding = ledger
            .db
            .read(|conn| holdings::get(conn, user, "AAPL"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.shares, 6);
        assert_eq!(holding.last_price, dec!(160));
        assert_eq!(holding.total_value, dec!(960));

        let history = ledger.history(user).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, TradeAction::Buy);
        assert_eq!(history[0].price, dec!(150));
        assert_eq!(history[1].action, TradeAction::Sell);
        assert_eq!(history[1].shares, 4);
        assert_eq!(history[1].price, dec!(160));
    }

    #[tokio::test]
    async fn repeat_buys_recompute_total_at_latest_price() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(2)).await.unwrap();
        quotes.set("AAPL", "Apple Inc", dec!(100));
        ledger.buy(user, "AAPL", shares(3)).await.unwrap();

        let holding = ledger
            .db
            .read(|conn| holdings::get(conn, user, "AAPL"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.shares, 5);
        assert_eq!(holding.last_price, dec!(100));
        assert_eq!(holding.total_value, dec!(500));
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(9400));
    }

    #[tokio::test]
    async fn round_trip_at_constant_price_restores_cash() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "MSFT", shares(7)).await.unwrap();
        let receipt = ledger.sell(user, "MSFT", shares(7)).await.unwrap();
        assert_eq!(receipt.cash, dec!(10000));
    }

    #[tokio::test]
    async fn insufficient_funds_changes_nothing() {
        let (ledger, _quotes, user) = setup(dec!(1000)).await;
        let err = ledger.buy(user, "AAPL", shares(7)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { cost, available }
                if cost == dec!(1050) && available == dec!(1000)
        ));
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(1000));
        assert!(ledger.history(user).await.unwrap().is_empty());
        assert!(ledger
            .db
            .read(|conn| holdings::list(conn, user))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn spending_exactly_all_cash_is_allowed() {
        let (ledger, _quotes, user) = setup(dec!(1500)).await;
        let receipt = ledger.buy(user, "AAPL", shares(10)).await.unwrap();
        assert_eq!(receipt.cash, Decimal::ZERO);
    }

    #[tokio::test]
    async fn selling_everything_deletes_the_holding() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(3)).await.unwrap();
        ledger.sell(user, "AAPL", shares(3)).await.unwrap();
        assert_eq!(
            ledger
                .db
                .read(|conn| holdings::get(conn, user, "AAPL"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn overselling_changes_nothing() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(3)).await.unwrap();
        let err = ledger.sell(user, "AAPL", shares(4)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientShares { requested: 4, owned: 3, .. }
        ));
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(9550));
        assert_eq!(ledger.history(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn selling_a_closed_position_is_insufficient_shares() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(2)).await.unwrap();
        ledger.sell(user, "AAPL", shares(2)).await.unwrap();
        let err = ledger.sell(user, "AAPL", shares(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientShares { requested: 1, owned: 0, .. }
        ));
        assert_eq!(ledger.history(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn selling_without_a_position_fails() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        let err = ledger.sell(user, "MSFT", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoPosition(s) if s == "MSFT"));
    }

    #[tokio::test]
    async fn unknown_symbol_and_dead_feed_are_distinguished() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        let err = ledger.buy(user, "ZZZZ", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::SymbolNotFound(s) if s == "ZZZZ"));

        quotes.fail("MSFT");
        let err = ledger.buy(user, "MSFT", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::QuoteUnavailable { .. }));
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(10000));
    }

    #[tokio::test]
    async fn blank_symbol_is_rejected_before_lookup() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        let err = ledger.buy(user, "  ", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(quotes.lookups(), 0);
    }

    #[tokio::test]
    async fn unknown_user_cannot_trade() {
        let (ledger, _quotes, _user) = setup(dec!(10000)).await;
        let err = ledger.buy(999, "AAPL", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownAccount(999)));
    }

    #[tokio::test]
    async fn deposit_credits_cash_only() {
        let (ledger, _quotes, user) = setup(dec!(100)).await;
        let account = ledger.deposit(user, dec!(25.50)).await.unwrap();
        assert_eq!(account.cash, dec!(125.50));
        assert!(ledger.history(user).await.unwrap().is_empty());

        let err = ledger.deposit(user, dec!(0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.deposit(user, dec!(-10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(125.50));
    }

    #[tokio::test]
    async fn valuation_uses_fresh_quotes_sorted_by_value() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(10)).await.unwrap();
        ledger.buy(user, "MSFT", shares(1)).await.unwrap();
        quotes.set("AAPL", "Apple Inc", dec!(200));

        let valuation = ledger.portfolio(user).await.unwrap();
        assert_eq!(valuation.cash, dec!(8100));
        assert_eq!(valuation.positions.len(), 2);
        assert_eq!(valuation.positions[0].symbol, "AAPL");
        assert_eq!(valuation.positions[0].price, dec!(200));
        assert_eq!(valuation.positions[0].total, dec!(2000));
        assert_eq!(valuation.positions[1].symbol, "MSFT");
        assert_eq!(valuation.holdings_value, dec!(2400));
        assert_eq!(valuation.net_worth, dec!(10500));
    }

    #[tokio::test]
    async fn valuation_fails_when_any_quote_fails() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(1)).await.unwrap();
        ledger.buy(user, "MSFT", shares(1)).await.unwrap();
        quotes.fail("MSFT");

        let err = ledger.portfolio(user).await.unwrap_err();
        assert!(matches!(err, LedgerError::QuoteUnavailable { symbol, .. } if symbol == "MSFT"));
    }

    #[tokio::test]
    async fn empty_portfolio_is_just_cash() {
        let (ledger, quotes, user) = setup(dec!(321)).await;
        let valuation = ledger.portfolio(user).await.unwrap();
        assert!(valuation.positions.is_empty());
        assert_eq!(valuation.net_worth, dec!(321));
        assert_eq!(quotes.lookups(), 0);
    }

    #[tokio::test]
    async fn overflowing_balances_are_rejected_not_panicked() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(1)).await.unwrap();
        ledger
            .deposit(user, Decimal::MAX - dec!(9850))
            .await
            .unwrap();

        let err = ledger.sell(user, "AAPL", shares(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = ledger.portfolio(user).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(ledger.account(user).await.unwrap().cash, Decimal::MAX);
        assert_eq!(ledger.history(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn buying_more_keeps_the_stored_name() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        let first = ledger.buy(user, "AAPL", shares(1)).await.unwrap();
        assert_eq!(first.name, "Apple Inc");
        assert_eq!(quotes.name_lookups(), 1);

        quotes.set("AAPL", "AAPL", dec!(150));
        let second = ledger.buy(user, "AAPL", shares(1)).await.unwrap();
        assert_eq!(second.name, "Apple Inc");
        assert_eq!(quotes.name_lookups(), 1);

        let holding = ledger
            .db
            .read(|conn| holdings::get(conn, user, "AAPL"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.name, "Apple Inc");
    }

    #[tokio::test]
    async fn valuation_and_sells_only_fetch_prices() {
        let (ledger, quotes, user) = setup(dec!(10000)).await;
        ledger.buy(user, "AAPL", shares(2)).await.unwrap();
        ledger.buy(user, "MSFT", shares(1)).await.unwrap();
        let names = quotes.name_lookups();

        ledger.portfolio(user).await.unwrap();
        let sold = ledger.sell(user, "MSFT", shares(1)).await.unwrap();
        assert_eq!(sold.name, "Microsoft Corp");
        assert_eq!(quotes.name_lookups(), names);
        assert_eq!(quotes.lookups(), 5);
    }

    #[tokio::test]
    async fn quote_includes_the_display_name() {
        let (ledger, quotes, _user) = setup(dec!(0)).await;
        let quote = ledger.quote(" msft ").await.unwrap();
        assert_eq!(quote.symbol, "MSFT");
        assert_eq!(quote.name, "Microsoft Corp");
        assert_eq!(quote.price, dec!(400));
        assert_eq!(quotes.name_lookups(), 1);
    }

    #[tokio::test]
    async fn concurrent_sells_never_oversell() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        let ledger = Arc::new(ledger);
        ledger.buy(user, "AAPL", shares(3)).await.unwrap();

        let first = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.sell(user, "AAPL", shares(2)).await })
        };
        let second = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.sell(user, "AAPL", shares(2)).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::InsufficientShares { requested: 2, owned: 1, .. })
        )));
        let holding = ledger
            .db
            .read(|conn| holdings::get(conn, user, "AAPL"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.shares, 1);
        assert_eq!(ledger.history(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_sells_of_last_share_succeed_once() {
        let (ledger, _quotes, user) = setup(dec!(10000)).await;
        let ledger = Arc::new(ledger);
        ledger.buy(user, "AAPL", shares(1)).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.sell(user, "AAPL", shares(1)).await })
            })
            .collect();
        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientShares { owned: 0, .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(10000));
    }

    #[tokio::test]
    async fn concurrent_buys_respect_solvency() {
        let (ledger, _quotes, user) = setup(dec!(1000)).await;
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.buy(user, "AAPL", shares(3)).await })
            })
            .collect();
        let mut filled = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                filled += 1;
            }
        }
        assert_eq!(filled, 2);
        assert_eq!(ledger.account(user).await.unwrap().cash, dec!(100));
    }
}
