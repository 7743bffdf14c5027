use std::{cell::Cell, fmt};

use chrono::{DateTime, Utc};

use crate::{
    engine::{AssetId, FxPair, Market, Portfolios, Price, Trade, TradeOutcome},
    errors::Result,
};

/// A time-stamped unit of work replayed by the backtest.
pub trait Event: fmt::Debug {
    /// Returns the time the event happens at.
    fn time(&self) -> DateTime<Utc>;

    /// Returns true once [`Event::process`] has succeeded.
    fn is_processed(&self) -> bool;

    /// Applies the event.
    fn process(&self, market: &mut Market, portfolios: &mut Portfolios) -> Result<()>;
}

/// Sets the price of an asset.
#[derive(Debug)]
pub struct AssetPriceEvent {
    asset: AssetId,
    time: DateTime<Utc>,
    price: Price,
    processed: Cell<bool>,
}

impl AssetPriceEvent {
    /// Creates a price update for `asset` at `time`.
    pub fn new(asset: AssetId, time: DateTime<Utc>, price: impl Into<Price>) -> Self {
        Self {
            asset,
            time,
            price: price.into(),
            processed: Cell::new(false),
        }
    }

    /// Returns the repriced asset.
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Returns the new price.
    pub fn price(&self) -> Price {
        self.price
    }
}

impl Event for AssetPriceEvent {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn is_processed(&self) -> bool {
        self.processed.get()
    }

    fn process(&self, market: &mut Market, _portfolios: &mut Portfolios) -> Result<()> {
        market.set_price(self.asset, self.price)?;
        self.processed.set(true);
        Ok(())
    }
}

/// Sets an FX rate, registering the pair if it is not known yet.
#[derive(Debug)]
pub struct FxRateEvent {
    pair: FxPair,
    time: DateTime<Utc>,
    rate: Price,
    processed: Cell<bool>,
}

impl FxRateEvent {
    /// Creates a rate update for `pair` at `time`.
    pub fn new(pair: FxPair, time: DateTime<Utc>, rate: impl Into<Price>) -> Self {
        Self {
            pair,
            time,
            rate: rate.into(),
            processed: Cell::new(false),
        }
    }

    /// Returns the updated pair.
    pub fn pair(&self) -> FxPair {
        self.pair
    }

    /// Returns the new rate.
    pub fn rate(&self) -> Price {
        self.rate
    }
}

impl Event for FxRateEvent {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn is_processed(&self) -> bool {
        self.processed.get()
    }

    fn process(&self, market: &mut Market, _portfolios: &mut Portfolios) -> Result<()> {
        market.fx_rates_mut().set_rate(self.pair, self.rate)?;
        self.processed.set(true);
        Ok(())
    }
}

/// Executes a pre-built trade.
#[derive(Debug)]
pub struct TradeEvent {
    trade: Trade,
    time: DateTime<Utc>,
    outcome: Cell<Option<TradeOutcome>>,
}

impl TradeEvent {
    /// Schedules `trade` at `time`.
    pub fn new(trade: Trade, time: DateTime<Utc>) -> Self {
        Self {
            trade,
            time,
            outcome: Cell::new(None),
        }
    }

    /// Returns the scheduled trade.
    pub fn trade(&self) -> &Trade {
        &self.trade
    }

    /// Returns what happened to the trade, once processed.
    pub fn outcome(&self) -> Option<TradeOutcome> {
        self.outcome.get()
    }
}

impl Event for TradeEvent {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn is_processed(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// A trade rejected by compliance still counts as processed.
    fn process(&self, market: &mut Market, portfolios: &mut Portfolios) -> Result<()> {
        let outcome = self.trade.execute(portfolios, market)?;
        self.outcome.set(Some(outcome));
        Ok(())
    }
}
