//! Core simulation engine.
//!
//! This module provides the fundamental types for backtesting:
//! - `Price`, `Currency`, `FxPair`, `FxRates`: market data with explicit invalidity.
//! - `Market`: the asset arena and the shared FX table.
//! - `Portfolio`: positions, valuation, weights and snapshots.
//! - `ComplianceRule`, `Broker`, `Trade`: the trade pipeline.
//! - `Event`, `EventQueue`, `Backtest`: the discrete-event run loop.

mod asset;
mod broker;
mod compliance;
mod event;
mod fx;
mod market;
mod portfolio;
mod position;
mod price;
mod queue;
mod trade;

use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    errors::{Error, Result},
    utils::clean_string,
};

pub use asset::*;
pub use broker::*;
pub use compliance::*;
pub use event::*;
pub use fx::*;
pub use market::*;
pub use portfolio::*;
pub use position::*;
pub use price::*;
pub use queue::*;
pub use trade::*;

#[cfg(test)]
mod bts;

/// Generates trades once per event timestamp.
///
/// Called after every event of that timestamp has been applied, so the market and
/// the portfolios it observes are up to date.
pub trait Strategy {
    /// Returns the trades to execute at `time`, in order.
    fn generate_trades(&mut self, time: DateTime<Utc>, market: &Market, portfolios: &Portfolios) -> Result<Vec<Trade>>;
}

impl<F> Strategy for F
where
    F: FnMut(DateTime<Utc>, &Market, &Portfolios) -> Result<Vec<Trade>>,
{
    fn generate_trades(&mut self, time: DateTime<Utc>, market: &Market, portfolios: &Portfolios) -> Result<Vec<Trade>> {
        self(time, market, portfolios)
    }
}

/// A strategy that never trades: the backtest only replays the data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrades;

impl Strategy for NoTrades {
    fn generate_trades(&mut self, _time: DateTime<Utc>, _market: &Market, _portfolios: &Portfolios) -> Result<Vec<Trade>> {
        Ok(Vec::new())
    }
}

/// Lifecycle of a [`Backtest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Not run yet.
    #[default]
    Idle,
    /// Inside [`Backtest::run`].
    Running,
    /// The queue was drained.
    Done,
    /// The last run stopped on an error.
    Failed,
}

/// Discrete-event backtesting engine.
///
/// Events are replayed one timestamp at a time: every event of the group is processed,
/// then the strategy is asked for trades, which are executed in order, then every
/// registered asset and portfolio is snapshotted at that timestamp.
pub struct Backtest<S> {
    market: Market,
    portfolios: Portfolios,
    assets: Vec<AssetId>,
    registered: Vec<PortfolioId>,
    queue: EventQueue,
    strategy: S,
    snapshot_times: Vec<DateTime<Utc>>,
    state: RunState,
}

impl<S> std::fmt::Debug for Backtest<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtest")
            .field("market", &self.market)
            .field("portfolios", &self.portfolios)
            .field("assets", &self.assets)
            .field("registered", &self.registered)
            .field("queue", &self.queue.len())
            .field("snapshot_times", &self.snapshot_times.len())
            .field("state", &self.state)
            .finish()
    }
}

impl<S: Strategy> Backtest<S> {
    /// Creates a backtest over an empty market.
    pub fn new(strategy: S) -> Self {
        Self::with_market(Market::new(), strategy)
    }

    /// Creates a backtest over an existing market. Its assets are not registered.
    pub fn with_market(market: Market, strategy: S) -> Self {
        Self {
            market,
            portfolios: Portfolios::new(),
            assets: Vec::new(),
            registered: Vec::new(),
            queue: EventQueue::new(),
            strategy,
            snapshot_times: Vec::new(),
            state: RunState::Idle,
        }
    }

    /// Swaps the strategy, keeping the registrations and queued events.
    ///
    /// Strategies usually need the handles returned by registration, so they are
    /// typically plugged in once the assets and portfolios are in place.
    pub fn with_strategy<T: Strategy>(self, strategy: T) -> Backtest<T> {
        Backtest {
            market: self.market,
            portfolios: self.portfolios,
            assets: self.assets,
            registered: self.registered,
            queue: self.queue,
            strategy,
            snapshot_times: self.snapshot_times,
            state: self.state,
        }
    }

    /// Returns the market.
    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Returns the market for setup, such as registering FX rates.
    pub fn market_mut(&mut self) -> &mut Market {
        &mut self.market
    }

    /// Returns every stored portfolio, registered or not.
    pub fn portfolios(&self) -> &Portfolios {
        &self.portfolios
    }

    /// Returns the portfolios for setup.
    pub fn portfolios_mut(&mut self) -> &mut Portfolios {
        &mut self.portfolios
    }

    /// Returns the portfolio behind `id`.
    pub fn portfolio(&self, id: PortfolioId) -> Result<&Portfolio> {
        self.portfolios.get(id)
    }

    /// Returns the strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    fn code_registered(&self, code: &str) -> Result<bool> {
        let code = clean_string(code);
        for id in &self.registered {
            if clean_string(self.portfolios.get(*id)?.code()) == code {
                return Ok(true);
            }
        }
        for id in &self.assets {
            if clean_string(self.market.get(*id)?.ticker()) == code {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Stores an asset in the market and registers it.
    ///
    /// ### Returns
    /// The asset handle, or [`Error::DuplicateCode`] if the ticker is already used by a
    /// registered asset or portfolio (nothing is stored then).
    pub fn add_asset<A: Asset + 'static>(&mut self, asset: A) -> Result<AssetId> {
        if self.code_registered(asset.ticker())? {
            return Err(Error::DuplicateCode("asset ticker", asset.ticker().to_owned()));
        }
        let id = self.market.insert(asset);
        self.assets.push(id);
        debug!(asset = %id, "asset registered");
        Ok(id)
    }

    /// Registers an asset already stored in the market so it gets snapshotted.
    /// Registering the same asset again is a no-op.
    pub fn register_asset(&mut self, id: AssetId) -> Result<()> {
        if self.has_asset(id) {
            return Ok(());
        }
        let ticker = self.market.get(id)?.ticker().to_owned();
        if self.code_registered(&ticker)? {
            return Err(Error::DuplicateCode("asset ticker", ticker));
        }
        self.assets.push(id);
        debug!(asset = %id, %ticker, "asset registered");
        Ok(())
    }

    /// Stores a portfolio and registers it.
    ///
    /// A portfolio without a broker gets the default one (no charges, fill at last).
    ///
    /// ### Returns
    /// The portfolio handle, or [`Error::DuplicateCode`] if the code is already used by
    /// a registered asset or portfolio (nothing is stored then).
    pub fn add_portfolio(&mut self, portfolio: Portfolio) -> Result<PortfolioId> {
        if self.code_registered(portfolio.code())? {
            return Err(Error::DuplicateCode("portfolio code", portfolio.code().to_owned()));
        }
        let id = self.portfolios.insert(portfolio);
        self.register_portfolio(id)?;
        Ok(id)
    }

    /// Registers a portfolio already stored in [`Backtest::portfolios_mut`].
    /// Registering the same portfolio again is a no-op.
    pub fn register_portfolio(&mut self, id: PortfolioId) -> Result<()> {
        if self.has_portfolio(id) {
            return Ok(());
        }
        let code = self.portfolios.get(id)?.code().to_owned();
        if self.code_registered(&code)? {
            return Err(Error::DuplicateCode("portfolio code", code));
        }

        let portfolio = self.portfolios.get_mut(id)?;
        if portfolio.broker().is_none() {
            portfolio.set_broker(Broker::default());
        }
        self.registered.push(id);
        debug!(portfolio = %code, "portfolio registered");
        Ok(())
    }

    /// Returns true if the asset is registered.
    pub fn has_asset(&self, id: AssetId) -> bool {
        self.assets.contains(&id)
    }

    /// Returns true if the portfolio is registered.
    pub fn has_portfolio(&self, id: PortfolioId) -> bool {
        self.registered.contains(&id)
    }

    /// Returns the registered assets in registration order.
    pub fn asset_ids(&self) -> &[AssetId] {
        &self.assets
    }

    /// Returns the registered portfolios in registration order.
    pub fn portfolio_ids(&self) -> &[PortfolioId] {
        &self.registered
    }

    /// Queues an event. Queuing the same instance twice is a no-op.
    pub fn add_event(&mut self, event: Rc<dyn Event>) {
        self.queue.add(event);
    }

    /// Queues several events, in any order.
    pub fn add_events<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Rc<dyn Event>>,
    {
        for event in events {
            self.add_event(event);
        }
    }

    /// Returns the number of queued events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Returns the timestamps snapshotted by the last run, in processing order.
    pub fn snapshot_times(&self) -> &[DateTime<Utc>] {
        &self.snapshot_times
    }

    /// Runs the backtest until the event queue is empty.
    ///
    /// The run is fail-fast: the first error from an event, the strategy or a trade stops
    /// it and is returned, and mutations already applied stay in place.
    pub fn run(&mut self) -> Result<()> {
        self.state = RunState::Running;
        self.snapshot_times.clear();
        info!(
            events = self.queue.len(),
            assets = self.assets.len(),
            portfolios = self.registered.len(),
            "backtest started"
        );

        match self.run_loop() {
            Ok(()) => {
                self.state = RunState::Done;
                info!(snapshots = self.snapshot_times.len(), "backtest finished");
                Ok(())
            }
            Err(e) => {
                self.state = RunState::Failed;
                warn!(error = %e, snapshots = self.snapshot_times.len(), "backtest aborted");
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        while !self.queue.is_empty() {
            let (time, group) = self.queue.fetch_next_group()?;
            debug!(%time, events = group.len(), "processing event group");

            for event in &group {
                event.process(&mut self.market, &mut self.portfolios)?;
            }

            let trades = self.strategy.generate_trades(time, &self.market, &self.portfolios)?;
            for trade in &trades {
                trade.execute(&mut self.portfolios, &self.market)?;
            }

            self.take_snapshots(time)?;
        }
        Ok(())
    }

    fn take_snapshots(&mut self, time: DateTime<Utc>) -> Result<()> {
        for id in &self.assets {
            self.market.take_snapshot(*id, time)?;
        }
        for id in &self.registered {
            self.portfolios.get_mut(*id)?.take_snapshot(time, &self.market)?;
        }
        self.snapshot_times.push(time);
        Ok(())
    }
}
