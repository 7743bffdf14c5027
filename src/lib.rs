//! # PBT: Portfolio BackTesting on discrete events
//!
//! **PBT** is a Rust library for replaying time-stamped market events (price ticks, FX rate
//! changes, pre-built trades) against one or more multi-currency portfolios.
//! A strategy reacts to every timestamp with trades, which are checked against compliance
//! rules on a speculative copy of the portfolio before a broker settles them.
//!
//! ## Why PBT?
//! - **Deterministic**: events are applied strictly in timestamp order, and all events sharing a
//!   timestamp are applied before the strategy is consulted.
//! - **Multi-currency**: portfolios are valued in their base currency through a shared FX table
//!   that resolves direct, inverse and equivalent pairs.
//! - **Explicit data gaps**: a missing price or FX rate makes a value *invalid* instead of zero,
//!   so gaps in historical data never abort a run.
//! - **Extensible**: assets, compliance rules, brokers and strategies are traits.
//!
//! ## Core Components
//! | Component          | Description                                                                          |
//! |--------------------|--------------------------------------------------------------------------------------|
//! | **`Price`**        | An optional value: valid (possibly `0.0`) or invalid (no data yet).                  |
//! | **`Market`**       | The asset arena (`Security`, `Cash`, ...) and the shared `FxRates` table.            |
//! | **`Portfolio`**    | Positions, valuation, weights, compliance rules, broker and snapshot history.       |
//! | **`ComplianceRule`** | `UnitLimit`, `WeightLimit` or any `CustomRule`.                                    |
//! | **`Broker`**       | An execution strategy followed by a charges strategy.                               |
//! | **`Trade`**        | A proposed unit change: compliance pre-check, then execution.                       |
//! | **`EventQueue`**   | Time-ordered events, released one timestamp group at a time.                        |
//! | **`Backtest`**     | The run loop: events, strategy, trades, snapshots.                                  |
//!
//! ## Features
//! ### 1. **Execution & Charges**
//! | Strategy                              | Description                                                      |
//! |---------------------------------------|------------------------------------------------------------------|
//! | **`FillAtLast`**                      | Fills at the last price.                                         |
//! | **`FillAtLastWithSlippage`**          | Fills at the last price moved against the portfolio by a rate.  |
//! | **`NoCharges`**                       | No fees.                                                         |
//! | **`FixedRatePlusPercentageCharges`**  | A flat fee plus a share of the trade value, in any currency.    |
//!
//! ### 2. **History Export**
//! - `export` *(default)*: write the run history as CSV, with `NA` for invalid values.
//! - `serde`: serialize value types and build a JSON history report.
//!
//! ## Getting Started
//! ```rust
//! use std::rc::Rc;
//!
//! use chrono::{DateTime, TimeZone, Utc};
//! use pbt_rs::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut bt = Backtest::new(NoTrades);
//!     let stock = bt.add_asset(Security::new("ZZB AU", "AUD")?)?;
//!
//!     let mut portfolio = Portfolio::new("XXX", "AUD")?;
//!     portfolio.transfer(Currency::new("AUD")?, 1_000.0);
//!     let id = bt.add_portfolio(portfolio)?;
//!
//!     // buy 100 shares whenever the stock trades at or below 2.00
//!     let mut bt = bt.with_strategy(move |_: DateTime<Utc>, market: &Market, _: &Portfolios| -> Result<Vec<Trade>> {
//!         Ok(match market.get(stock)?.price().get() {
//!             Some(price) if price <= 2.0 => vec![Trade::new(id, stock, 100.0)],
//!             _ => Vec::new(),
//!         })
//!     });
//!
//!     for (day, price) in [(13, 2.1), (14, 2.0), (15, 2.5)] {
//!         let time = Utc.with_ymd_and_hms(2021, 3, day, 0, 0, 0).unwrap();
//!         bt.add_event(Rc::new(AssetPriceEvent::new(stock, time, price)));
//!     }
//!     bt.run()?;
//!
//!     let portfolio = bt.portfolio(id)?;
//!     assert_eq!(portfolio.units(stock), 100.0);
//!     assert_eq!(portfolio.value(bt.market())?, Price::new(1_050.0));
//!     println!("{}", portfolio.show(bt.market())?);
//!     Ok(())
//! }
//! ```
//!
//! ### Output:
//! ```bash
//! ---Portfolio('XXX')---
//! AUD        800.00
//! ZZB AU     100.00
//! ```
//!
//! ## Logging
//! The library emits [`tracing`](https://crates.io/crates/tracing) events (run start and end,
//! event groups, executed and rejected trades). Install any subscriber to see them.
//!
//! ## Error Handling
//! PBT uses one error type for:
//! - Malformed currency codes and pairs.
//! - Missing prerequisites (zero FX rate, zero portfolio value, missing broker).
//! - Duplicate registrations (codes and tickers, FX pairs).
//!
//! Missing prices and FX rates are **not** errors: they surface as invalid [`engine::Price`]s.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core simulation components: market data, portfolios, trades, events and the run loop.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Utility functions and helpers.
mod utils;

/// History export: CSV files and JSON reports.
#[cfg(any(feature = "export", feature = "serde"))]
pub mod export;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::engine::*;
    pub use crate::errors::*;

    #[cfg(any(feature = "export", feature = "serde"))]
    pub use crate::export::*;
}

use std::ops::{Mul, Sub};

/// Trait for rate-based calculations on amounts.
///
/// Rates are fractions: `0.02` is 2%.
pub trait RateCalculus<Rhs = Self> {
    /// Increases the amount by a rate.
    ///
    /// ### Arguments
    /// * `rate` - The rate to add (e.g., 0.02 for 2%).
    ///
    /// ### Returns
    /// `self × (1 + rate)`.
    fn markup(self, rate: Rhs) -> Self;

    /// Decreases the amount by a rate.
    ///
    /// ### Arguments
    /// * `rate` - The rate to remove (e.g., 0.02 for 2%).
    ///
    /// ### Returns
    /// `self × (1 - rate)`.
    fn markdown(self, rate: Rhs) -> Self;

    /// Returns the share of the amount given by a rate.
    fn portion(self, rate: Rhs) -> Self;

    /// Calculates the relative change between two amounts.
    ///
    /// ### Arguments
    /// * `new` - The new amount to compare with.
    ///
    /// ### Returns
    /// The change as a fraction of the original amount.
    fn change(self, new: Self) -> Self;
}

impl RateCalculus for f64 {
    fn markup(self, rate: Self) -> Self {
        self.mul(1.0 + rate)
    }

    fn markdown(self, rate: Self) -> Self {
        self.mul(1.0 - rate)
    }

    fn portion(self, rate: Self) -> Self {
        self.mul(rate)
    }

    fn change(self, new: Self) -> Self {
        new.sub(self) / self
    }
}

#[cfg(test)]
mod rate {
    use super::*;

    #[test]
    fn markup() {
        assert_eq!(255.0, 250.0_f64.markup(0.02))
    }

    #[test]
    fn markdown() {
        assert_eq!(245.0, 250.0_f64.markdown(0.02))
    }

    #[test]
    fn portion() {
        assert_eq!(2.5, 250.0_f64.portion(0.01))
    }

    #[test]
    fn change() {
        assert_eq!(0.25, 100.0_f64.change(125.0))
    }

    #[test]
    fn markup_of_a_debit_grows_the_debit() {
        assert_eq!(-255.0, (-250.0_f64).markup(0.02))
    }
}
