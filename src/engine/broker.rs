use std::fmt;

use tracing::warn;

use crate::{
    RateCalculus,
    engine::{Currency, FxPair, Market, Portfolio, Trade},
    errors::{Error, Result},
};

/// How a broker charges for a trade.
pub trait ChargesStrategy: fmt::Debug {
    /// Debits the charges for `trade` from `portfolio`.
    fn charge(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()>;
}

/// How a broker fills a trade.
pub trait ExecutionStrategy: fmt::Debug {
    /// Moves the traded units and the consideration in `portfolio`.
    fn execute(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()>;
}

/// An executing broker: an execution strategy followed by a charges strategy.
///
/// The broker acts on the portfolio it is handed, which is either the real
/// portfolio or a speculative copy during a compliance pre-check.
#[derive(Debug)]
pub struct Broker {
    charges: Box<dyn ChargesStrategy>,
    execution: Box<dyn ExecutionStrategy>,
}

impl Default for Broker {
    /// No charges, filled at the last price.
    fn default() -> Self {
        Self::new(NoCharges, FillAtLast)
    }
}

impl Broker {
    /// Creates a broker from its two strategies.
    pub fn new<C, E>(charges: C, execution: E) -> Self
    where
        C: ChargesStrategy + 'static,
        E: ExecutionStrategy + 'static,
    {
        Self {
            charges: Box::new(charges),
            execution: Box::new(execution),
        }
    }

    /// Fills `trade` then applies the charges.
    ///
    /// ### Returns
    /// The execution error, in which case no charges are applied, or the charges error.
    pub fn execute(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()> {
        self.execution.execute(trade, portfolio, market)?;
        self.charges.charge(trade, portfolio, market)
    }
}

/// Leaves portfolio cash untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoCharges;

impl ChargesStrategy for NoCharges {
    fn charge(&self, _trade: &Trade, _portfolio: &mut Portfolio, _market: &Market) -> Result<()> {
        Ok(())
    }
}

/// A fixed amount plus a percentage of the trade value, debited in a chosen currency.
///
/// When no rate converts the trade currency into the charge currency yet, only the
/// fixed amount is debited.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedRatePlusPercentageCharges {
    fixed_amount: f64,
    percentage: f64,
    currency: Currency,
}

impl FixedRatePlusPercentageCharges {
    /// Creates the charges.
    ///
    /// ### Arguments
    /// * `fixed_amount` - Flat charge per trade, sign ignored.
    /// * `percentage` - Fraction of the trade value (e.g. `0.01` for 1%), sign ignored.
    /// * `currency` - Currency of the cash position the charges are taken from.
    ///
    /// ### Returns
    /// The charges, or [`Error::InvalidCurrency`].
    pub fn new(fixed_amount: f64, percentage: f64, currency: &str) -> Result<Self> {
        Ok(Self {
            fixed_amount,
            percentage,
            currency: Currency::new(currency)?,
        })
    }

    /// Flat fee per trade.
    pub fn fixed_amount(&self) -> f64 {
        self.fixed_amount
    }

    /// Share of the trade value, as a rate.
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Currency the charges are debited in.
    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl ChargesStrategy for FixedRatePlusPercentageCharges {
    fn charge(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()> {
        let Some(value) = trade.local_currency_value(market)?.get() else {
            return Err(Error::InvalidTradeValue(trade.ticker(market)?));
        };

        let pair = FxPair::new(trade.currency(market)?, self.currency);
        portfolio.transfer(self.currency, -self.fixed_amount.abs());
        match market.fx_rates().rate(pair)? {
            Some(rate) => portfolio.transfer(self.currency, -(value * rate).portion(self.percentage).abs()),
            None => warn!(%pair, portfolio = portfolio.code(), "no fx rate, percentage charge skipped"),
        }
        Ok(())
    }
}

/// Fills at the last price: the consideration is the trade's local-currency value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillAtLast;

impl ExecutionStrategy for FillAtLast {
    fn execute(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()> {
        let consideration = consideration(trade, market)?;
        portfolio.trade(trade.holding(), trade.units(), trade.currency(market)?, consideration);
        Ok(())
    }
}

/// Fills at the last price, moved against the portfolio by a slippage rate.
///
/// Buys pay `consideration × (1 + slippage)`, sells receive `consideration × (1 - slippage)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillAtLastWithSlippage {
    slippage: f64,
}

impl FillAtLastWithSlippage {
    /// Creates the strategy.
    ///
    /// ### Arguments
    /// * `slippage` - Fraction of the consideration lost on each fill (e.g. `0.02` for 2%).
    ///
    /// ### Returns
    /// The strategy, or [`Error::InvalidSlippage`] for negative or non-finite rates.
    pub fn new(slippage: f64) -> Result<Self> {
        if !slippage.is_finite() || slippage < 0.0 {
            return Err(Error::InvalidSlippage(slippage));
        }
        Ok(Self { slippage })
    }

    /// Slippage rate.
    pub fn slippage(&self) -> f64 {
        self.slippage
    }
}

impl ExecutionStrategy for FillAtLastWithSlippage {
    fn execute(&self, trade: &Trade, portfolio: &mut Portfolio, market: &Market) -> Result<()> {
        let consideration = consideration(trade, market)?;
        let consideration = if consideration < 0.0 {
            consideration.markup(self.slippage)
        } else {
            consideration.markdown(self.slippage)
        };
        portfolio.trade(trade.holding(), trade.units(), trade.currency(market)?, consideration);
        Ok(())
    }
}

fn consideration(trade: &Trade, market: &Market) -> Result<f64> {
    match trade.local_currency_consideration(market)?.get() {
        Some(consideration) => Ok(consideration),
        None => Err(Error::InvalidConsideration(trade.ticker(market)?)),
    }
}
