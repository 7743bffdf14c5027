use tracing::{debug, warn};

use super::asset::holding_key;
use crate::{
    engine::{Currency, Holding, Market, PortfolioId, Portfolios, Price},
    errors::{Error, Result},
    utils::sgn,
};

/// Result of [`Trade::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// The broker filled the trade.
    Executed,
    /// A compliance rule would be breached; nothing was changed.
    Rejected,
}

/// A proposed change of units of one holding in one portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    portfolio: PortfolioId,
    holding: Holding,
    units: f64,
}

impl Trade {
    /// Proposes trading `units` (positive to buy, negative to sell) of `holding`.
    pub fn new(portfolio: PortfolioId, holding: impl Into<Holding>, units: f64) -> Self {
        Self {
            portfolio,
            holding: holding_key(holding),
            units,
        }
    }

    /// Returns the trading portfolio.
    pub fn portfolio(&self) -> PortfolioId {
        self.portfolio
    }

    /// Returns the traded holding.
    pub fn holding(&self) -> Holding {
        self.holding
    }

    /// Returns the traded units; negative for sells.
    pub fn units(&self) -> f64 {
        self.units
    }

    /// Returns the traded asset's ticker.
    pub fn ticker(&self, market: &Market) -> Result<String> {
        market.ticker(self.holding)
    }

    /// Returns the currency the consideration is settled in: the traded asset's base currency.
    pub fn currency(&self, market: &Market) -> Result<Currency> {
        Ok(market.quote(self.holding)?.0)
    }

    /// Returns the settlement cash holding.
    pub fn base_currency_cash(&self, market: &Market) -> Result<Holding> {
        Ok(Holding::Cash(self.currency(market)?))
    }

    /// Returns `|units| × asset value`, invalid while the asset has no valid value.
    pub fn local_currency_value(&self, market: &Market) -> Result<Price> {
        let units = self.units.abs();
        Ok(market.quote(self.holding)?.1.map(|value| value * units))
    }

    /// Returns the cash moved by the trade: negative for buys, positive for sells.
    pub fn local_currency_consideration(&self, market: &Market) -> Result<Price> {
        let sign = sgn(self.units);
        Ok(self.local_currency_value(market)?.map(|value| -sign * value))
    }

    /// Checks the trade against the portfolio's compliance rules without touching it.
    ///
    /// The trade is executed by the portfolio's broker on a speculative copy, and the
    /// rules are evaluated on that copy. A portfolio without rules always passes.
    ///
    /// ### Returns
    /// [`Error::NoBroker`] when rules are attached but no broker is assigned; broker and
    /// rule errors propagate.
    pub fn passes_compliance(&self, portfolios: &Portfolios, market: &Market) -> Result<bool> {
        let portfolio = portfolios.get(self.portfolio)?;
        if portfolio.num_rules() == 0 {
            return Ok(true);
        }

        let mut copy = portfolio.copy();
        let broker = copy
            .broker()
            .ok_or_else(|| Error::NoBroker(copy.code().to_owned()))?;
        broker.execute(self, &mut copy, market)?;
        copy.passes_compliance(market)
    }

    /// Executes the trade through the portfolio's broker if it passes compliance.
    ///
    /// A compliance breach is not an error: the trade is [`TradeOutcome::Rejected`] and
    /// nothing changes.
    pub fn execute(&self, portfolios: &mut Portfolios, market: &Market) -> Result<TradeOutcome> {
        if !self.passes_compliance(portfolios, market)? {
            warn!(
                portfolio = %self.portfolio,
                holding = %self.holding,
                units = self.units,
                "trade rejected by compliance"
            );
            return Ok(TradeOutcome::Rejected);
        }

        let portfolio = portfolios.get_mut(self.portfolio)?;
        let broker = portfolio
            .broker()
            .ok_or_else(|| Error::NoBroker(portfolio.code().to_owned()))?;
        broker.execute(self, portfolio, market)?;
        debug!(
            portfolio = portfolio.code(),
            holding = %self.holding,
            units = self.units,
            "trade executed"
        );
        Ok(TradeOutcome::Executed)
    }
}
