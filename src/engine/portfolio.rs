use std::{collections::BTreeMap, fmt, rc::Rc};

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::asset::holding_key;
use crate::{
    engine::{Broker, ComplianceRule, Currency, FxPair, Holding, Market, Position, Price},
    errors::{Error, Result},
};

/// Per-holding weights (or values) of a portfolio.
pub type Weights = BTreeMap<Holding, Price>;

/// Snapshot history keyed by timestamp.
pub type PortfolioHistory = BTreeMap<DateTime<Utc>, PortfolioSnapshot>;

/// Point-in-time capture of a portfolio: value, weights and units per holding.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    timestamp: DateTime<Utc>,
    value: Price,
    weights: Weights,
    units: BTreeMap<Holding, f64>,
}

impl PortfolioSnapshot {
    /// Returns the snapshot time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the portfolio value in base currency.
    pub fn value(&self) -> Price {
        self.value
    }

    /// Returns the weights of every held asset.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Returns the weight of one holding, if it was held.
    pub fn weight(&self, holding: Holding) -> Option<Price> {
        self.weights.get(&holding).copied()
    }

    /// Returns the units of one holding, `0.0` if it was not held.
    pub fn units(&self, holding: Holding) -> f64 {
        self.units.get(&holding).copied().unwrap_or(0.0)
    }

    /// Returns the units of every position, flat ones included.
    pub fn holdings(&self) -> &BTreeMap<Holding, f64> {
        &self.units
    }
}

/// Stable handle of a portfolio stored in [`Portfolios`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortfolioId(pub(crate) usize);

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena of portfolios addressed by [`PortfolioId`].
#[derive(Debug, Default)]
pub struct Portfolios {
    items: Vec<Portfolio>,
}

impl Portfolios {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a portfolio and returns its handle.
    pub fn insert(&mut self, portfolio: Portfolio) -> PortfolioId {
        self.items.push(portfolio);
        PortfolioId(self.items.len() - 1)
    }

    /// Returns the portfolio behind `id`.
    pub fn get(&self, id: PortfolioId) -> Result<&Portfolio> {
        self.items.get(id.0).ok_or(Error::PortfolioNotFound(id))
    }

    /// Returns the portfolio behind `id` for writing.
    pub fn get_mut(&mut self, id: PortfolioId) -> Result<&mut Portfolio> {
        self.items.get_mut(id.0).ok_or(Error::PortfolioNotFound(id))
    }

    /// Returns true if `id` belongs to this arena.
    pub fn contains(&self, id: PortfolioId) -> bool {
        id.0 < self.items.len()
    }

    /// Returns an iterator over handles and portfolios.
    pub fn iter(&self) -> impl Iterator<Item = (PortfolioId, &Portfolio)> + '_ {
        self.items.iter().enumerate().map(|(i, p)| (PortfolioId(i), p))
    }

    /// Returns the number of stored portfolios.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Base-currency values of held positions and whether all of them were determinable.
struct Valuation {
    valid: bool,
    total: f64,
    values: Vec<(Holding, Price)>,
}

/// A collection of positions valued in one base currency.
///
/// Positions, compliance rules, the broker handle and the snapshot history are owned
/// here and only change through the portfolio's own methods.
pub struct Portfolio {
    code: String,
    base_currency: Currency,
    positions: BTreeMap<Holding, Position>,
    rules: Vec<Rc<dyn ComplianceRule>>,
    broker: Option<Rc<Broker>>,
    history: PortfolioHistory,
}

impl fmt::Debug for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Portfolio")
            .field("code", &self.code)
            .field("base_currency", &self.base_currency)
            .field("positions", &self.positions)
            .field("rules", &self.rules.len())
            .field("broker", &self.broker.is_some())
            .field("snapshots", &self.history.len())
            .finish()
    }
}

impl Portfolio {
    /// Creates an empty portfolio.
    ///
    /// ### Arguments
    /// * `code` - Portfolio code, unique within a backtest (together with asset tickers).
    /// * `base_currency` - Currency the portfolio is valued in.
    ///
    /// ### Returns
    /// The portfolio, or [`Error::InvalidCurrency`].
    pub fn new(code: &str, base_currency: &str) -> Result<Self> {
        Ok(Self {
            code: code.trim().to_owned(),
            base_currency: Currency::new(base_currency)?,
            positions: BTreeMap::new(),
            rules: Vec::new(),
            broker: None,
            history: PortfolioHistory::new(),
        })
    }

    /// Assigns the executing broker.
    pub fn with_broker(mut self, broker: impl Into<Rc<Broker>>) -> Self {
        self.set_broker(broker);
        self
    }

    /// Attaches a compliance rule.
    pub fn with_rule<R: ComplianceRule + 'static>(mut self, rule: R) -> Self {
        self.add_rule(Rc::new(rule));
        self
    }

    /// Returns the portfolio code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the valuation currency.
    pub fn base_currency(&self) -> Currency {
        self.base_currency
    }

    /// Returns the executing broker, if any.
    pub fn broker(&self) -> Option<Rc<Broker>> {
        self.broker.clone()
    }

    /// Assigns the executing broker.
    pub fn set_broker(&mut self, broker: impl Into<Rc<Broker>>) {
        self.broker = Some(broker.into());
    }

    /// Attaches a compliance rule; attaching the same rule instance twice is a no-op.
    pub fn add_rule(&mut self, rule: Rc<dyn ComplianceRule>) {
        if !self.has_rule(&rule) {
            self.rules.push(rule);
        }
    }

    /// Returns true if this exact rule instance is attached.
    pub fn has_rule(&self, rule: &Rc<dyn ComplianceRule>) -> bool {
        self.rules.iter().any(|r| Rc::ptr_eq(r, rule))
    }

    /// Returns the number of attached rules.
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Returns the number of positions, flat ones included.
    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Returns an iterator over the positions, ordered by holding.
    pub fn positions(&self) -> impl Iterator<Item = &Position> + '_ {
        self.positions.values()
    }

    /// Returns true if the portfolio has a position (possibly flat) in `holding`.
    pub fn has_holding(&self, holding: impl Into<Holding>) -> bool {
        self.positions.contains_key(&holding_key(holding))
    }

    /// Returns the units held, `0.0` for holdings without a position.
    pub fn units(&self, holding: impl Into<Holding>) -> f64 {
        self.positions
            .get(&holding_key(holding))
            .map(Position::units)
            .unwrap_or(0.0)
    }

    /// Adds `units` to a position, creating it if needed. Negative units remove.
    pub fn transfer(&mut self, holding: impl Into<Holding>, units: f64) {
        let holding = holding_key(holding);
        self.positions
            .entry(holding)
            .and_modify(|position| position.increment(units))
            .or_insert_with(|| Position::from((holding, units)));
    }

    /// Settles a trade: moves `units` of the asset and `consideration` of cash.
    pub fn trade(&mut self, holding: impl Into<Holding>, units: f64, cash: Currency, consideration: f64) {
        self.transfer(holding, units);
        self.transfer(cash, consideration);
    }

    fn valuation(&self, market: &Market) -> Result<Valuation> {
        let mut valuation = Valuation {
            valid: true,
            total: 0.0,
            values: Vec::with_capacity(self.positions.len()),
        };

        for position in self.positions.values().filter(|p| p.units() != 0.0) {
            let local_value = position.value(market)?;
            let pair = FxPair::new(position.currency(market)?, self.base_currency);
            let rate = market.fx_rates().rate(pair)?;

            let value = match (local_value.get(), rate) {
                (Some(value), Some(rate)) => {
                    valuation.total += value * rate;
                    Price::new(value * rate)
                }
                _ => {
                    valuation.valid = false;
                    Price::INVALID
                }
            };
            valuation.values.push((position.holding(), value));
        }

        Ok(valuation)
    }

    /// Returns the portfolio value in base currency.
    ///
    /// The value is invalid if any position with non-zero units has no valid value or
    /// no available FX rate. An empty portfolio is worth exactly 0.0.
    pub fn value(&self, market: &Market) -> Result<Price> {
        let valuation = self.valuation(market)?;
        Ok(if valuation.valid {
            Price::new(valuation.total)
        } else {
            Price::INVALID
        })
    }

    /// Returns the portfolio value together with the weight of every held asset.
    ///
    /// When any position cannot be valued, the value and every weight are invalid.
    /// Otherwise each weight is the base-currency value of the position divided by
    /// the total.
    ///
    /// ### Returns
    /// [`Error::ZeroPortfolioValue`] when the total is exactly zero, because the
    /// weights are undefined; FX lookup errors propagate.
    pub fn value_and_weights(&self, market: &Market) -> Result<(Price, Weights)> {
        let Valuation { valid, total, values } = self.valuation(market)?;

        if !valid {
            let weights = values.into_iter().map(|(h, _)| (h, Price::INVALID)).collect();
            return Ok((Price::INVALID, weights));
        }
        if total == 0.0 {
            return Err(Error::ZeroPortfolioValue(self.code.clone()));
        }

        let weights = values.into_iter().map(|(h, value)| (h, value.map(|v| v / total))).collect();
        Ok((Price::new(total), weights))
    }

    /// Returns the weight of one holding; `0.0` if the (valued) portfolio does not hold it.
    pub fn weight(&self, holding: impl Into<Holding>, market: &Market) -> Result<Price> {
        let (value, weights) = self.value_and_weights(market)?;
        Ok(match weights.get(&holding_key(holding)) {
            Some(weight) => *weight,
            None if value.is_valid() => Price::new(0.0),
            None => Price::INVALID,
        })
    }

    /// Evaluates every attached rule against this portfolio.
    ///
    /// True only if every rule passes. A rule error stops the evaluation and is returned.
    pub fn passes_compliance(&self, market: &Market) -> Result<bool> {
        let mut passes = true;
        for rule in &self.rules {
            if !rule.passes(self, market)? {
                passes = false;
            }
        }
        Ok(passes)
    }

    /// Speculative deep copy: positions are copied, the rule list and broker are carried
    /// over as shared handles. The copy starts without history.
    pub fn copy(&self) -> Portfolio {
        Portfolio {
            code: self.code.clone(),
            base_currency: self.base_currency,
            positions: self.positions.clone(),
            rules: self.rules.clone(),
            broker: self.broker.clone(),
            history: PortfolioHistory::new(),
        }
    }

    /// Records a snapshot at `timestamp`.
    ///
    /// A portfolio worth exactly zero is recorded with a valid zero value and invalid
    /// weights instead of failing.
    pub fn take_snapshot(&mut self, timestamp: DateTime<Utc>, market: &Market) -> Result<()> {
        let (value, weights) = match self.value_and_weights(market) {
            Ok(valued) => valued,
            Err(Error::ZeroPortfolioValue(_)) => {
                let weights: Weights = self
                    .positions
                    .values()
                    .filter(|p| p.units() != 0.0)
                    .map(|p| (p.holding(), Price::INVALID))
                    .collect();
                if !weights.is_empty() {
                    warn!(portfolio = %self.code, %timestamp, "zero portfolio value, weights undefined");
                }
                (Price::new(0.0), weights)
            }
            Err(e) => return Err(e),
        };

        let units = self.positions.iter().map(|(h, p)| (*h, p.units())).collect();
        self.history.insert(
            timestamp,
            PortfolioSnapshot {
                timestamp,
                value,
                weights,
                units,
            },
        );
        Ok(())
    }

    /// Returns the snapshot history.
    pub fn history(&self) -> &PortfolioHistory {
        &self.history
    }

    /// Renders the positions as text, one `ticker units` line each, ordered by ticker.
    pub fn show(&self, market: &Market) -> Result<String> {
        let mut lines = self
            .positions
            .values()
            .map(|p| Ok((market.ticker(p.holding())?, p.units())))
            .collect::<Result<Vec<_>>>()?;
        lines.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = format!("---Portfolio('{}')---\n", self.code);
        for (ticker, units) in lines {
            out.push_str(&format!("{ticker:<10} {units:>6.2}\n"));
        }
        Ok(out)
    }
}
