use std::fmt;

use super::asset::holding_key;
use crate::{
    engine::{Holding, Market, Portfolio},
    errors::Result,
};

/// A predicate over a portfolio.
///
/// Rules are not bound to a portfolio: they are evaluated against whichever portfolio
/// they are handed, which lets the same instance judge the speculative post-trade copy.
/// `Ok(false)` is a breach; `Err` is a failure of the rule itself.
pub trait ComplianceRule: fmt::Debug {
    /// Returns true if `portfolio` satisfies the rule.
    fn passes(&self, portfolio: &Portfolio, market: &Market) -> Result<bool>;
}

/// Caps the units held in one holding.
///
/// Only the signed value is bounded, so short positions always pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitLimit {
    holding: Holding,
    limit: f64,
}

impl UnitLimit {
    /// Creates a unit limit on `holding`.
    pub fn new(holding: impl Into<Holding>, limit: f64) -> Self {
        Self {
            holding: holding_key(holding),
            limit,
        }
    }

    /// Returns the limited holding.
    pub fn holding(&self) -> Holding {
        self.holding
    }

    /// Returns the maximum long units.
    pub fn limit(&self) -> f64 {
        self.limit
    }
}

impl ComplianceRule for UnitLimit {
    fn passes(&self, portfolio: &Portfolio, _market: &Market) -> Result<bool> {
        Ok(portfolio.units(self.holding) <= self.limit)
    }
}

/// Caps the absolute portfolio weight of one holding.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightLimit {
    holding: Holding,
    limit: f64,
}

impl WeightLimit {
    /// Creates a weight limit on `holding`; the sign of `limit` is ignored.
    pub fn new(holding: impl Into<Holding>, limit: f64) -> Self {
        Self {
            holding: holding_key(holding),
            limit,
        }
    }

    /// Returns the limited holding.
    pub fn holding(&self) -> Holding {
        self.holding
    }

    /// Returns the maximum weight.
    pub fn limit(&self) -> f64 {
        self.limit
    }
}

impl ComplianceRule for WeightLimit {
    /// Fails without error while the weight cannot be determined (missing price or
    /// FX rate). Valuation errors, such as a zero portfolio value, propagate.
    fn passes(&self, portfolio: &Portfolio, market: &Market) -> Result<bool> {
        let weight = portfolio.weight(self.holding, market)?;
        Ok(match weight.get() {
            Some(weight) => weight.abs() <= self.limit.abs(),
            None => false,
        })
    }
}

/// A named rule backed by a closure.
pub struct CustomRule<F> {
    name: String,
    check: F,
}

impl<F> CustomRule<F>
where
    F: Fn(&Portfolio, &Market) -> Result<bool>,
{
    /// Wraps `check` as a compliance rule. `name` only shows up in debug output.
    pub fn new(name: &str, check: F) -> Self {
        Self {
            name: name.to_owned(),
            check,
        }
    }

    /// Returns the rule name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for CustomRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule").field("name", &self.name).finish()
    }
}

impl<F> ComplianceRule for CustomRule<F>
where
    F: Fn(&Portfolio, &Market) -> Result<bool>,
{
    fn passes(&self, portfolio: &Portfolio, market: &Market) -> Result<bool> {
        (self.check)(portfolio, market)
    }
}
