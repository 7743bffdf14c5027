use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{Currency, Price},
    errors::Result,
    utils::clean_string,
};

/// Read-only view of a price-bearing asset.
///
/// Implementors only need to report their identity and current price/value;
/// history and position bookkeeping live in the [`Market`](crate::engine::Market)
/// and in portfolios.
pub trait Asset: fmt::Debug {
    /// Returns the ticker, already cleaned (trimmed and upper-cased).
    fn ticker(&self) -> &str;

    /// Returns the currency the asset is priced in.
    fn base_currency(&self) -> Currency;

    /// Returns the last price.
    fn price(&self) -> Price;

    /// Returns the value of one unit (price × multiplier).
    fn value(&self) -> Price;

    /// Returns true for cash, which is held by currency rather than by asset handle.
    fn is_cash(&self) -> bool {
        false
    }

    /// Returns the write capability, or `None` for fixed-price assets such as cash.
    fn as_set_price(&mut self) -> Option<&mut dyn SetPrice> {
        None
    }
}

/// Write capability for anything whose price can move.
pub trait SetPrice {
    /// Sets a new price. Implementors must revalue immediately.
    fn set_price(&mut self, price: Price);
}

/// Stable handle of an asset stored in a [`Market`](crate::engine::Market).
///
/// The handle of a cash asset remembers its currency, so it converts to the same
/// [`Holding::Cash`] position as the currency itself.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId {
    index: usize,
    cash: Option<Currency>,
}

impl AssetId {
    pub(crate) fn new(index: usize, cash: Option<Currency>) -> Self {
        Self { index, cash }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Returns the currency of a cash asset.
    pub fn cash_currency(&self) -> Option<Currency> {
        self.cash
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Key of a portfolio position.
///
/// Cash is identified by its currency, so two cash holdings of the same currency are
/// the same position. Every other asset is identified by its market handle.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Holding {
    /// Cash in a currency.
    Cash(Currency),
    /// Any asset stored in the market.
    Asset(AssetId),
}

impl Holding {
    /// Maps a cash asset handle to its currency; every other holding is returned as is.
    pub fn resolve(self) -> Self {
        match self {
            Self::Asset(AssetId { cash: Some(currency), .. }) => Self::Cash(currency),
            holding => holding,
        }
    }
}

/// Converts anything naming a holding into its position key.
pub(crate) fn holding_key(holding: impl Into<Holding>) -> Holding {
    let holding: Holding = holding.into();
    holding.resolve()
}

impl From<AssetId> for Holding {
    fn from(value: AssetId) -> Self {
        Self::Asset(value).resolve()
    }
}

impl From<Currency> for Holding {
    fn from(value: Currency) -> Self {
        Self::Cash(value)
    }
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cash(currency) => write!(f, "{currency}"),
            Self::Asset(id) => write!(f, "{id}"),
        }
    }
}

/// A generic priced asset: a stock, a future, anything with a multiplier.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Security {
    ticker: String,
    base_currency: Currency,
    multiplier: f64,
    price: Price,
    value: Price,
}

impl Security {
    /// Creates a security with a multiplier of 1.0, e.g. a stock.
    ///
    /// ### Arguments
    /// * `ticker` - Asset code, cleaned (trim + uppercase).
    /// * `base_currency` - Currency the asset is priced in.
    ///
    /// ### Returns
    /// The security without a price, or an error if the currency is malformed.
    pub fn new(ticker: &str, base_currency: &str) -> Result<Self> {
        Self::with_multiplier(ticker, base_currency, 1.0)
    }

    /// Creates a security whose value is `price × multiplier`.
    pub fn with_multiplier(ticker: &str, base_currency: &str, multiplier: f64) -> Result<Self> {
        Ok(Self {
            ticker: clean_string(ticker),
            base_currency: Currency::new(base_currency)?,
            multiplier,
            price: Price::INVALID,
            value: Price::INVALID,
        })
    }

    /// Returns the multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn revalue(&mut self) {
        let multiplier = self.multiplier;
        self.value = self.price.map(|price| price * multiplier);
    }
}

impl Asset for Security {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn base_currency(&self) -> Currency {
        self.base_currency
    }

    fn price(&self) -> Price {
        self.price
    }

    fn value(&self) -> Price {
        self.value
    }

    fn as_set_price(&mut self) -> Option<&mut dyn SetPrice> {
        Some(self)
    }
}

impl SetPrice for Security {
    fn set_price(&mut self, price: Price) {
        self.price = price;
        self.revalue();
    }
}

/// Cash: priced at 1.0 in its own currency, ticker equal to the currency code.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cash {
    currency: Currency,
}

impl Cash {
    /// Creates cash in `currency`.
    pub fn new(currency: &str) -> Result<Self> {
        Ok(Self {
            currency: Currency::new(currency)?,
        })
    }

    /// Returns the cash currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns the position key of this cash.
    pub fn holding(&self) -> Holding {
        Holding::Cash(self.currency)
    }
}

impl From<Currency> for Cash {
    fn from(currency: Currency) -> Self {
        Self { currency }
    }
}

impl Asset for Cash {
    fn ticker(&self) -> &str {
        self.currency.as_str()
    }

    fn base_currency(&self) -> Currency {
        self.currency
    }

    fn price(&self) -> Price {
        Price::UNIT
    }

    fn value(&self) -> Price {
        Price::UNIT
    }

    fn is_cash(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[test]
fn new_security_has_no_price() {
    let stock = Security::new(" zzb au ", "aud").unwrap();
    assert_eq!(stock.ticker(), "ZZB AU");
    assert_eq!(stock.base_currency().as_str(), "AUD");
    assert_eq!(stock.multiplier(), 1.0);
    assert!(!stock.price().is_valid());
    assert!(!stock.value().is_valid());
}

#[cfg(test)]
#[test]
fn set_price_revalues() {
    let mut future = Security::with_multiplier("AP1", "AUD", 25.0).unwrap();
    future.set_price(Price::new(7000.0));
    assert_eq!(future.price(), Price::new(7000.0));
    assert_eq!(future.value(), Price::new(175_000.0));

    future.set_price(Price::INVALID);
    assert!(!future.value().is_valid());
}

#[cfg(test)]
#[test]
fn security_rejects_bad_currency() {
    assert!(Security::new("ZZB AU", "AUDX").is_err());
    assert!(Cash::new("AU").is_err());
}

#[cfg(test)]
#[test]
fn cash_is_a_fixed_unit_price() {
    let mut cash = Cash::new("usd").unwrap();
    assert_eq!(cash.ticker(), "USD");
    assert_eq!(cash.price(), Price::UNIT);
    assert_eq!(cash.value(), Price::UNIT);
    assert!(cash.is_cash());
    assert!(cash.as_set_price().is_none());
    assert_eq!(cash.holding(), Holding::Cash(Currency::new("USD").unwrap()));
}

#[cfg(test)]
#[test]
fn cash_handle_is_its_currency() {
    let aud = Currency::new("AUD").unwrap();
    let cash = AssetId::new(0, Some(aud));
    let stock = AssetId::new(1, None);
    assert_eq!(Holding::from(cash), Holding::Cash(aud));
    assert_eq!(Holding::Asset(cash).resolve(), Holding::Cash(aud));
    assert_eq!(Holding::from(stock), Holding::Asset(stock));
    assert_eq!(cash.to_string(), "#0");
}
