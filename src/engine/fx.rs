use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    engine::{Price, SetPrice},
    errors::{Error, Result},
    utils::clean_string,
};

/// A validated three-letter currency code, e.g. `AUD`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency([u8; 3]);

impl Currency {
    /// Cleans (trim + uppercase) and validates a currency code.
    ///
    /// ### Returns
    /// The currency, or [`Error::InvalidCurrency`] unless exactly three letters remain.
    pub fn new(code: &str) -> Result<Self> {
        let code = clean_string(code);
        if code.len() != 3 || !code.bytes().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(Error::InvalidCurrency(code));
        }
        let bytes = code.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // only ASCII letters get past `new`
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.as_str())
    }
}

/// An ordered currency pair. `AUDUSD` quotes how many USD one AUD buys.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FxPair {
    base: Currency,
    quote: Currency,
}

impl FxPair {
    /// Builds a pair from two currencies.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Cleans and validates a six-letter pair such as `"audusd"`.
    pub fn parse(pair: &str) -> Result<Self> {
        let pair = clean_string(pair);
        if pair.len() != 6 || !pair.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(Error::InvalidFxPair(pair));
        }
        Ok(Self {
            base: Currency::new(&pair[..3])?,
            quote: Currency::new(&pair[3..])?,
        })
    }

    /// The currency being priced.
    pub fn base(&self) -> Currency {
        self.base
    }

    /// The currency the price is expressed in.
    pub fn quote(&self) -> Currency {
        self.quote
    }

    /// `AUDUSD` -> `USDAUD`.
    pub fn inverse(&self) -> Self {
        Self::new(self.quote, self.base)
    }

    /// True for pairs like `AUDAUD`, whose rate is always 1.0.
    pub fn is_equivalent(&self) -> bool {
        self.base == self.quote
    }
}

impl FromStr for FxPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FxPair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FxPair> for String {
    fn from(value: FxPair) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FxPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// Associates a currency pair with a rate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FxRate {
    pair: FxPair,
    rate: Price,
}

impl FxRate {
    /// Creates a new rate for `pair`.
    pub fn new(pair: FxPair, rate: Price) -> Self {
        Self { pair, rate }
    }

    /// Returns the pair.
    pub fn pair(&self) -> FxPair {
        self.pair
    }

    /// Returns the current rate.
    pub fn rate(&self) -> Price {
        self.rate
    }

    /// Updates the rate.
    pub fn set_rate(&mut self, rate: Price) {
        self.rate = rate;
    }
}

impl SetPrice for FxRate {
    fn set_price(&mut self, price: Price) {
        self.set_rate(price);
    }
}

/// The table of registered FX rates.
///
/// A pair and its inverse are never both registered: holding `AUDUSD`
/// implies `USDAUD = 1 / AUDUSD`. Equivalent pairs are never stored.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct FxRates {
    rates: Vec<FxRate>,
}

impl FxRates {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rate.
    ///
    /// ### Returns
    /// [`Error::DuplicateFxPair`] if the pair or its inverse is already registered,
    /// in which case the table is left untouched.
    pub fn register(&mut self, rate: FxRate) -> Result<()> {
        let pair = rate.pair();
        if pair.is_equivalent() {
            debug!(%pair, "equivalent pair is implicit, not registered");
            return Ok(());
        }
        if self.rates.iter().any(|r| r.pair() == pair || r.pair() == pair.inverse()) {
            return Err(Error::DuplicateFxPair(pair));
        }
        self.rates.push(rate);
        Ok(())
    }

    /// Sets the rate of a registered pair, registering it first if needed.
    pub fn set_rate(&mut self, pair: FxPair, rate: Price) -> Result<()> {
        if pair.is_equivalent() {
            return Ok(());
        }
        match self.rates.iter_mut().find(|r| r.pair() == pair) {
            Some(registered) => {
                registered.set_price(rate);
                Ok(())
            }
            None => self.register(FxRate::new(pair, rate)),
        }
    }

    /// Resolves the rate for `pair`.
    ///
    /// Equivalent pairs resolve to 1.0 without a lookup. Otherwise the direct pair is
    /// used as-is and the inverse pair is inverted. Unregistered pairs and pairs whose
    /// rate is invalid are not available (`Ok(None)`); a registered rate of exactly zero
    /// is an [`Error::ZeroFxRate`].
    pub fn rate(&self, pair: FxPair) -> Result<Option<f64>> {
        if pair.is_equivalent() {
            return Ok(Some(1.0));
        }

        let inverse = pair.inverse();
        for registered in &self.rates {
            let Some(rate) = registered.rate().get() else {
                continue;
            };
            if registered.pair() == pair || registered.pair() == inverse {
                if rate == 0.0 {
                    return Err(Error::ZeroFxRate(pair));
                }
                return Ok(Some(if registered.pair() == pair { rate } else { 1.0 / rate }));
            }
        }

        Ok(None)
    }

    /// Returns the registered entry for exactly `pair`.
    pub fn get(&self, pair: FxPair) -> Option<&FxRate> {
        self.rates.iter().find(|r| r.pair() == pair)
    }

    /// Returns an iterator over the registered rates.
    pub fn iter(&self) -> std::slice::Iter<'_, FxRate> {
        self.rates.iter()
    }

    /// Returns the number of registered pairs.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Returns true if no pair is registered.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(s: &str) -> FxPair {
        FxPair::parse(s).unwrap()
    }

    #[test]
    fn currency_validation() {
        assert_eq!(Currency::new(" aud ").unwrap().as_str(), "AUD");
        assert!(matches!(Currency::new("AUDX"), Err(Error::InvalidCurrency(c)) if c == "AUDX"));
        assert!(matches!(Currency::new("A1D"), Err(Error::InvalidCurrency(_))));
        assert!(matches!(Currency::new(""), Err(Error::InvalidCurrency(_))));
    }

    #[test]
    fn pair_validation() {
        let p = pair("audusd");
        assert_eq!(p.base().as_str(), "AUD");
        assert_eq!(p.quote().as_str(), "USD");
        assert_eq!(p.inverse().to_string(), "USDAUD");

        let err = FxPair::parse("AUDXAUD").unwrap_err();
        assert_eq!(err.to_string(), "expecting a six character currency pair, got 'AUDXAUD'");
        assert!(matches!(FxPair::parse("AUDUS"), Err(Error::InvalidFxPair(_))));
    }

    #[test]
    fn equivalent_pairs_need_no_registration() {
        let rates = FxRates::new();
        for code in ["AUD", "USD", "GBP", "JPY", "xau"] {
            let ccy = Currency::new(code).unwrap();
            let p = FxPair::new(ccy, ccy);
            assert!(p.is_equivalent());
            assert_eq!(rates.rate(p).unwrap(), Some(1.0));
        }
    }

    #[test]
    fn direct_and_inverse_lookup() {
        let mut rates = FxRates::new();
        assert_eq!(rates.rate(pair("AUDUSD")).unwrap(), None);

        rates.register(FxRate::new(pair("AUDUSD"), Price::new(0.75))).unwrap();
        assert_eq!(rates.rate(pair("AUDUSD")).unwrap(), Some(0.75));
        assert_eq!(rates.rate(pair("USDAUD")).unwrap(), Some(1.0 / 0.75));
        assert_eq!(rates.rate(pair("GBPUSD")).unwrap(), None);
    }

    #[test]
    fn pair_and_inverse_cannot_both_register() {
        let mut rates = FxRates::new();
        rates.register(FxRate::new(pair("AUDUSD"), Price::new(0.75))).unwrap();

        let dup = rates.register(FxRate::new(pair("AUDUSD"), Price::new(0.70)));
        assert!(matches!(dup, Err(Error::DuplicateFxPair(_))));
        let inv = rates.register(FxRate::new(pair("USDAUD"), Price::new(1.3)));
        assert_eq!(inv.unwrap_err().to_string(), "'USDAUD' fx rate instance already exists");

        assert_eq!(rates.len(), 1);
        assert_eq!(rates.rate(pair("AUDUSD")).unwrap(), Some(0.75));
    }

    #[test]
    fn zero_rate_is_an_error() {
        let mut rates = FxRates::new();
        rates.register(FxRate::new(pair("AUDUSD"), Price::new(0.0))).unwrap();
        assert!(matches!(rates.rate(pair("USDAUD")), Err(Error::ZeroFxRate(_))));
        assert!(matches!(rates.rate(pair("AUDUSD")), Err(Error::ZeroFxRate(_))));
    }

    #[test]
    fn invalid_rate_is_not_available() {
        let mut rates = FxRates::new();
        rates.register(FxRate::new(pair("AUDUSD"), Price::INVALID)).unwrap();
        assert_eq!(rates.rate(pair("AUDUSD")).unwrap(), None);
        assert_eq!(rates.rate(pair("USDAUD")).unwrap(), None);
    }

    #[test]
    fn set_rate_updates_or_registers() {
        let mut rates = FxRates::new();
        rates.set_rate(pair("AUDUSD"), Price::new(0.75)).unwrap();
        rates.set_rate(pair("AUDUSD"), Price::new(0.80)).unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates.get(pair("AUDUSD")).unwrap().rate(), Price::new(0.80));

        assert!(matches!(
            rates.set_rate(pair("USDAUD"), Price::new(1.25)),
            Err(Error::DuplicateFxPair(_))
        ));

        rates.set_rate(pair("AUDAUD"), Price::new(3.0)).unwrap();
        assert_eq!(rates.len(), 1);
    }
}
