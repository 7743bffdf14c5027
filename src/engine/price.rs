use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unit of measurement for prices, values, rates and weights.
///
/// A price is either valid (it carries a number, possibly `0.0`) or invalid
/// (no data yet). Every computation that reads an invalid price must itself
/// produce an invalid price instead of silently using zero.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Price(Option<f64>);

impl Price {
    /// A price with no data behind it.
    pub const INVALID: Price = Price(None);

    /// The constant price of one unit of cash.
    pub const UNIT: Price = Price(Some(1.0));

    /// Creates a valid price.
    pub fn new(value: f64) -> Self {
        Self(Some(value))
    }

    /// Returns true if the price carries a number.
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Returns the number behind a valid price.
    pub fn get(&self) -> Option<f64> {
        self.0
    }

    /// Returns the number behind the price, `0.0` when invalid.
    pub fn amount(&self) -> f64 {
        self.0.unwrap_or(0.0)
    }

    /// Applies `f` to a valid price; an invalid price stays invalid.
    pub fn map<F: FnOnce(f64) -> f64>(self, f: F) -> Self {
        Self(self.0.map(f))
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Option<f64>> for Price {
    fn from(value: Option<f64>) -> Self {
        Self(value)
    }
}

/// Invalid prices render as `NA` (width and alignment apply, precision does not);
/// valid ones honour width and precision.
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NA: &str = "NA";
        let Some(value) = self.0 else {
            let width = f.width().unwrap_or(0);
            return match f.align() {
                Some(fmt::Alignment::Left) => write!(f, "{NA:<width$}"),
                Some(fmt::Alignment::Center) => write!(f, "{NA:^width$}"),
                _ => write!(f, "{NA:>width$}"),
            };
        };
        fmt::Display::fmt(&value, f)
    }
}
