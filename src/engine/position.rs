use crate::{
    engine::{Currency, Holding, Market, Price},
    errors::Result,
};

/// A holding of some units of one asset. Units may be negative (short / credit).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    holding: Holding,
    units: f64,
}

impl Position {
    /// Returns the held asset or currency.
    pub fn holding(&self) -> Holding {
        self.holding
    }

    /// Returns the units held; negative when short.
    pub fn units(&self) -> f64 {
        self.units
    }

    /// Adds units.
    pub fn increment(&mut self, units: f64) {
        self.units += units;
    }

    /// Removes units.
    pub fn decrement(&mut self, units: f64) {
        self.units -= units;
    }

    /// Currency the position is valued in before any FX conversion.
    pub fn currency(&self, market: &Market) -> Result<Currency> {
        Ok(market.quote(self.holding)?.0)
    }

    /// Local-currency value: asset value × units, invalid if the asset value is.
    pub fn value(&self, market: &Market) -> Result<Price> {
        let units = self.units;
        Ok(market.quote(self.holding)?.1.map(|value| value * units))
    }
}

impl From<(Holding, f64)> for Position {
    fn from((holding, units): (Holding, f64)) -> Self {
        Self { holding, units }
    }
}

#[cfg(test)]
#[test]
fn position_value_follows_asset() {
    use crate::engine::Security;

    let mut market = Market::new();
    let stock = market.insert(Security::new("ZZB AU", "AUD").unwrap());
    let mut position = Position::from((Holding::from(stock), 100.0));
    assert!(!position.value(&market).unwrap().is_valid());

    market.set_price(stock, Price::new(2.5)).unwrap();
    assert_eq!(position.value(&market).unwrap(), Price::new(250.0));
    assert_eq!(position.currency(&market).unwrap().as_str(), "AUD");

    position.decrement(150.0);
    assert_eq!(position.units(), -50.0);
    assert_eq!(position.value(&market).unwrap(), Price::new(-125.0));

    position.increment(50.0);
    assert_eq!(position.units(), 0.0);
}
