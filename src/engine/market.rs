use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{Asset, AssetId, Currency, FxRates, Holding, Price},
    errors::{Error, Result},
    utils::clean_string,
};

/// Point-in-time capture of an asset.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetSnapshot {
    timestamp: DateTime<Utc>,
    price: Price,
    value: Price,
}

impl AssetSnapshot {
    /// Captures `asset` as it is now.
    pub fn new(timestamp: DateTime<Utc>, asset: &dyn Asset) -> Self {
        Self {
            timestamp,
            price: asset.price(),
            value: asset.value(),
        }
    }

    /// Returns the snapshot time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the price at that time.
    pub fn price(&self) -> Price {
        self.price
    }

    /// Returns the unit value at that time.
    pub fn value(&self) -> Price {
        self.value
    }
}

/// Snapshot history keyed by timestamp.
pub type AssetHistory = BTreeMap<DateTime<Utc>, AssetSnapshot>;

#[derive(Debug)]
struct Slot {
    asset: Box<dyn Asset>,
    history: AssetHistory,
}

impl Slot {
    fn id(&self, index: usize) -> AssetId {
        let cash = self.asset.is_cash().then(|| self.asset.base_currency());
        AssetId::new(index, cash)
    }
}

/// Market data shared by every portfolio of a backtest: the asset arena and the FX table.
///
/// Assets are addressed by [`AssetId`], which stays valid for the lifetime of the
/// market. Price and FX updates are visible to every portfolio valued against it.
#[derive(Debug, Default)]
pub struct Market {
    slots: Vec<Slot>,
    fx_rates: FxRates,
}

impl Market {
    /// Creates an empty market.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a market around an existing FX table.
    pub fn with_fx_rates(fx_rates: FxRates) -> Self {
        Self {
            slots: Vec::new(),
            fx_rates,
        }
    }

    /// Stores an asset and returns its handle.
    pub fn insert<A: Asset + 'static>(&mut self, asset: A) -> AssetId {
        let cash = asset.is_cash().then(|| asset.base_currency());
        self.slots.push(Slot {
            asset: Box::new(asset),
            history: AssetHistory::new(),
        });
        AssetId::new(self.slots.len() - 1, cash)
    }

    /// Returns the asset behind `id`.
    pub fn get(&self, id: AssetId) -> Result<&dyn Asset> {
        self.slots
            .get(id.index())
            .map(|slot| slot.asset.as_ref())
            .ok_or(Error::AssetNotFound(id))
    }

    /// Returns true if `id` belongs to this market.
    pub fn contains(&self, id: AssetId) -> bool {
        id.index() < self.slots.len()
    }

    /// Returns the handles of every stored asset, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.slots.iter().enumerate().map(|(index, slot)| slot.id(index))
    }

    /// Looks an asset up by ticker (compared after cleaning).
    pub fn find(&self, ticker: &str) -> Option<AssetId> {
        let ticker = clean_string(ticker);
        self.slots
            .iter()
            .enumerate()
            .find(|(_, slot)| clean_string(slot.asset.ticker()) == ticker)
            .map(|(index, slot)| slot.id(index))
    }

    /// Sets the price of an asset, which revalues it immediately.
    ///
    /// ### Returns
    /// [`Error::FixedPrice`] for assets without a write capability (cash).
    pub fn set_price(&mut self, id: AssetId, price: Price) -> Result<()> {
        let slot = self.slots.get_mut(id.index()).ok_or(Error::AssetNotFound(id))?;
        let ticker = slot.asset.ticker().to_owned();
        let writer = slot.asset.as_set_price().ok_or(Error::FixedPrice(ticker))?;
        writer.set_price(price);
        Ok(())
    }

    /// Returns the shared FX table.
    pub fn fx_rates(&self) -> &FxRates {
        &self.fx_rates
    }

    /// Returns the shared FX table for writing.
    pub fn fx_rates_mut(&mut self) -> &mut FxRates {
        &mut self.fx_rates
    }

    /// Returns the position key for an asset: cash maps to its currency.
    pub fn holding(&self, id: AssetId) -> Result<Holding> {
        let asset = self.get(id)?;
        Ok(if asset.is_cash() {
            Holding::Cash(asset.base_currency())
        } else {
            Holding::Asset(id)
        })
    }

    /// Returns the currency and unit value of a holding.
    pub fn quote(&self, holding: Holding) -> Result<(Currency, Price)> {
        match holding {
            Holding::Cash(currency) => Ok((currency, Price::UNIT)),
            Holding::Asset(id) => {
                let asset = self.get(id)?;
                Ok((asset.base_currency(), asset.value()))
            }
        }
    }

    /// Returns a display code for a holding: the ticker, or the currency for cash.
    pub fn ticker(&self, holding: Holding) -> Result<String> {
        match holding {
            Holding::Cash(currency) => Ok(currency.as_str().to_owned()),
            Holding::Asset(id) => Ok(self.get(id)?.ticker().to_owned()),
        }
    }

    /// Records a snapshot of an asset at `timestamp`, replacing any earlier one for that time.
    pub fn take_snapshot(&mut self, id: AssetId, timestamp: DateTime<Utc>) -> Result<()> {
        let slot = self.slots.get_mut(id.index()).ok_or(Error::AssetNotFound(id))?;
        let snapshot = AssetSnapshot::new(timestamp, slot.asset.as_ref());
        slot.history.insert(timestamp, snapshot);
        Ok(())
    }

    /// Returns the snapshot history of an asset.
    pub fn history(&self, id: AssetId) -> Result<&AssetHistory> {
        self.slots
            .get(id.index())
            .map(|slot| &slot.history)
            .ok_or(Error::AssetNotFound(id))
    }
}
