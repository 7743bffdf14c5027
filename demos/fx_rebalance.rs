//! # FX Rebalance
//!
//! An AUD fund holds a US stock and keeps it near 60% of its value, trading monthly.
//! The stock and the AUDUSD rate both follow random walks, so the fund's exposure
//! drifts with the currency as well as the stock. A weight limit rejects any trade
//! that would push the stock above 70%.
mod utils;

use std::rc::Rc;

use chrono::{DateTime, Datelike, Utc};
use pbt_rs::prelude::*;

const TARGET: f64 = 0.6;

fn main() -> Result<()> {
    utils::init_logging();

    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZU US", "USD")?)?;
    let usd = Currency::new("USD")?;

    let mut fund = Portfolio::new("GLOBAL", "AUD")?.with_rule(WeightLimit::new(stock, 0.7));
    fund.transfer(Currency::new("AUD")?, 10_000.0);
    fund.transfer(usd, 5_000.0);
    let id = bt.add_portfolio(fund)?;

    let mut bt = bt.with_strategy(move |time: DateTime<Utc>, market: &Market, portfolios: &Portfolios| -> Result<Vec<Trade>> {
        if time.day() != 1 {
            return Ok(Vec::new());
        }
        let fund = portfolios.get(id)?;
        let (Some(value), Some(price)) = (fund.value(market)?.get(), market.get(stock)?.price().get()) else {
            return Ok(Vec::new());
        };
        let Some(weight) = fund.weight(stock, market)?.get() else {
            return Ok(Vec::new());
        };

        // target exposure in AUD, converted to USD then to shares
        let Some(rate) = market.fx_rates().rate(FxPair::new(Currency::new("AUD")?, usd))? else {
            return Ok(Vec::new());
        };
        let units = ((TARGET - weight) * value * rate / price).trunc();
        Ok(match units != 0.0 {
            true => vec![Trade::new(id, stock, units)],
            false => Vec::new(),
        })
    });

    let pair = FxPair::parse("AUDUSD")?;
    for (time, price) in utils::random_walk(365, 11, 50.0, 0.02) {
        bt.add_event(Rc::new(AssetPriceEvent::new(stock, time, price)));
    }
    for (time, rate) in utils::random_walk(365, 13, 0.72, 0.005) {
        bt.add_event(Rc::new(FxRateEvent::new(pair, time, rate)));
    }
    bt.run()?;

    let fund = bt.portfolio(id)?;
    println!("{}", fund.show(bt.market())?);
    for (time, snapshot) in fund.history().iter().filter(|(t, _)| t.day() == 1) {
        let weight = snapshot.weight(stock.into()).unwrap_or(Price::INVALID);
        println!("{} value {:>10.2} stock weight {:.3}", time.date_naive(), snapshot.value(), weight);
    }

    #[cfg(feature = "serde")]
    std::fs::write("fx_rebalance.json", bt.history_to_json()?)?;

    Ok(())
}
