//! # Buy the Dip
//!
//! A single AUD portfolio buys 100 shares every time the stock closes 5% below its
//! running high, as long as it holds fewer than 1,000 shares. Trades pay a flat fee
//! plus 0.1% and fill with 0.5% slippage.
mod utils;

use std::rc::Rc;

use chrono::{DateTime, Utc};
use pbt_rs::prelude::*;

fn main() -> Result<()> {
    utils::init_logging();

    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZB AU", "AUD")?)?;
    bt.add_asset(Cash::new("AUD")?)?;

    let broker = Broker::new(
        FixedRatePlusPercentageCharges::new(9.95, 0.001, "AUD")?,
        FillAtLastWithSlippage::new(0.005)?,
    );
    let mut portfolio = Portfolio::new("DIP", "AUD")?
        .with_broker(broker)
        .with_rule(UnitLimit::new(stock, 1_000.0));
    portfolio.transfer(Currency::new("AUD")?, 10_000.0);
    let id = bt.add_portfolio(portfolio)?;

    let mut high = f64::NEG_INFINITY;
    let mut bt = bt.with_strategy(move |_: DateTime<Utc>, market: &Market, _: &Portfolios| -> Result<Vec<Trade>> {
        let Some(price) = market.get(stock)?.price().get() else {
            return Ok(Vec::new());
        };
        high = high.max(price);
        Ok(match price <= high.markdown(0.05) {
            true => vec![Trade::new(id, stock, 100.0)],
            false => Vec::new(),
        })
    });

    for (time, price) in utils::random_walk(250, 7, 10.0, 0.03) {
        bt.add_event(Rc::new(AssetPriceEvent::new(stock, time, price)));
    }
    bt.run()?;

    let portfolio = bt.portfolio(id)?;
    println!("{}", portfolio.show(bt.market())?);

    let values: Vec<f64> = portfolio.history().values().filter_map(|s| s.value().get()).collect();
    if let (Some(first), Some(last)) = (values.first(), values.last()) {
        println!("performance {first:.2} -> {last:.2} ({:.2}%)", first.change(*last) * 100.0);
    }

    #[cfg(feature = "export")]
    {
        let path = bt.history_to_csv("buy_the_dip")?;
        println!("history written to {}", path.display());
    }

    Ok(())
}
