use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};

use crate::{
    engine::*,
    errors::{Error, Result},
};

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, d, 0, 0, 0).unwrap()
}

fn aud() -> Currency {
    Currency::new("AUD").unwrap()
}

fn price_events(asset: AssetId, prices: &[(u32, f64)]) -> Vec<Rc<dyn Event>> {
    prices
        .iter()
        .map(|(d, p)| Rc::new(AssetPriceEvent::new(asset, day(*d), *p)) as Rc<dyn Event>)
        .collect()
}

/// Buys 100 shares whenever the stock trades at or below 2.00.
fn buy_the_dip(portfolio: PortfolioId, stock: AssetId) -> impl FnMut(DateTime<Utc>, &Market, &Portfolios) -> Result<Vec<Trade>> {
    move |_: DateTime<Utc>, market: &Market, _: &Portfolios| {
        let price = market.get(stock)?.price();
        Ok(match price.get() {
            Some(price) if price <= 2.0 => vec![Trade::new(portfolio, stock, 100.0)],
            _ => Vec::new(),
        })
    }
}

#[test]
fn register_portfolio_and_asset() {
    let mut bt = Backtest::new(NoTrades);
    assert_eq!(bt.state(), RunState::Idle);

    let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    let portfolio = bt.add_portfolio(Portfolio::new("XXX", "AUD").unwrap()).unwrap();
    assert!(bt.has_asset(stock));
    assert!(bt.has_portfolio(portfolio));
    assert!(bt.portfolio(portfolio).unwrap().broker().is_some());

    // re-registering is a no-op
    bt.register_asset(stock).unwrap();
    bt.register_portfolio(portfolio).unwrap();
    assert_eq!(bt.asset_ids().len(), 1);
    assert_eq!(bt.portfolio_ids().len(), 1);

    let err = bt.add_portfolio(Portfolio::new(" xxx ", "USD").unwrap()).unwrap_err();
    assert_eq!(err.to_string(), "portfolio code 'xxx' is already in use and needs to be unique");
    let err = bt.add_asset(Security::new("ZZB AU", "USD").unwrap()).unwrap_err();
    assert_eq!(err.to_string(), "asset ticker 'ZZB AU' is already in use and needs to be unique");

    // tickers and portfolio codes share one namespace
    assert!(matches!(
        bt.add_portfolio(Portfolio::new("zzb au", "AUD").unwrap()),
        Err(Error::DuplicateCode("portfolio code", _))
    ));
    assert_eq!(bt.market().ids().count(), 1);
    assert_eq!(bt.portfolios().len(), 1);
}

#[test]
fn register_keeps_an_existing_broker() {
    let mut bt = Backtest::new(NoTrades);
    let broker = Rc::new(Broker::new(NoCharges, FillAtLastWithSlippage::new(0.01).unwrap()));
    let id = bt
        .add_portfolio(Portfolio::new("XXX", "AUD").unwrap().with_broker(broker.clone()))
        .unwrap();
    assert!(Rc::ptr_eq(&bt.portfolio(id).unwrap().broker().unwrap(), &broker));
}

#[test]
fn register_existing_market_entries() {
    let mut market = Market::new();
    let stock = market.insert(Security::new("ZZB AU", "AUD").unwrap());
    let twin = market.insert(Security::new("zzb au", "USD").unwrap());

    let mut bt = Backtest::with_market(market, NoTrades);
    assert!(!bt.has_asset(stock));
    bt.register_asset(stock).unwrap();
    assert!(matches!(bt.register_asset(twin), Err(Error::DuplicateCode("asset ticker", _))));
    assert!(matches!(bt.register_asset(AssetId::new(9, None)), Err(Error::AssetNotFound(_))));

    let id = bt.portfolios_mut().insert(Portfolio::new("XXX", "AUD").unwrap());
    assert!(!bt.has_portfolio(id));
    bt.register_portfolio(id).unwrap();
    assert!(bt.has_portfolio(id));
    assert!(bt.portfolio(id).unwrap().broker().is_some());
}

#[test]
fn basic_strategy() {
    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    let cash = bt.add_asset(Cash::new("AUD").unwrap()).unwrap();
    let mut portfolio = Portfolio::new("XXX", "AUD").unwrap();
    portfolio.transfer(aud(), 1000.0);
    let id = bt.add_portfolio(portfolio).unwrap();

    let mut bt = bt.with_strategy(buy_the_dip(id, stock));
    bt.add_events(price_events(stock, &[(13, 2.10), (14, 2.00), (15, 2.50)]));
    bt.run().unwrap();
    assert_eq!(bt.state(), RunState::Done);

    // nothing at t1, 100 shares bought at t2, held at t3
    let portfolio = bt.portfolio(id).unwrap();
    assert_eq!(portfolio.units(stock), 100.0);
    assert_eq!(portfolio.units(aud()), 800.0);
    assert_eq!(portfolio.value(bt.market()).unwrap(), Price::new(1050.0));

    let history = portfolio.history();
    assert_eq!(history[&day(13)].timestamp(), day(13));
    assert_eq!(history[&day(13)].value(), Price::new(1000.0));
    assert_eq!(history[&day(14)].value(), Price::new(1000.0));
    assert_eq!(history[&day(15)].value(), Price::new(1050.0));
    assert_eq!(history[&day(13)].units(stock.into()), 0.0);
    assert_eq!(history[&day(14)].units(stock.into()), 100.0);

    let stock_history = bt.market().history(stock).unwrap();
    assert_eq!(stock_history[&day(13)].price(), Price::new(2.1));
    assert_eq!(stock_history[&day(14)].price(), Price::new(2.0));
    assert_eq!(stock_history[&day(15)].price(), Price::new(2.5));

    let cash_history = bt.market().history(cash).unwrap();
    assert!(cash_history.values().all(|s| s.price() == Price::UNIT));
    assert_eq!(cash_history.len(), 3);

    assert_eq!(bt.snapshot_times(), &[day(13), day(14), day(15)]);
}

#[test]
fn closure_strategy_sees_processed_events() {
    let mut market = Market::new();
    let stock = market.insert(Security::new("ZZB AU", "AUD").unwrap());
    let mut seen = Vec::new();
    let mut bt = Backtest::with_market(market, |time: DateTime<Utc>, market: &Market, _: &Portfolios| -> Result<Vec<Trade>> {
        seen.push((time, market.get(stock)?.price()));
        Ok(Vec::new())
    });
    bt.register_asset(stock).unwrap();

    let mut events = price_events(stock, &[(15, 3.0), (13, 1.0)]);
    // two prices at the same time: the later one registered wins
    events.extend(price_events(stock, &[(14, 2.0), (14, 2.5)]));
    bt.add_events(events);
    bt.run().unwrap();
    drop(bt);

    assert_eq!(
        seen,
        vec![
            (day(13), Price::new(1.0)),
            (day(14), Price::new(2.5)),
            (day(15), Price::new(3.0)),
        ]
    );
}

#[test]
fn compliance_caps_repeated_buys() {
    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("AAPL", "USD").unwrap()).unwrap();
    let mut portfolio = Portfolio::new("MY_ACCOUNT", "USD")
        .unwrap()
        .with_rule(UnitLimit::new(stock, 500.0));
    portfolio.transfer(Currency::new("USD").unwrap(), 1e6);
    let id = bt.add_portfolio(portfolio).unwrap();

    let mut bt = bt.with_strategy(move |_: DateTime<Utc>, market: &Market, _: &Portfolios| -> Result<Vec<Trade>> {
        Ok(match market.get(stock)?.price().is_valid() {
            true => vec![Trade::new(id, stock, 100.0)],
            false => Vec::new(),
        })
    });

    let prices: Vec<(u32, f64)> = (1..=9).map(|d| (d, 130.0 + d as f64)).collect();
    bt.add_events(price_events(stock, &prices));
    bt.run().unwrap();

    let portfolio = bt.portfolio(id).unwrap();
    assert_eq!(portfolio.units(stock), 500.0);
    assert_eq!(portfolio.history().len(), 9);
    assert_eq!(portfolio.history()[&day(5)].units(stock.into()), 500.0);
    assert_eq!(portfolio.history()[&day(4)].units(stock.into()), 400.0);
}

#[test]
fn trade_events_and_fx_events() {
    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZU US", "USD").unwrap()).unwrap();
    let mut portfolio = Portfolio::new("XXX", "AUD").unwrap();
    portfolio.transfer(aud(), 1000.0);
    let id = bt.add_portfolio(portfolio).unwrap();
    let pair = FxPair::parse("AUDUSD").unwrap();

    let buy = Rc::new(TradeEvent::new(Trade::new(id, stock, 100.0), day(14)));
    let events = vec![
        Rc::new(AssetPriceEvent::new(stock, day(13), 3.0)) as Rc<dyn Event>,
        Rc::new(FxRateEvent::new(pair, day(14), 0.5)) as Rc<dyn Event>,
        buy.clone() as Rc<dyn Event>,
        Rc::new(AssetPriceEvent::new(stock, day(15), 4.0)) as Rc<dyn Event>,
        Rc::new(FxRateEvent::new(pair, day(15), 0.8)) as Rc<dyn Event>,
    ];
    bt.add_events(events.iter().cloned());
    bt.add_event(buy.clone());
    assert_eq!(bt.pending_events(), 5);
    bt.run().unwrap();

    assert!(events.iter().all(|e| e.is_processed()));
    assert_eq!(buy.outcome(), Some(TradeOutcome::Executed));

    let usd = Currency::new("USD").unwrap();
    let portfolio = bt.portfolio(id).unwrap();
    assert_eq!(portfolio.units(stock), 100.0);
    assert_eq!(portfolio.units(usd), -300.0);

    let history = portfolio.history();
    // the stock is not held yet, so no AUDUSD rate is needed
    assert_eq!(history[&day(13)].value(), Price::new(1000.0));
    // bought 300 USD of stock with 300 USD of credit
    assert_eq!(history[&day(14)].value(), Price::new(1000.0));
    // 1000 AUD + (400 - 300) USD at 0.8
    assert_eq!(history[&day(15)].value(), Price::new(1125.0));
    assert_eq!(bt.snapshot_times().len(), 3);
}

#[test]
fn first_error_aborts_the_run() {
    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    let cash = bt.add_asset(Cash::new("AUD").unwrap()).unwrap();

    bt.add_events(price_events(stock, &[(13, 1.0), (15, 3.0)]));
    // cash has a fixed price
    bt.add_event(Rc::new(AssetPriceEvent::new(cash, day(14), 2.0)));

    assert!(matches!(bt.run(), Err(Error::FixedPrice(_))));
    assert_eq!(bt.state(), RunState::Failed);
    assert_eq!(bt.snapshot_times(), &[day(13)]);
    assert_eq!(bt.pending_events(), 1);
    assert_eq!(bt.market().get(stock).unwrap().price(), Price::new(1.0));
}

#[test]
fn strategy_error_aborts_the_run() {
    let mut bt = Backtest::new(|_: DateTime<Utc>, _: &Market, _: &Portfolios| -> Result<Vec<Trade>> {
        Err(Error::Compliance("no data".into()))
    });
    let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    bt.add_events(price_events(stock, &[(13, 1.0)]));

    assert!(bt.run().is_err());
    assert!(bt.snapshot_times().is_empty());
    assert!(bt.market().history(stock).unwrap().is_empty());
}

#[test]
fn zero_value_portfolio_does_not_abort() {
    let mut bt = Backtest::new(NoTrades);
    let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    let mut portfolio = Portfolio::new("XXX", "AUD").unwrap();
    portfolio.transfer(stock, 100.0);
    let id = bt.add_portfolio(portfolio).unwrap();

    bt.add_events(price_events(stock, &[(13, 0.0), (14, 1.0)]));
    bt.run().unwrap();

    let history = bt.portfolio(id).unwrap().history();
    assert_eq!(history[&day(13)].value(), Price::new(0.0));
    assert_eq!(history[&day(13)].weight(stock.into()), Some(Price::INVALID));
    assert_eq!(history[&day(14)].weight(stock.into()), Some(Price::new(1.0)));
}

#[test]
fn empty_queue_runs_to_done() {
    let mut bt = Backtest::new(NoTrades);
    bt.run().unwrap();
    assert_eq!(bt.state(), RunState::Done);
    assert!(bt.snapshot_times().is_empty());
}

#[test]
fn random_walk_weights_sum_to_one() {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let mut rng = StdRng::seed_from_u64(42);
    let mut bt = Backtest::new(NoTrades);
    let aud_stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
    let usd_stock = bt.add_asset(Security::new("ZZU US", "USD").unwrap()).unwrap();
    let mut portfolio = Portfolio::new("XXX", "AUD").unwrap();
    portfolio.transfer(aud(), 500.0);
    portfolio.transfer(aud_stock, 100.0);
    portfolio.transfer(usd_stock, 50.0);
    let id = bt.add_portfolio(portfolio).unwrap();
    let pair = FxPair::parse("AUDUSD").unwrap();

    let (mut p1, mut p2, mut fx) = (2.0_f64, 10.0_f64, 0.7_f64);
    for d in 1..=28 {
        p1 *= 1.0 + rng.random_range(-0.05..0.05);
        p2 *= 1.0 + rng.random_range(-0.05..0.05);
        fx *= 1.0 + rng.random_range(-0.01..0.01);
        bt.add_events([
            Rc::new(AssetPriceEvent::new(aud_stock, day(d), p1)) as Rc<dyn Event>,
            Rc::new(AssetPriceEvent::new(usd_stock, day(d), p2)) as Rc<dyn Event>,
            Rc::new(FxRateEvent::new(pair, day(d), fx)) as Rc<dyn Event>,
        ]);
    }
    bt.run().unwrap();

    let history = bt.portfolio(id).unwrap().history();
    assert_eq!(history.len(), 28);
    for snapshot in history.values() {
        assert!(snapshot.value().amount() > 0.0);
        let total: f64 = snapshot.weights().values().map(|w| w.amount()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn value_rises_with_a_long_position_price() {
    let mut market = Market::new();
    let stock = market.insert(Security::new("ZZB AU", "AUD").unwrap());
    let mut portfolio = Portfolio::new("XXX", "AUD").unwrap();
    portfolio.transfer(stock, 100.0);
    portfolio.transfer(aud(), -50.0);

    let mut last = f64::NEG_INFINITY;
    for price in [0.5, 1.0, 1.5, 2.5, 10.0] {
        market.set_price(stock, Price::new(price)).unwrap();
        let value = portfolio.value(&market).unwrap().amount();
        assert!(value > last);
        last = value;
    }
}
