#[cfg(feature = "export")]
use std::{io, path::PathBuf};

#[cfg(feature = "serde")]
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::engine::{AssetSnapshot, Currency, Price};
#[cfg(feature = "export")]
use crate::utils::column_code;
use crate::{
    engine::{Backtest, Strategy},
    errors::Result,
};

#[cfg(feature = "export")]
const NA: &str = "NA";

#[cfg(feature = "export")]
impl<S: Strategy> Backtest<S> {
    /// Writes the run history as CSV.
    ///
    /// One row per snapshot time with, in order: the value of every registered portfolio,
    /// the price of every registered asset, then the units each portfolio held in each
    /// asset. Numbers have two decimals; invalid or missing values are written as `NA`.
    pub fn write_history<W: io::Write>(&self, writer: W) -> Result<()> {
        let market = self.market();
        let mut portfolios = Vec::with_capacity(self.portfolio_ids().len());
        for id in self.portfolio_ids() {
            portfolios.push(self.portfolio(*id)?);
        }
        let mut assets = Vec::with_capacity(self.asset_ids().len());
        for id in self.asset_ids() {
            let ticker = column_code(market.get(*id)?.ticker());
            assets.push((ticker, market.holding(*id)?, market.history(*id)?));
        }

        let mut headers = vec!["TimeStamp".to_owned()];
        headers.extend(portfolios.iter().map(|p| format!("PORTFOLIO_{}_VALUE", column_code(p.code()))));
        headers.extend(assets.iter().map(|(ticker, ..)| format!("{ticker}_PRICE")));
        for portfolio in &portfolios {
            let code = column_code(portfolio.code());
            headers.extend(assets.iter().map(|(ticker, ..)| format!("{code}_{ticker}_UNITS")));
        }

        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&headers)?;

        for time in self.snapshot_times() {
            let mut row = vec![time.to_string()];
            for portfolio in &portfolios {
                row.push(match portfolio.history().get(time) {
                    Some(snapshot) => format!("{:.2}", snapshot.value()),
                    None => NA.to_owned(),
                });
            }
            for (_, _, history) in &assets {
                row.push(match history.get(time) {
                    Some(snapshot) => format!("{:.2}", snapshot.price()),
                    None => NA.to_owned(),
                });
            }
            for portfolio in &portfolios {
                let snapshot = portfolio.history().get(time);
                for (_, holding, _) in &assets {
                    row.push(match snapshot {
                        Some(snapshot) => format!("{:.2}", snapshot.units(*holding)),
                        None => NA.to_owned(),
                    });
                }
            }
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Writes the run history to a CSV file, appending `.csv` to the path when missing.
    ///
    /// ### Returns
    /// The path actually written.
    pub fn history_to_csv(&self, path: &str) -> Result<PathBuf> {
        let path = match path.ends_with(".csv") {
            true => PathBuf::from(path),
            false => PathBuf::from(format!("{path}.csv")),
        };
        let file = std::fs::File::create(&path)?;
        self.write_history(io::BufWriter::new(file))?;
        Ok(path)
    }
}

/// Run history of one asset.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    /// Asset ticker.
    pub ticker: String,
    /// Currency the asset is priced in.
    pub currency: Currency,
    /// Snapshots in time order.
    pub snapshots: Vec<AssetSnapshot>,
}

/// One portfolio snapshot, with holdings named by ticker.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRow {
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
    /// Value in base currency; `null` when invalid.
    pub value: Price,
    /// Weight of every held asset; `null` when invalid.
    pub weights: BTreeMap<String, Price>,
    /// Units of every position.
    pub units: BTreeMap<String, f64>,
}

/// Run history of one portfolio.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    /// Portfolio code.
    pub code: String,
    /// Currency the portfolio is valued in.
    pub base_currency: Currency,
    /// Snapshots in time order.
    pub snapshots: Vec<PortfolioRow>,
}

/// Whole run history of a backtest.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReport {
    /// Snapshot times in processing order.
    pub times: Vec<DateTime<Utc>>,
    /// Registered assets in registration order.
    pub assets: Vec<AssetReport>,
    /// Registered portfolios in registration order.
    pub portfolios: Vec<PortfolioReport>,
}

#[cfg(feature = "serde")]
impl<S: Strategy> Backtest<S> {
    /// Collects the run history of every registered asset and portfolio.
    pub fn history_report(&self) -> Result<HistoryReport> {
        let market = self.market();

        let mut assets = Vec::with_capacity(self.asset_ids().len());
        for id in self.asset_ids() {
            let asset = market.get(*id)?;
            assets.push(AssetReport {
                ticker: asset.ticker().to_owned(),
                currency: asset.base_currency(),
                snapshots: market.history(*id)?.values().copied().collect(),
            });
        }

        let mut portfolios = Vec::with_capacity(self.portfolio_ids().len());
        for id in self.portfolio_ids() {
            let portfolio = self.portfolio(*id)?;
            let mut snapshots = Vec::with_capacity(portfolio.history().len());
            for snapshot in portfolio.history().values() {
                let mut weights = BTreeMap::new();
                for (holding, weight) in snapshot.weights() {
                    weights.insert(market.ticker(*holding)?, *weight);
                }
                let mut units = BTreeMap::new();
                for (holding, held) in snapshot.holdings() {
                    units.insert(market.ticker(*holding)?, *held);
                }
                snapshots.push(PortfolioRow {
                    timestamp: snapshot.timestamp(),
                    value: snapshot.value(),
                    weights,
                    units,
                });
            }
            portfolios.push(PortfolioReport {
                code: portfolio.code().to_owned(),
                base_currency: portfolio.base_currency(),
                snapshots,
            });
        }

        Ok(HistoryReport {
            times: self.snapshot_times().to_vec(),
            assets,
            portfolios,
        })
    }

    /// Renders [`Backtest::history_report`] as pretty-printed JSON.
    pub fn history_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.history_report()?)?)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::engine::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, d, 0, 0, 0).unwrap()
    }

    fn backtest() -> Backtest<NoTrades> {
        let mut bt = Backtest::new(NoTrades);
        let stock = bt.add_asset(Security::new("ZZB AU", "AUD").unwrap()).unwrap();
        let cash = bt.add_asset(Cash::new("AUD").unwrap()).unwrap();
        let mut portfolio = Portfolio::new("my fund", "AUD").unwrap();
        portfolio.transfer(stock, 100.0);
        portfolio.transfer(cash, 50.0);
        bt.add_portfolio(portfolio).unwrap();

        bt.add_event(Rc::new(AssetPriceEvent::new(stock, day(13), Price::INVALID)));
        bt.add_event(Rc::new(AssetPriceEvent::new(stock, day(14), 2.5)));
        bt.run().unwrap();
        bt
    }

    #[cfg(feature = "export")]
    #[test]
    fn csv_history() {
        let bt = backtest();
        let mut buf = Vec::new();
        bt.write_history(&mut buf).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "TimeStamp,PORTFOLIO_MY_FUND_VALUE,ZZB_AU_PRICE,AUD_PRICE,MY_FUND_ZZB_AU_UNITS,MY_FUND_AUD_UNITS"
        );
        assert_eq!(lines[1], "2021-03-13 00:00:00 UTC,NA,NA,1.00,100.00,50.00");
        assert_eq!(lines[2], "2021-03-14 00:00:00 UTC,300.00,2.50,1.00,100.00,50.00");
        assert_eq!(lines.len(), 3);
    }

    #[cfg(feature = "export")]
    #[test]
    fn csv_file_gets_an_extension() {
        let bt = backtest();
        let base = std::env::temp_dir().join(format!("pbt-history-{}", std::process::id()));
        let path = bt.history_to_csv(base.to_str().unwrap()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("TimeStamp,"));
        std::fs::remove_file(path).unwrap();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_history() {
        let bt = backtest();
        let report = bt.history_report().unwrap();
        assert_eq!(report.times, vec![day(13), day(14)]);
        assert_eq!(report.assets[0].ticker, "ZZB AU");
        assert_eq!(report.assets[0].snapshots.len(), 2);

        let fund = &report.portfolios[0];
        assert_eq!(fund.code, "my fund");
        assert!(!fund.snapshots[0].value.is_valid());
        assert_eq!(fund.snapshots[1].value, Price::new(300.0));
        assert_eq!(fund.snapshots[1].units["ZZB AU"], 100.0);
        assert_eq!(fund.snapshots[1].weights["AUD"], Price::new(50.0 / 300.0));

        let json: serde_json::Value = serde_json::from_str(&bt.history_to_json().unwrap()).unwrap();
        assert_eq!(json["portfolios"][0]["code"], "my fund");
        assert_eq!(json["portfolios"][0]["base_currency"], "AUD");
        assert!(json["portfolios"][0]["snapshots"][0]["value"].is_null());
        assert_eq!(json["assets"][0]["snapshots"][1]["price"], 2.5);
    }
}
