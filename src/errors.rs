use crate::engine::{AssetId, FxPair, PortfolioId};

/// Result type used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the backtesting engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A currency code is not made of three letters once trimmed and upper-cased.
    #[error("'{0}' is not a valid currency code")]
    InvalidCurrency(String),

    /// A currency pair is not made of six letters once trimmed and upper-cased.
    #[error("expecting a six character currency pair, got '{0}'")]
    InvalidFxPair(String),

    /// A registered rate is exactly zero, so it cannot be used (or inverted).
    #[error("'{0}' FX rate is zero")]
    ZeroFxRate(FxPair),

    /// The rate needed for a conversion is not available.
    #[error("no FX rate available for '{0}'")]
    MissingFxRate(FxPair),

    /// A pair, or its inverse, is already registered.
    #[error("'{0}' fx rate instance already exists")]
    DuplicateFxPair(FxPair),

    /// Weights are undefined for a portfolio valued at exactly zero.
    #[error("cannot calculate weights for portfolio '{0}' with zero value")]
    ZeroPortfolioValue(String),

    /// The portfolio has no executing broker.
    #[error("portfolio '{0}' has no assigned executing broker")]
    NoBroker(String),

    /// Portfolio codes and asset tickers share one namespace within a backtest.
    /// Carries the kind of code (`"portfolio code"` or `"asset ticker"`) and the code.
    #[error("{0} '{1}' is already in use and needs to be unique")]
    DuplicateCode(&'static str, String),

    /// The event queue has nothing left to hand out.
    #[error("event queue is empty")]
    EmptyQueue,

    /// The traded asset has no valid price, so no consideration can be computed.
    #[error("'{0}' cannot execute a trade with invalid consideration")]
    InvalidConsideration(String),

    /// Charges cannot be computed for a trade without a valid value.
    #[error("'{0}' cannot apply charges to a trade with invalid value")]
    InvalidTradeValue(String),

    /// Slippage must be a finite, non-negative rate.
    #[error("slippage must be finite and non-negative (got: {0})")]
    InvalidSlippage(f64),

    /// Cash always trades at its unit price.
    #[error("'{0}' has a fixed price and cannot be repriced")]
    FixedPrice(String),

    /// The handle does not belong to this market.
    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    /// The handle does not belong to this collection.
    #[error("portfolio {0} not found")]
    PortfolioNotFound(PortfolioId),

    /// Internal failure of a compliance rule (not a rule breach).
    #[error("compliance rule failed: {0}")]
    Compliance(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV serialization error occurred.
    #[cfg(feature = "export")]
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// JSON serialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
