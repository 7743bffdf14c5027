use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber driven by `RUST_LOG` (defaults to `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// First trading day of the sample data.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()
}

/// Generates a deterministic daily random walk.
///
/// Each step moves the previous value by at most `volatility` (as a rate).
pub fn random_walk(days: i64, seed: u64, first: f64, volatility: f64) -> Vec<(DateTime<Utc>, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut value = first;

    (0..days)
        .map(|i| {
            let point = (start() + Duration::days(i), value);
            value *= 1.0 + rng.random_range(-volatility..=volatility);
            point
        })
        .collect()
}

#[allow(dead_code)]
fn main() {}
