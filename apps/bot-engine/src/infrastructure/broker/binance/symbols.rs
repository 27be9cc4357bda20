//! Canonical ↔ Binance symbol conversion.
//!
//! The ledger uses `BASE-QUOTE` (or `BASE/QUOTE`); Binance concatenates
//! (`BTCUSDT`). Splitting a venue symbol relies on a list of known quote
//! assets, longest-first within each prefix family.

/// Quote assets recognized when splitting venue symbols.
const KNOWN_QUOTES: &[&str] = &[
    "USDT", "FDUSD", "USDC", "BUSD", "TUSD", "BTC", "ETH", "BNB", "EUR", "TRY", "USD",
];

/// `BTC-USDT` / `BTC/USDT` / `btcusdt` → `BTCUSDT`.
#[must_use]
pub fn to_venue(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| *c != '-' && *c != '/')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// `BTCUSDT` → `BTC-USDT`.
///
/// Symbols without a known quote suffix are returned unchanged.
#[must_use]
pub fn from_venue(symbol: &str) -> String {
    let upper = symbol.to_ascii_uppercase();
    KNOWN_QUOTES
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| format!("{base}-{quote}"))
        })
        .unwrap_or(upper)
}
