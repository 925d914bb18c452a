//! Tradable pairs.

pub const DEFAULT_EXCHANGE: &str = "binance";

/// A symbol and the exchange it is listed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    pub symbol: String,
    pub exchange: String,
}

impl Pair {
    pub fn new(symbol: &str, exchange: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            exchange: exchange.to_string(),
        }
    }
}
