pub mod price_lookup;

pub use price_lookup::{BinancePriceLookup, PriceLookup, BINANCE_REST_URL};

#[cfg(test)]
pub use price_lookup::MockPriceLookup;
