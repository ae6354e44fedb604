//! 거래소 커넥터.

pub mod binance_futures;

pub use binance_futures::FuturesClient;
