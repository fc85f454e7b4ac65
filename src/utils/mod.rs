//! Shared services

pub mod coingecko;
pub mod covalent;
pub mod logger;
pub mod rate_limit;
pub mod reports;

pub use coingecko::CoinGeckoService;
pub use covalent::CovalentService;
pub use logger::init_logger;
pub use rate_limit::RequestThrottle;
pub use reports::ReportService;
