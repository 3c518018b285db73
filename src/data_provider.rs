pub mod history;
pub mod poloniex;
pub mod provider;
pub mod selector;

pub use history::BarStore;
pub use poloniex::PoloniexClient;
pub use provider::{pair_for_asset, MarketDataProvider, MarketInfo};
pub use selector::{AssetRanking, AssetSelector, DEFAULT_DUST_THRESHOLD};
