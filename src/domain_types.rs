pub mod aggregation;
pub mod bar;
pub mod feature;
pub mod period;
pub mod time_series;

pub use aggregation::{fill_both, AggregationOp};
pub use bar::{Bar, Orientation, RawCandle, REVERSED_PREFIX};
pub use feature::Feature;
pub use period::{check_period, snap_down, DAY, FETCH_CHUNK_SECS, STORAGE_PERIOD, SUPPORTED_PERIODS};
pub use time_series::TimeSeries;
