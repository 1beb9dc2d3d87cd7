// Candle sources: live CryptoCompare REST and offline CSV files.
pub mod cryptocompare;
pub mod csv_source;
pub mod source;

pub use cryptocompare::CryptoCompareSource;
pub use csv_source::CsvCandleSource;
pub use source::CandleSource;
