//! Database repositories for the bar archive.
//!
//! Each repository provides typed access to a specific table with
//! batch insert capabilities and aggregate queries.

pub mod ohlcv_repo;

pub use ohlcv_repo::OhlcvRepository;
