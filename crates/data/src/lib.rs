//! Historical bar archive for the bar signal engine.
//!
//! This crate provides:
//! - Database client for the `PostgreSQL`/TimescaleDB `ohlcv` table
//! - [`OhlcvRepository`], the SQL-backed [`bar_signal_core::HistoricalStore`]
//! - [`InMemoryHistoricalStore`] answering the same queries from loaded bars
//! - CSV import/export of bars

pub mod csv_storage;
pub mod database;
pub mod memory_store;
pub mod repositories;

pub use csv_storage::CsvStorage;
pub use database::{DatabaseClient, OhlcvRecord};
pub use memory_store::InMemoryHistoricalStore;
pub use repositories::OhlcvRepository;
