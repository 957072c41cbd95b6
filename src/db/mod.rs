pub mod csv;
pub mod memory;
pub mod postgres;
pub mod store;

pub use self::csv::CsvDatasetStore;
pub use memory::MemoryDatasetStore;
pub use postgres::{create_pool, PgDatasetStore};
pub use store::{Dataset, DatasetStore};
