pub mod batch_writer;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod series_repository;
pub mod series_store;

pub use batch_writer::{BatchWriter, DocumentStore, DEFAULT_BATCH_SIZE};
pub use error::DbError;
pub use memory_store::MemoryStore;
pub use models::*;
pub use series_repository::SeriesRepository;
pub use series_store::SeriesStore;
