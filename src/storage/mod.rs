pub mod engine;
pub mod memory;
pub mod table;

pub use engine::{RecordStore, StoredRecord};
pub use memory::{MemoryStore, StoreStats};
pub use table::Table;
