pub mod manager;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use record::{InternalRecord, NewRecord, RecordError, RecordUpdate};
pub use store::{RecordStore, StoreError};
