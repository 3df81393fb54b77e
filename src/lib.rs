// ============================================================================
// memovirt: searchable virtual attributes
// ============================================================================

//! Computed ("virtual") record attributes that stay searchable through the
//! record store.
//!
//! Each virtual attribute is derived from the record's own attributes by a
//! registered function. Every single-record write recomputes them and
//! persists a denormalized search cache next to the record, so ordinary SQL
//! predicates can filter and sort on values the store never computes itself.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use memovirt::{
//!     AttributeAccess, AttributeMap, Column, DataType, MemoryStore, Repository, Value,
//!     VirtualConfig, VirtualModel,
//! };
//! use memovirt::query::JoinOperator;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store
//!     .create_table(
//!         "people",
//!         vec![
//!             Column::new("birthYear", DataType::Integer),
//!             Column::text("virtual_cache"),
//!         ],
//!     )
//!     .await?;
//!
//! let model = VirtualModel::builder("people", VirtualConfig::packed())
//!     .attribute_with("ageBracket", |attrs: &AttributeMap| {
//!         match attrs.get("birthYear").and_then(Value::as_i64) {
//!             Some(year) if year <= 2008 => "adult".into(),
//!             Some(_) => "minor".into(),
//!             None => Value::Null,
//!         }
//!     })
//!     .build()?;
//! let repo = Repository::open(store, model).await?;
//!
//! let mut record = repo.new_record().with("birthYear", 2000);
//! repo.create(&mut record).await?;
//! assert_eq!(record.attributes()["virtual_cache"], Value::from(",ageBracket:adult,"));
//! assert_eq!(record.get("ageBracket"), Value::from("adult"));
//!
//! let mut search = repo.search();
//! search.compare("ageBracket", "adult", false, JoinOperator::And)?;
//! assert_eq!(repo.find_all(search.criteria()).await?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod query;
pub mod storage;
pub mod virtuals;

// Re-export main types for convenience
pub use config::{CacheStrategy, VirtualConfig};
pub use core::{AttributeMap, Column, DataType, DbError, RecordKey, Result, Schema, Value};
pub use query::{Criteria, SqlDialect};
pub use storage::{MemoryStore, RecordStore, StoredRecord};
pub use virtuals::{
    AfterBulkUpdate, AttributeAccess, Mode, Record, Repository, SweepReport, VirtualHooks,
    VirtualModel, VirtualSearch,
};
