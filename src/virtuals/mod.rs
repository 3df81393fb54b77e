//! Searchable virtual attributes.
//!
//! A [`VirtualModel`] declares computed attributes of one record type. A
//! [`Repository`] binds the model to a [`RecordStore`](crate::storage::RecordStore)
//! and persists every computed value into a search cache, either packed into
//! one text field or spread over one shadow field per attribute, so that
//! [`VirtualSearch`] can filter and order on them with plain SQL.

pub mod codec;
pub mod engine;
pub mod hooks;
pub mod lifecycle;
pub mod model;
pub mod naming;
pub mod record;
pub mod registry;
pub mod search;
pub mod sweeper;

pub use codec::CacheCodec;
pub use engine::{AttributeEngine, Mode, VirtualValues};
pub use hooks::{AfterBulkUpdate, VirtualHooks};
pub use lifecycle::Repository;
pub use model::{VirtualAttribute, VirtualModel, VirtualModelBuilder};
pub use naming::NameMapper;
pub use record::{AttributeAccess, Record};
pub use registry::{ComputeFn, ComputeRegistry};
pub use search::VirtualSearch;
pub use sweeper::{SweepReport, Sweeper};
