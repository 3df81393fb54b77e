pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{AttributeMap, Column, KEY_COLUMN, RecordKey, Schema};
pub use value::{DataType, Value};
