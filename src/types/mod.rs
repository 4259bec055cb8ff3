//! Result set types.

mod column;
mod row;
mod value;

pub use column::{Column, ColumnInfo, NumberRepr};
pub use row::Row;
pub use value::Value;
