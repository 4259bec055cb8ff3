//! Oracle driver layer over a native (ODPI-style) client library.
//!
//! Turns generic query arguments into typed native variable buffers,
//! materializes fetched rows out of native buffer arrays and streams LOBs
//! through chunked native locators. The native client library sits behind
//! the [`native::Native`] trait; [`native::memory::MemoryNative`] is a
//! complete in-memory implementation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use oracle_dpi_rs::native::memory::{MemColumn, MemValue, MemoryNative, Script};
//! use oracle_dpi_rs::native::{NativeTypeNum, OracleTypeNum};
//! use oracle_dpi_rs::{BindArg, Connection, Cursor, Result, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let native = Arc::new(MemoryNative::new());
//!     native.script(
//!         "SELECT name FROM users WHERE id = :id",
//!         Script::query(
//!             vec![MemColumn::new("NAME", OracleTypeNum::Varchar, NativeTypeNum::Bytes).size(30)],
//!             vec![vec![MemValue::Text("scott".into())]],
//!         ),
//!     );
//!
//!     let conn = Connection::new(native);
//!     let stmt = conn.prepare("SELECT name FROM users WHERE id = :id").await?;
//!     let mut rows = stmt.query(vec![BindArg::named("id", 7i64)]).await?;
//!     while let Some(row) = rows.next().await? {
//!         assert_eq!(row.get_by_name("name"), Some(&Value::String("scott".into())));
//!     }
//!     rows.close().await?;
//!     stmt.close().await?;
//!     Ok(())
//! }
//! ```

pub mod bind;
pub mod buffer;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod lob;
pub mod logging;
pub mod native;
pub mod statement;
pub mod types;

// Re-export main types
pub use bind::{BindArg, BindValue};
pub use cancel::CancelToken;
pub use config::StatementOptions;
pub use connection::Connection;
pub use cursor::{Cursor, CursorStreamExt, RowCursor};
pub use error::{Error, Result};
pub use lob::{Lob, LobReader, LobWriter};
pub use statement::Statement;
pub use types::{Column, ColumnInfo, NumberRepr, Row, Value};
