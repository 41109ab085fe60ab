//! Common crate
//!
//! Records, typed queries, connection configuration, the data source contract
//! and error handling shared by Rowstream crates.
//!
//! # Example
//! ```rust
//! use rowstream_common::{Query, Value};
//! let query = Query::parse("SELECT * FROM user_data LIMIT ? OFFSET ?", &[Value::Int(2), Value::Int(4)]).unwrap();
//! assert_eq!(query.to_string(), "SELECT * FROM user_data LIMIT 2 OFFSET 4");
//! ```

pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod source;

pub use crate::config::ConnectionConfig;
pub use error::{Error, Result};
pub use query::{Projection, Query};
pub use record::{Batch, Page, Record, UserRecord, Value, USER_TABLE};
pub use source::{Connection, DataSource, DatabaseAdmin, UserStore};
