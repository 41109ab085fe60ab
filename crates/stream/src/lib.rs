//! Stream crate
//!
//! Incremental producers over a [`DataSource`](rowstream_common::DataSource):
//! row-at-a-time streaming, fixed-size batches, batch filtering, offset
//! pagination and a streaming average. Every producer is a lazy iterator that
//! holds at most one row, batch or page, and releases its connection on every
//! exit path.
//!
//! # Example
//! ```rust,ignore
//! use rowstream_stream::ConnectionProvider;
//!
//! let provider = ConnectionProvider::new(source);
//! for batch in provider.batch_processing(50)? {
//!     for user in batch? {
//!         println!("{:?}", user);
//!     }
//! }
//! ```

pub mod aggregate;
pub mod batches;
pub mod bridge;
pub mod cursor;
pub mod filter;
pub mod paginate;
pub mod provider;
pub mod rows;
pub mod seed;

pub use aggregate::RunningAverage;
pub use batches::BatchStream;
pub use cursor::CursorState;
pub use filter::{age_above, FilteredBatches, DEFAULT_MIN_AGE};
pub use paginate::Paginator;
pub use provider::{ConnectionGuard, ConnectionProvider};
pub use rows::RowStream;
pub use seed::SeedReport;
