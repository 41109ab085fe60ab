//! The contract every connector implements.

use crate::error::Result;
use crate::query::Query;
use crate::record::{Record, UserRecord};

/// A queryable data source that hands out exclusively owned connections.
///
/// Sources are cheap to clone; each producer keeps its own copy so it can
/// open connections lazily.
pub trait DataSource: Clone + Send + Sync + 'static {
    type Connection: Connection;

    /// Opens a new connection. Unreachable hosts and rejected credentials
    /// fail with `Error::Connection`.
    fn connect(&self) -> Result<Self::Connection>;
}

/// An open connection with at most one active result cursor.
pub trait Connection: Send {
    /// Runs `query` and positions a cursor before its first row. Any previous
    /// cursor on this connection is discarded.
    fn execute(&mut self, query: &Query) -> Result<()>;

    /// Pulls up to `max_rows` rows from the active cursor. An empty vec means
    /// the cursor is exhausted.
    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Record>>;

    /// Releases the connection. Called exactly once by the owning guard.
    fn close(&mut self) -> Result<()>;
}

/// Server-level provisioning for sources that can create their own database.
pub trait DatabaseAdmin {
    /// Creates the configured database if it does not exist yet. Connects
    /// without selecting a database, so it works against a fresh server.
    fn create_database(&self) -> Result<()>;
}

/// Write access to the user table, used to seed a source.
pub trait UserStore {
    fn create_user_table(&mut self) -> Result<()>;

    fn email_exists(&mut self, email: &str) -> Result<bool>;

    fn insert_user(&mut self, user: &UserRecord) -> Result<()>;
}
