use rowstream_common::{Connection, DataSource, Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out scoped connections from a data source.
///
/// Every producer in this crate goes through a provider; nothing shares a
/// connection across calls.
#[derive(Clone)]
pub struct ConnectionProvider<S: DataSource> {
    source: S,
}

impl<S: DataSource> ConnectionProvider<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Opens a connection owned by the returned guard.
    pub fn acquire(&self) -> Result<ConnectionGuard<S::Connection>> {
        let conn = self.source.connect()?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(connection_id = id, "connection acquired");
        Ok(ConnectionGuard { conn, id, released: false })
    }
}

/// Exclusive owner of an open connection.
///
/// The connection is closed exactly once: by [`ConnectionGuard::release`], or
/// on drop if the owner exits any other way.
pub struct ConnectionGuard<C: Connection> {
    conn: C,
    id: u64,
    released: bool,
}

impl<C: Connection> ConnectionGuard<C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Closes the connection now and reports a failed close.
    pub fn release(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = self.conn.close();
        debug!(connection_id = self.id, "connection released");
        result
    }
}

impl<C: Connection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: Connection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(connection_id = self.id, error = %e, "connection release failed");
        }
    }
}

pub(crate) fn require_positive(name: &str, size: usize) -> Result<()> {
    if size == 0 {
        Err(Error::InvalidArgument(format!("{} must be greater than zero", name)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstream_common::{ConnectionConfig, Query, USER_TABLE};
    use rowstream_connector_memory::MemoryDatabase;

    fn provider() -> (MemoryDatabase, ConnectionProvider<rowstream_connector_memory::MemorySource>) {
        let config = ConnectionConfig::default();
        let db = MemoryDatabase::new(&config);
        db.create_table(USER_TABLE, &rowstream_common::record::USER_COLUMNS);
        (db.clone(), ConnectionProvider::new(db.source(&config)))
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (db, provider) = provider();
        {
            let mut guard = provider.acquire().unwrap();
            guard.execute(&Query::select_all(USER_TABLE)).unwrap();
            assert_eq!(db.open_connections(), 1);
        }
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let (db, provider) = provider();
        let guard = provider.acquire().unwrap();
        guard.release().unwrap();
        assert_eq!(db.open_connections(), 0);
        assert_eq!(db.total_connections(), 1);
    }

    #[test]
    fn test_release_on_error_path() {
        let (db, provider) = provider();
        let run = || -> Result<()> {
            let mut guard = provider.acquire()?;
            guard.execute(&Query::select_all("missing_table"))?;
            Ok(())
        };
        assert!(run().unwrap_err().is_query());
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_acquire_failure_propagates() {
        let (db, provider) = provider();
        db.set_reachable(false);
        assert!(provider.acquire().err().unwrap().is_connection());
    }

    #[test]
    fn test_ids_are_distinct() {
        let (_db, provider) = provider();
        let first = provider.acquire().unwrap();
        let second = provider.acquire().unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive("batch_size", 1).is_ok());
        assert!(matches!(require_positive("batch_size", 0), Err(Error::InvalidArgument(_))));
    }
}
