//! In-process data source.
//!
//! Tables live behind a shared lock; cursors keep only a position and read one
//! window per fetch, so a full result set is never copied. The database counts
//! open and total connections, which lets tests observe release behaviour.

use rowstream_common::record::{EMAIL, USER_COLUMNS, USER_ID};
use rowstream_common::{
    Connection, ConnectionConfig, DataSource, DatabaseAdmin, Error, Projection, Query, Record, Result, UserRecord,
    UserStore, Value, USER_TABLE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

#[derive(Default)]
struct Shared {
    tables: RwLock<HashMap<String, Table>>,
    open: AtomicUsize,
    opened: AtomicUsize,
    unreachable: AtomicBool,
    missing: AtomicBool,
}

/// A named in-memory database with fixed credentials.
#[derive(Clone)]
pub struct MemoryDatabase {
    name: String,
    user: String,
    password: String,
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    /// Creates an empty database named and secured after `config`.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            name: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// A server on which the database named after `config` has not been created yet.
    pub fn without_database(config: &ConnectionConfig) -> Self {
        let db = Self::new(config);
        db.shared.missing.store(true, Ordering::SeqCst);
        db
    }

    /// A client view of this database that connects with `config`'s credentials.
    pub fn source(&self, config: &ConnectionConfig) -> MemorySource {
        MemorySource { db: self.clone(), config: config.clone() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates `table` unless it exists. Returns whether it was created.
    pub fn create_table(&self, table: &str, columns: &[&str]) -> bool {
        let mut tables = self.write_tables();
        if tables.contains_key(table) {
            return false;
        }
        let columns = columns.iter().map(|c| c.to_string()).collect();
        tables.insert(table.to_string(), Table { columns, rows: Vec::new() });
        true
    }

    /// Appends a row, laid out in the table's column order. Absent columns become NULL.
    pub fn insert(&self, table: &str, record: &Record) -> Result<()> {
        let mut tables = self.write_tables();
        let target = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let mut row = vec![Value::Null; target.columns.len()];
        for (column, value) in record.iter() {
            let index = target
                .column_index(column)
                .ok_or_else(|| Error::Query(format!("Unknown column '{}' in '{}'", column, table)))?;
            row[index] = value.clone();
        }
        target.rows.push(row);
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.read_tables().get(table).map(|t| t.rows.len())
    }

    /// Connections currently open against this database.
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Connections ever opened against this database.
    pub fn total_connections(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// While unreachable, every connect attempt fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.unreachable.store(!reachable, Ordering::SeqCst);
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, HashMap<String, Table>> {
        self.shared.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, HashMap<String, Table>> {
        self.shared.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Connects to a [`MemoryDatabase`] with a given set of credentials.
#[derive(Clone)]
pub struct MemorySource {
    db: MemoryDatabase,
    config: ConnectionConfig,
}

impl MemorySource {
    fn check_server(&self) -> Result<()> {
        if self.db.shared.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!("Can't connect to server on '{}'", self.config.display_target())));
        }
        if self.config.user != self.db.user || self.config.password != self.db.password {
            return Err(Error::Connection(format!("Access denied for user '{}'", self.config.user)));
        }
        Ok(())
    }
}

impl DataSource for MemorySource {
    type Connection = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        self.check_server()?;
        if self.config.database != self.db.name || self.db.shared.missing.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!("Unknown database '{}'", self.config.database)));
        }

        self.db.shared.open.fetch_add(1, Ordering::SeqCst);
        let id = self.db.shared.opened.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(server = %self.config.display_target(), session = id, "memory connection opened");
        Ok(MemoryConnection { db: self.db.clone(), cursor: None, closed: false })
    }
}

impl DatabaseAdmin for MemorySource {
    fn create_database(&self) -> Result<()> {
        self.check_server()?;
        if self.config.database != self.db.name() {
            return Err(Error::Query(format!(
                "memory server only hosts '{}', cannot create '{}'",
                self.db.name(),
                self.config.database
            )));
        }
        if self.db.shared.missing.swap(false, Ordering::SeqCst) {
            debug!(database = self.db.name(), "database created");
        }
        Ok(())
    }
}

struct Cursor {
    table: String,
    columns: Vec<(String, usize)>,
    position: usize,
    end: usize,
}

pub struct MemoryConnection {
    db: MemoryDatabase,
    cursor: Option<Cursor>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Connection("connection already closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.cursor = None;
            self.db.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, query: &Query) -> Result<()> {
        self.ensure_open()?;
        let tables = self.db.read_tables();
        let table = tables.get(query.table()).ok_or_else(|| unknown_table(query.table()))?;

        let columns: Vec<(String, usize)> = match query.projection() {
            Projection::All => table.columns.iter().cloned().zip(0..).collect(),
            Projection::Columns(names) => names
                .iter()
                .map(|name| {
                    table
                        .column_index(name)
                        .map(|index| (name.clone(), index))
                        .ok_or_else(|| Error::Query(format!("Unknown column '{}' in 'field list'", name)))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let position = query.offset_value().map_or(0, to_usize);
        let end = query.limit_value().map_or(usize::MAX, |limit| position.saturating_add(to_usize(limit)));
        debug!(query = %query, "memory cursor opened");
        self.cursor = Some(Cursor { table: query.table().to_string(), columns, position, end });
        Ok(())
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::Query("fetch called without an executed query".to_string()))?;
        let tables = self.db.shared.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let table = tables.get(&cursor.table).ok_or_else(|| unknown_table(&cursor.table))?;

        let stop = table.rows.len().min(cursor.end);
        let start = cursor.position.min(stop);
        let take = max_rows.min(stop - start);
        let records = table.rows[start..start + take]
            .iter()
            .map(|row| cursor.columns.iter().map(|(name, index)| (name.as_str(), row[*index].clone())).collect())
            .collect::<Vec<Record>>();
        cursor.position = start + take;
        Ok(records)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

impl UserStore for MemoryConnection {
    fn create_user_table(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.db.create_table(USER_TABLE, &USER_COLUMNS) {
            debug!(table = USER_TABLE, "table created");
        }
        Ok(())
    }

    fn email_exists(&mut self, email: &str) -> Result<bool> {
        self.ensure_open()?;
        let tables = self.db.read_tables();
        let table = tables.get(USER_TABLE).ok_or_else(|| unknown_table(USER_TABLE))?;
        let index = table.column_index(EMAIL).ok_or_else(|| Error::Query(format!("Unknown column '{}'", EMAIL)))?;
        Ok(table.rows.iter().any(|row| row[index].as_str() == Some(email)))
    }

    fn insert_user(&mut self, user: &UserRecord) -> Result<()> {
        self.ensure_open()?;
        {
            let tables = self.db.read_tables();
            let table = tables.get(USER_TABLE).ok_or_else(|| unknown_table(USER_TABLE))?;
            if let Some(index) = table.column_index(USER_ID) {
                if table.rows.iter().any(|row| row[index].as_str() == Some(user.user_id.as_str())) {
                    return Err(Error::Query(format!("Duplicate entry '{}' for key 'PRIMARY'", user.user_id)));
                }
            }
        }
        self.db.insert(USER_TABLE, &user.to_record())
    }
}

fn unknown_table(table: &str) -> Error {
    Error::Query(format!("Table '{}' doesn't exist", table))
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
