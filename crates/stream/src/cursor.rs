use crate::provider::{ConnectionGuard, ConnectionProvider};
use rowstream_common::{Connection, DataSource, Query, Record, Result};
use tracing::{debug, trace};

/// Lifecycle of a producer.
///
/// `Unstarted -> Active -> Exhausted -> Closed`; a producer that is dropped
/// or fails while active goes straight to `Closed`. `Exhausted` only lasts
/// until the connection is released within the same pull, so callers
/// observe a finished producer as `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing pulled yet; no connection open.
    Unstarted,
    /// Connection open, cursor live.
    Active,
    /// The cursor returned no rows; release pending.
    Exhausted,
    /// Connection released.
    Closed,
}

/// A result cursor that opens its connection on the first pull.
pub(crate) struct LazyCursor<S: DataSource> {
    provider: ConnectionProvider<S>,
    query: Query,
    guard: Option<ConnectionGuard<S::Connection>>,
    state: CursorState,
}

impl<S: DataSource> LazyCursor<S> {
    pub(crate) fn new(provider: ConnectionProvider<S>, query: Query) -> Self {
        Self { provider, query, guard: None, state: CursorState::Unstarted }
    }

    pub(crate) fn state(&self) -> CursorState {
        self.state
    }

    /// Pulls up to `max_rows` rows. Returns `None` once the cursor has ended;
    /// an error is returned once and closes the cursor.
    pub(crate) fn pull(&mut self, max_rows: usize) -> Option<Result<Vec<Record>>> {
        match self.state {
            CursorState::Unstarted => {
                if let Err(e) = self.open() {
                    self.state = CursorState::Closed;
                    return Some(Err(e));
                }
            }
            CursorState::Active => {}
            CursorState::Exhausted | CursorState::Closed => return None,
        }

        let guard = self.guard.as_mut()?;
        match guard.fetch(max_rows) {
            Ok(rows) if rows.is_empty() => {
                self.state = CursorState::Exhausted;
                trace!(query = %self.query, "cursor exhausted");
                self.close().err().map(Err)
            }
            Ok(rows) => Some(Ok(rows)),
            Err(e) => {
                // The fetch error wins over a failed close.
                let _ = self.close();
                Some(Err(e))
            }
        }
    }

    fn open(&mut self) -> Result<()> {
        let mut guard = self.provider.acquire()?;
        guard.execute(&self.query)?;
        debug!(connection_id = guard.id(), query = %self.query, "cursor opened");
        self.guard = Some(guard);
        self.state = CursorState::Active;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state = CursorState::Closed;
        match self.guard.take() {
            Some(guard) => guard.release(),
            None => Ok(()),
        }
    }
}
