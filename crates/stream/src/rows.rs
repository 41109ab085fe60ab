use crate::cursor::{CursorState, LazyCursor};
use crate::provider::ConnectionProvider;
use rowstream_common::{DataSource, Query, Record, Result};
use std::iter::FusedIterator;

/// Yields one record per pull, reading exactly one row from the cursor each time.
///
/// The connection is opened on the first pull and released when the rows run
/// out, when an error is yielded, or when the stream is dropped.
pub struct RowStream<S: DataSource> {
    cursor: LazyCursor<S>,
}

impl<S: DataSource> RowStream<S> {
    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }
}

impl<S: DataSource> Iterator for RowStream<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.cursor.pull(1)?;
        Some(rows.map(|rows| rows.into_iter().next().unwrap_or_default()))
    }
}

impl<S: DataSource> FusedIterator for RowStream<S> {}

impl<S: DataSource> ConnectionProvider<S> {
    /// Streams the rows of `query` one at a time.
    pub fn stream_rows(&self, query: Query) -> RowStream<S> {
        RowStream { cursor: LazyCursor::new(self.clone(), query) }
    }
}
