use crate::cursor::{CursorState, LazyCursor};
use crate::filter::FilteredBatches;
use crate::provider::{require_positive, ConnectionProvider};
use rowstream_common::{Batch, DataSource, Query, Record, Result};
use std::iter::FusedIterator;
use tracing::trace;

/// Yields batches of up to `batch_size` records, one fetch-many call per pull.
///
/// The sequence ends at the first empty fetch, so only the last batch can be short.
pub struct BatchStream<S: DataSource> {
    cursor: LazyCursor<S>,
    batch_size: usize,
}

impl<S: DataSource> BatchStream<S> {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    /// Keeps only the records matching `predicate`, dropping batches left empty.
    pub fn filter_records<P>(self, predicate: P) -> FilteredBatches<Self, P>
    where
        P: FnMut(&Record) -> Result<bool>,
    {
        FilteredBatches::new(self, predicate)
    }
}

impl<S: DataSource> Iterator for BatchStream<S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.cursor.pull(self.batch_size)?;
        if let Ok(rows) = &batch {
            trace!(batch_size = self.batch_size, rows = rows.len(), "batch fetched");
        }
        Some(batch)
    }
}

impl<S: DataSource> FusedIterator for BatchStream<S> {}

impl<S: DataSource> ConnectionProvider<S> {
    /// Streams the rows of `query` in batches of at most `batch_size`.
    ///
    /// A zero `batch_size` is rejected before any connection is opened.
    pub fn stream_batches(&self, query: Query, batch_size: usize) -> Result<BatchStream<S>> {
        require_positive("batch_size", batch_size)?;
        Ok(BatchStream { cursor: LazyCursor::new(self.clone(), query), batch_size })
    }
}
