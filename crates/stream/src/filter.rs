use crate::batches::BatchStream;
use crate::provider::ConnectionProvider;
use rowstream_common::record::decode_age;
use rowstream_common::{Batch, DataSource, Query, Record, Result, USER_TABLE};
use std::iter::FusedIterator;
use tracing::{trace, warn};

/// Age threshold used by [`ConnectionProvider::batch_processing`].
pub const DEFAULT_MIN_AGE: u32 = 25;

/// Re-emits each incoming batch with only the records matching a predicate.
///
/// Batches left empty are consumed without being yielded; source errors pass
/// through. A predicate error is yielded once and ends the stream, dropping
/// the input so its connection is released.
pub struct FilteredBatches<I, P> {
    input: Option<I>,
    predicate: P,
}

impl<I, P> FilteredBatches<I, P>
where
    I: Iterator<Item = Result<Batch>>,
    P: FnMut(&Record) -> Result<bool>,
{
    pub fn new(input: I, predicate: P) -> Self {
        Self { input: Some(input), predicate }
    }

    fn keep(&mut self, batch: Batch) -> Result<Batch> {
        let mut kept = Batch::with_capacity(batch.len());
        for record in batch {
            if (self.predicate)(&record)? {
                kept.push(record);
            }
        }
        Ok(kept)
    }
}

impl<I, P> Iterator for FilteredBatches<I, P>
where
    I: Iterator<Item = Result<Batch>>,
    P: FnMut(&Record) -> Result<bool>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let batch = match self.input.as_mut()?.next()? {
                Ok(batch) => batch,
                Err(e) => return Some(Err(e)),
            };
            let incoming = batch.len();
            match self.keep(batch) {
                Ok(kept) if kept.is_empty() => trace!(rows = incoming, "batch filtered out"),
                Ok(kept) => return Some(Ok(kept)),
                Err(e) => {
                    warn!(error = %e, "predicate failed, stopping batch filter");
                    self.input = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<I, P> FusedIterator for FilteredBatches<I, P>
where
    I: FusedIterator<Item = Result<Batch>>,
    P: FnMut(&Record) -> Result<bool>,
{
}

/// Matches records whose age, coerced to an integer, exceeds `min_age`.
///
/// A missing or non-numeric age is a `Decode` error.
pub fn age_above(min_age: u32) -> impl Fn(&Record) -> Result<bool> + Clone + Send + 'static {
    move |record| decode_age(record).map(|age| age > min_age)
}

impl<S: DataSource> ConnectionProvider<S> {
    /// Streams the user table in batches of `batch_size`, keeping records that match `predicate`.
    pub fn filter_batches<P>(&self, batch_size: usize, predicate: P) -> Result<FilteredBatches<BatchStream<S>, P>>
    where
        P: FnMut(&Record) -> Result<bool>,
    {
        Ok(self.stream_batches(Query::select_all(USER_TABLE), batch_size)?.filter_records(predicate))
    }

    /// [`ConnectionProvider::filter_batches`] with the default `age > 25` predicate.
    pub fn batch_processing(
        &self,
        batch_size: usize,
    ) -> Result<FilteredBatches<BatchStream<S>, impl Fn(&Record) -> Result<bool> + Clone + Send + 'static>> {
        self.filter_batches(batch_size, age_above(DEFAULT_MIN_AGE))
    }
}
