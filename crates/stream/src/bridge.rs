//! Consuming blocking producers from async code.
//!
//! The producers in this crate are plain iterators that block on I/O. This
//! bridge drives one on a tokio blocking thread and pushes its items through a
//! bounded channel. Dropping the returned stream stops the producer at its next
//! send, which drops it and releases its connection.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Runs `producer` on the blocking pool, buffering at most `capacity` items.
///
/// Must be called from within a tokio runtime.
pub fn into_stream<I>(producer: I, capacity: usize) -> ReceiverStream<I::Item>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || {
        for item in producer {
            if tx.blocking_send(item).is_err() {
                debug!("stream receiver dropped, stopping producer");
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionProvider;
    use futures::StreamExt;
    use rowstream_common::record::USER_COLUMNS;
    use rowstream_common::{ConnectionConfig, Query, UserRecord, USER_TABLE};
    use rowstream_connector_memory::MemoryDatabase;
    use std::time::Duration;

    fn provider(rows: usize) -> (MemoryDatabase, ConnectionProvider<rowstream_connector_memory::MemorySource>) {
        let config = ConnectionConfig::default();
        let db = MemoryDatabase::new(&config);
        db.create_table(USER_TABLE, &USER_COLUMNS);
        for i in 0..rows {
            let user = UserRecord {
                user_id: format!("id-{}", i),
                name: format!("user{}", i),
                email: format!("user{}@example.com", i),
                age: 20 + i as u32,
            };
            db.insert(USER_TABLE, &user.to_record()).unwrap();
        }
        (db.clone(), ConnectionProvider::new(db.source(&config)))
    }

    async fn wait_until_released(db: &MemoryDatabase) {
        for _ in 0..200 {
            if db.open_connections() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection was not released");
    }

    #[tokio::test]
    async fn test_stream_yields_every_batch() {
        let (db, provider) = provider(5);
        let batches = provider.stream_batches(Query::select_all(USER_TABLE), 2).unwrap();
        let sizes: Vec<usize> = into_stream(batches, 1).map(|b| b.unwrap().len()).collect().await;
        assert_eq!(sizes, vec![2, 2, 1]);
        wait_until_released(&db).await;
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_connection() {
        let (db, provider) = provider(50);
        let mut rows = into_stream(provider.stream_rows(Query::select_all(USER_TABLE)), 1);
        assert!(rows.next().await.unwrap().is_ok());
        drop(rows);
        wait_until_released(&db).await;
        assert_eq!(db.total_connections(), 1);
    }

    #[tokio::test]
    async fn test_plain_iterators() {
        let doubled: Vec<u32> = into_stream((1..=3).map(|v| v * 2), 4).collect().await;
        assert_eq!(doubled, vec![2, 4, 6]);
    }
}
