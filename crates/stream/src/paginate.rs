use crate::cursor::CursorState;
use crate::provider::{require_positive, ConnectionProvider};
use rowstream_common::{Connection, DataSource, Page, Query, Result, USER_TABLE};
use std::iter::FusedIterator;
use tracing::debug;

/// Lazily walks the user table with `LIMIT page_size OFFSET offset` queries.
///
/// Each page opens and releases its own connection, so pages do not share a
/// snapshot: rows written between fetches may be skipped or repeated.
pub struct Paginator<S: DataSource> {
    provider: ConnectionProvider<S>,
    page_size: usize,
    offset: u64,
    state: CursorState,
}

impl<S: DataSource> Paginator<S> {
    /// Offset of the next page to fetch.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> CursorState {
        self.state
    }
}

impl<S: DataSource> Iterator for Paginator<S> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, CursorState::Exhausted | CursorState::Closed) {
            return None;
        }
        self.state = CursorState::Active;
        match self.provider.paginate_users(self.page_size, self.offset) {
            Ok(page) if page.is_empty() => {
                debug!(offset = self.offset, "pagination finished");
                self.state = CursorState::Closed;
                None
            }
            Ok(page) => {
                self.offset += self.page_size as u64;
                Some(Ok(page))
            }
            Err(e) => {
                self.state = CursorState::Closed;
                Some(Err(e))
            }
        }
    }
}

impl<S: DataSource> FusedIterator for Paginator<S> {}

impl<S: DataSource> ConnectionProvider<S> {
    /// Fetches one page of the user table on a connection of its own.
    pub fn paginate_users(&self, page_size: usize, offset: u64) -> Result<Page> {
        require_positive("page_size", page_size)?;
        let query = Query::select_all(USER_TABLE).limit(page_size as u64).offset(offset);

        let mut guard = self.acquire()?;
        guard.execute(&query)?;
        let mut page = Page::with_capacity(page_size.min(1024));
        loop {
            let rows = guard.fetch(page_size)?;
            if rows.is_empty() {
                break;
            }
            page.extend(rows);
        }
        guard.release()?;

        debug!(offset, page_size, rows = page.len(), "page fetched");
        Ok(page)
    }

    /// Yields pages of `page_size` starting at offset 0 until an empty page comes back.
    pub fn lazy_paginate(&self, page_size: usize) -> Result<Paginator<S>> {
        require_positive("page_size", page_size)?;
        Ok(Paginator { provider: self.clone(), page_size, offset: 0, state: CursorState::Unstarted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstream_common::record::{USER_COLUMNS, USER_ID};
    use rowstream_common::{ConnectionConfig, Error, UserRecord};
    use rowstream_connector_memory::{MemoryDatabase, MemorySource};

    fn provider(rows: usize) -> (MemoryDatabase, ConnectionProvider<MemorySource>) {
        let config = ConnectionConfig::default();
        let db = MemoryDatabase::new(&config);
        db.create_table(USER_TABLE, &USER_COLUMNS);
        for i in 0..rows {
            let user = UserRecord {
                user_id: format!("id-{}", i),
                name: format!("user{}", i),
                email: format!("user{}@example.com", i),
                age: 30,
            };
            db.insert(USER_TABLE, &user.to_record()).unwrap();
        }
        (db.clone(), ConnectionProvider::new(db.source(&config)))
    }

    #[test]
    fn test_pages_cover_table_once() {
        let (db, provider) = provider(7);
        for page_size in 1..=9 {
            let ids: Vec<String> = provider
                .lazy_paginate(page_size)
                .unwrap()
                .flat_map(|page| page.unwrap())
                .map(|r| r.get_str(USER_ID).unwrap().to_string())
                .collect();
            let expected: Vec<String> = (0..7).map(|i| format!("id-{}", i)).collect();
            assert_eq!(ids, expected);
        }
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_offset_advances_by_page_size() {
        let (db, provider) = provider(5);
        let mut pages = provider.lazy_paginate(2).unwrap();
        assert_eq!(pages.state(), CursorState::Unstarted);
        assert_eq!(pages.next().unwrap().unwrap().len(), 2);
        assert_eq!(pages.offset(), 2);
        assert_eq!(pages.next().unwrap().unwrap().len(), 2);
        assert_eq!(pages.next().unwrap().unwrap().len(), 1);
        assert_eq!(pages.offset(), 6);
        assert!(pages.next().is_none());
        assert_eq!(pages.state(), CursorState::Closed);
        // One connection per page fetch, including the empty one.
        assert_eq!(db.total_connections(), 4);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let (_db, provider) = provider(1);
        assert!(matches!(provider.lazy_paginate(0), Err(Error::InvalidArgument(_))));
        assert!(matches!(provider.paginate_users(0, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_connection_error_ends_pagination() {
        let (db, provider) = provider(4);
        let mut pages = provider.lazy_paginate(2).unwrap();
        assert!(pages.next().unwrap().is_ok());
        db.set_reachable(false);
        assert!(pages.next().unwrap().unwrap_err().is_connection());
        assert!(pages.next().is_none());
    }
}
