use crate::provider::ConnectionProvider;
use rowstream_common::record::{decode_age, AGE};
use rowstream_common::{DataSource, Query, Record, Result, USER_TABLE};
use tracing::info;

/// Constant-memory running mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    total: f64,
    count: u64,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The mean so far, or `0.0` before any value was pushed.
    pub fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

impl Extend<f64> for RunningAverage {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for RunningAverage {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut average = Self::new();
        average.extend(iter);
        average
    }
}

impl<S: DataSource> ConnectionProvider<S> {
    /// Mean of a numeric column of the user table, streamed row by row.
    ///
    /// Returns `0.0` for an empty table.
    pub fn average(&self, field: &str) -> Result<f64> {
        self.average_with(field, |record| record.get_f64(field))
    }

    /// Mean user age, with each age coerced to an integer as it is read.
    pub fn average_age(&self) -> Result<f64> {
        self.average_with(AGE, |record| decode_age(record).map(f64::from))
    }

    fn average_with(&self, field: &str, value: impl Fn(&Record) -> Result<f64>) -> Result<f64> {
        let mut average = RunningAverage::new();
        for record in self.stream_rows(Query::select(USER_TABLE, [field])) {
            average.push(value(&record?)?);
        }
        info!(field, rows = average.count(), average = average.value(), "average computed");
        Ok(average.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstream_common::record::USER_COLUMNS;
    use rowstream_common::{ConnectionConfig, Error, UserRecord};
    use rowstream_connector_memory::{MemoryDatabase, MemorySource};

    fn provider(ages: &[u32]) -> (MemoryDatabase, ConnectionProvider<MemorySource>) {
        let config = ConnectionConfig::default();
        let db = MemoryDatabase::new(&config);
        db.create_table(USER_TABLE, &USER_COLUMNS);
        for (i, age) in ages.iter().enumerate() {
            let user = UserRecord {
                user_id: format!("id-{}", i),
                name: format!("user{}", i),
                email: format!("user{}@example.com", i),
                age: *age,
            };
            db.insert(USER_TABLE, &user.to_record()).unwrap();
        }
        (db.clone(), ConnectionProvider::new(db.source(&config)))
    }

    #[test]
    fn test_running_average() {
        let average: RunningAverage = [2.0, 4.0, 9.0].into_iter().collect();
        assert_eq!(average.count(), 3);
        assert_eq!(average.total(), 15.0);
        assert_eq!(average.value(), 5.0);
        assert_eq!(RunningAverage::new().value(), 0.0);
    }

    #[test]
    fn test_average_age() {
        let (db, provider) = provider(&[20, 26, 30, 18, 40]);
        assert_eq!(provider.average_age().unwrap(), 26.8);
        assert_eq!(provider.average("age").unwrap(), 26.8);
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_empty_table_averages_to_zero() {
        let (_db, provider) = provider(&[]);
        assert_eq!(provider.average_age().unwrap(), 0.0);
    }

    #[test]
    fn test_non_numeric_field_is_decode_error() {
        let (db, provider) = provider(&[20]);
        assert!(matches!(provider.average("name"), Err(Error::Decode(_))));
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_unknown_field_is_query_error() {
        let (_db, provider) = provider(&[20]);
        assert!(provider.average("height").unwrap_err().is_query());
    }
}
