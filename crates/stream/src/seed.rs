use crate::provider::ConnectionProvider;
use csv::{ReaderBuilder, Trim};
use rowstream_common::{DataSource, DatabaseAdmin, Error, Result, UserRecord, UserStore, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

impl<S> ConnectionProvider<S>
where
    S: DataSource + DatabaseAdmin,
    S::Connection: UserStore,
{
    /// Loads `name,email,age` rows (with a header line) into the user table.
    ///
    /// The database and table are created if missing. Rows whose email already exists are
    /// skipped; new rows get a random UUID as `user_id`.
    pub fn seed_users<R: Read>(&self, reader: R) -> Result<SeedReport> {
        self.source().create_database()?;
        let mut guard = self.acquire()?;
        guard.create_user_table()?;

        let mut rows = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_reader(reader);
        let mut report = SeedReport::default();
        for row in rows.records() {
            let row = row?;
            let line = row.position().map_or(0, |p| p.line());
            let (name, email, age) = match (row.get(0), row.get(1), row.get(2)) {
                (Some(name), Some(email), Some(age)) => (name, email, age),
                _ => return Err(Error::Decode(format!("line {}: expected name,email,age", line))),
            };
            let age = parse_age(age).map_err(|e| Error::Decode(format!("line {}: {}", line, e)))?;

            if guard.email_exists(email)? {
                debug!(email, "skipped (already exists)");
                report.skipped += 1;
                continue;
            }
            let user = UserRecord {
                user_id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                email: email.to_string(),
                age,
            };
            guard.insert_user(&user)?;
            debug!(email, "inserted");
            report.inserted += 1;
        }
        guard.release()?;

        info!(inserted = report.inserted, skipped = report.skipped, "seeding finished");
        Ok(report)
    }

    pub fn seed_users_from_path(&self, path: &Path) -> Result<SeedReport> {
        self.seed_users(File::open(path)?)
    }
}

fn parse_age(raw: &str) -> Result<u32> {
    Value::from(raw)
        .as_i64()
        .and_then(|age| u32::try_from(age).ok())
        .ok_or_else(|| Error::Decode(format!("invalid age '{}'", raw)))
}
