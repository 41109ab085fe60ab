//! Library side of the `rowstream` binary: the subcommands and how they run
//! against any data source.

use clap::Subcommand;
use futures::StreamExt;
use rowstream_common::record::AGE;
use rowstream_common::{DataSource, DatabaseAdmin, Query, UserStore, USER_TABLE};
use rowstream_stream::bridge::into_stream;
use rowstream_stream::{age_above, ConnectionProvider, DEFAULT_MIN_AGE};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load `name,email,age` rows from a CSV file into the user table.
    Seed { csv: PathBuf },
    /// Stream rows one at a time as JSON lines.
    Rows {
        /// Single-table SELECT to run instead of `SELECT * FROM user_data`.
        #[arg(long)]
        query: Option<String>,
        /// Stop after this many rows.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Stream users in batches, keeping those older than `min_age`.
    Batches {
        #[arg(long, default_value_t = 50)]
        size: usize,
        #[arg(long, default_value_t = DEFAULT_MIN_AGE)]
        min_age: u32,
    },
    /// Page through the user table with LIMIT/OFFSET queries.
    Pages {
        #[arg(long, default_value_t = 100)]
        size: usize,
    },
    /// Average a numeric column without loading the table.
    Average {
        #[arg(long, default_value = AGE)]
        field: String,
    },
}

/// Runs `command`, writing results to `out`.
pub async fn run<S, W>(provider: ConnectionProvider<S>, command: Command, out: &mut W) -> CliResult<()>
where
    S: DataSource + DatabaseAdmin,
    S::Connection: UserStore,
    W: Write,
{
    match command {
        Command::Seed { csv } => {
            let report = blocking(move || provider.seed_users_from_path(&csv)).await?;
            writeln!(out, "Inserted {} users, skipped {} already present", report.inserted, report.skipped)?;
        }
        Command::Rows { query, limit } => {
            let query = match query {
                Some(sql) => Query::parse(&sql, &[])?,
                None => Query::select_all(USER_TABLE),
            };
            let mut rows = into_stream(provider.stream_rows(query), 1).take(limit.unwrap_or(usize::MAX));
            while let Some(row) = rows.next().await {
                writeln!(out, "{}", serde_json::to_string(&row?)?)?;
            }
        }
        Command::Batches { size, min_age } => {
            let mut batches = into_stream(provider.filter_batches(size, age_above(min_age))?, 1);
            while let Some(batch) = batches.next().await {
                writeln!(out, "{}", serde_json::to_string(&batch?)?)?;
            }
        }
        Command::Pages { size } => {
            let mut pages = into_stream(provider.lazy_paginate(size)?, 1);
            let mut count = 0usize;
            while let Some(page) = pages.next().await {
                writeln!(out, "{}", serde_json::to_string(&page?)?)?;
                count += 1;
            }
            info!(pages = count, page_size = size, "pagination complete");
        }
        Command::Average { field } => {
            let label = field.clone();
            let average = blocking(move || {
                if field == AGE {
                    provider.average_age()
                } else {
                    provider.average(&field)
                }
            })
            .await?;
            writeln!(out, "Average {} of users: {:.2}", label, average)?;
        }
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> CliResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> rowstream_common::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowstream_common::ConnectionConfig;
    use rowstream_connector_memory::MemoryDatabase;

    const CSV: &str = "name,email,age\nAda,ada@example.com,20\nBea,bea@example.com,26\nCyd,cyd@example.com,30\n";

    async fn seeded() -> ConnectionProvider<rowstream_connector_memory::MemorySource> {
        let config = ConnectionConfig::default();
        let provider = ConnectionProvider::new(MemoryDatabase::new(&config).source(&config));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let mut out = Vec::new();
        run(provider.clone(), Command::Seed { csv: file.path().to_path_buf() }, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Inserted 3 users, skipped 0 already present\n");
        provider
    }

    async fn output(provider: &ConnectionProvider<rowstream_connector_memory::MemorySource>, command: Command) -> String {
        let mut out = Vec::new();
        run(provider.clone(), command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_average_command() {
        let provider = seeded().await;
        let text = output(&provider, Command::Average { field: AGE.to_string() }).await;
        assert_eq!(text, "Average age of users: 25.33\n");
    }

    #[tokio::test]
    async fn test_rows_command_with_query_and_limit() {
        let provider = seeded().await;
        let command = Command::Rows { query: Some("SELECT name FROM user_data".to_string()), limit: Some(2) };
        assert_eq!(output(&provider, command).await, "{\"name\":\"Ada\"}\n{\"name\":\"Bea\"}\n");
    }

    #[tokio::test]
    async fn test_batches_and_pages_commands() {
        let provider = seeded().await;
        let batches = output(&provider, Command::Batches { size: 2, min_age: 25 }).await;
        assert_eq!(batches.lines().count(), 2);
        let pages = output(&provider, Command::Pages { size: 2 }).await;
        assert_eq!(pages.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_size_is_reported() {
        let provider = seeded().await;
        let mut out = Vec::new();
        let err = run(provider, Command::Pages { size: 0 }, &mut out).await.unwrap_err();
        assert!(err.to_string().contains("page_size must be greater than zero"));
    }
}
