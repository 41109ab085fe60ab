//! MySQL connector.
//!
//! `mysql_async` result sets borrow their connection, so each [`MySqlConnection`]
//! runs its driver session on a dedicated thread with a current-thread runtime.
//! The calling thread sends one command and blocks on the reply; the session
//! only touches the socket while a call is outstanding, so a fetch of `n` rows
//! reads `n` rows and nothing more.
//!
//! Connections must be used from blocking code (plain threads or
//! `tokio::task::spawn_blocking`), never from inside an async task.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Row};
use rowstream_common::query::check_identifier;
use rowstream_common::{
    Connection, ConnectionConfig, DataSource, DatabaseAdmin, Error, Query, Record, Result, UserRecord, UserStore, Value,
};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const CREATE_USER_TABLE: &str = "CREATE TABLE IF NOT EXISTS user_data (
    user_id CHAR(36) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    age DECIMAL NOT NULL,
    INDEX(email)
)";
const SELECT_BY_EMAIL: &str = "SELECT user_id FROM user_data WHERE email = ?";
const INSERT_USER: &str = "INSERT INTO user_data (user_id, name, email, age) VALUES (?, ?, ?, ?)";

/// Opens MySQL connections with a fixed configuration.
#[derive(Debug, Clone)]
pub struct MySqlSource {
    config: ConnectionConfig,
}

impl MySqlSource {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

impl DataSource for MySqlSource {
    type Connection = MySqlConnection;

    fn connect(&self) -> Result<MySqlConnection> {
        let (commands, receiver) = mpsc::channel(1);
        let (ready, connected) = oneshot::channel();
        let config = self.config.clone();
        let worker = std::thread::Builder::new()
            .name("rowstream-mysql".to_string())
            .spawn(move || run_session(config, receiver, ready))
            .map_err(|e| Error::Connection(format!("failed to start session thread: {}", e)))?;

        connected.blocking_recv().map_err(|_| session_lost())??;
        debug!(server = %self.config.display_target(), "mysql session established");
        Ok(MySqlConnection { commands: Some(commands), worker: Some(worker) })
    }
}

impl DatabaseAdmin for MySqlSource {
    fn create_database(&self) -> Result<()> {
        let sql = create_database_sql(&self.config.database)?;
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(run_on_server(&self.config, sql))?;
        debug!(database = %self.config.database, "database ready");
        Ok(())
    }
}

/// Runs one statement on a connection that selects no database.
async fn run_on_server(config: &ConnectionConfig, sql: String) -> Result<()> {
    let mut conn = Conn::new(options(config).db_name(None::<String>))
        .await
        .map_err(|e| Error::Connection(format!("{}: {}", config.display_target(), e)))?;
    let result = conn.query_drop(sql).await.map_err(query_error);
    if let Err(e) = conn.disconnect().await {
        warn!(error = %e, "mysql disconnect failed");
    }
    result
}

fn create_database_sql(database: &str) -> Result<String> {
    check_identifier(database)?;
    Ok(format!("CREATE DATABASE IF NOT EXISTS `{}`", database))
}

enum Command {
    Execute { sql: String, params: Vec<Value>, reply: oneshot::Sender<Result<()>> },
    Fetch { max_rows: usize, reply: oneshot::Sender<Result<Vec<Record>>> },
    Statement { sql: String, params: Vec<Value>, reply: oneshot::Sender<Result<()>> },
    Exists { sql: String, params: Vec<Value>, reply: oneshot::Sender<Result<bool>> },
    Close { reply: oneshot::Sender<Result<()>> },
}

/// Handle to a session thread owning one MySQL connection.
pub struct MySqlConnection {
    commands: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl MySqlConnection {
    fn call<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let commands =
            self.commands.as_ref().ok_or_else(|| Error::Connection("connection already closed".to_string()))?;
        let (reply, response) = oneshot::channel();
        commands.blocking_send(command(reply)).map_err(|_| session_lost())?;
        response.blocking_recv().map_err(|_| session_lost())?
    }
}

impl Connection for MySqlConnection {
    fn execute(&mut self, query: &Query) -> Result<()> {
        let (sql, params) = query.to_sql()?;
        self.call(|reply| Command::Execute { sql, params, reply })
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Record>> {
        self.call(|reply| Command::Fetch { max_rows, reply })
    }

    fn close(&mut self) -> Result<()> {
        let result = self.call(|reply| Command::Close { reply });
        self.commands = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                return Err(Error::Connection("mysql session thread panicked".to_string()));
            }
        }
        result
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        // Closing the channel makes the session disconnect on its own.
        self.commands = None;
    }
}

impl UserStore for MySqlConnection {
    fn create_user_table(&mut self) -> Result<()> {
        self.call(|reply| Command::Statement { sql: CREATE_USER_TABLE.to_string(), params: Vec::new(), reply })
    }

    fn email_exists(&mut self, email: &str) -> Result<bool> {
        let params = vec![Value::from(email)];
        self.call(|reply| Command::Exists { sql: SELECT_BY_EMAIL.to_string(), params, reply })
    }

    fn insert_user(&mut self, user: &UserRecord) -> Result<()> {
        let params = vec![
            Value::from(user.user_id.as_str()),
            Value::from(user.name.as_str()),
            Value::from(user.email.as_str()),
            Value::from(user.age),
        ];
        self.call(|reply| Command::Statement { sql: INSERT_USER.to_string(), params, reply })
    }
}

fn run_session(config: ConnectionConfig, commands: mpsc::Receiver<Command>, ready: oneshot::Sender<Result<()>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(Error::Io(e)));
            return;
        }
    };
    runtime.block_on(session(config, commands, ready));
}

async fn session(
    config: ConnectionConfig,
    mut commands: mpsc::Receiver<Command>,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut conn = match Conn::new(options(&config)).await {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(Error::Connection(format!("{}: {}", config.display_target(), e))));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        let _ = conn.disconnect().await;
        return;
    }

    let mut next = commands.recv().await;
    while let Some(command) = next.take() {
        match command {
            Command::Execute { sql, params, reply } => {
                let mut result = match conn.exec_iter(sql, to_params(params)).await {
                    Ok(result) => result,
                    Err(e) => {
                        let _ = reply.send(Err(query_error(e)));
                        next = commands.recv().await;
                        continue;
                    }
                };
                let _ = reply.send(Ok(()));

                // Serve fetches until the caller moves on to another command.
                next = loop {
                    match commands.recv().await {
                        Some(Command::Fetch { max_rows, reply }) => {
                            let _ = reply.send(fetch_rows(&mut result, max_rows).await);
                        }
                        other => break other,
                    }
                };
                if let Err(e) = result.drop_result().await {
                    warn!(error = %e, "failed to discard unread rows");
                }
            }
            Command::Fetch { reply, .. } => {
                let _ = reply.send(Err(Error::Query("fetch called without an executed query".to_string())));
                next = commands.recv().await;
            }
            Command::Statement { sql, params, reply } => {
                let _ = reply.send(conn.exec_drop(sql, to_params(params)).await.map_err(query_error));
                next = commands.recv().await;
            }
            Command::Exists { sql, params, reply } => {
                let found = conn.exec_first::<Row, _, _>(sql, to_params(params)).await;
                let _ = reply.send(found.map(|row| row.is_some()).map_err(query_error));
                next = commands.recv().await;
            }
            Command::Close { reply } => {
                let _ = reply.send(conn.disconnect().await.map_err(|e| Error::Connection(e.to_string())));
                return;
            }
        }
    }

    if let Err(e) = conn.disconnect().await {
        warn!(error = %e, "mysql disconnect failed");
    }
}

async fn fetch_rows(
    result: &mut mysql_async::QueryResult<'_, 'static, mysql_async::BinaryProtocol>,
    max_rows: usize,
) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(max_rows.min(1024));
    while records.len() < max_rows {
        match result.next().await.map_err(query_error)? {
            Some(row) => records.push(to_record(&row)),
            None => break,
        }
    }
    Ok(records)
}

fn options(config: &ConnectionConfig) -> OptsBuilder {
    OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()))
}

fn to_params(params: Vec<Value>) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.into_iter().map(to_mysql).collect())
    }
}

fn to_mysql(value: Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Int(v) => mysql_async::Value::Int(v),
        Value::UInt(v) => mysql_async::Value::UInt(v),
        Value::Float(v) => mysql_async::Value::Double(v),
        Value::Text(s) => mysql_async::Value::Bytes(s.into_bytes()),
    }
}

fn from_mysql(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as My;
    match value {
        My::NULL => Value::Null,
        My::Bytes(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        My::Int(v) => Value::Int(*v),
        My::UInt(v) => Value::UInt(*v),
        My::Float(v) => Value::Float(f64::from(*v)),
        My::Double(v) => Value::Float(*v),
        My::Date(y, m, d, h, mi, s, us) => {
            Value::Text(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}", y, m, d, h, mi, s, us))
        }
        My::Time(negative, days, h, mi, s, us) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u64::from(*days) * 24 + u64::from(*h);
            Value::Text(format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us))
        }
    }
}

fn to_record(row: &Row) -> Record {
    let columns = row.columns_ref();
    let mut record = Record::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = row.as_ref(index).map(from_mysql).unwrap_or(Value::Null);
        record.push(column.name_str().into_owned(), value);
    }
    record
}

fn query_error(e: mysql_async::Error) -> Error {
    Error::Query(e.to_string())
}

fn session_lost() -> Error {
    Error::Connection("mysql session terminated".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(from_mysql(&mysql_async::Value::Bytes(b"26".to_vec())), Value::from("26"));
        assert_eq!(from_mysql(&mysql_async::Value::Int(-4)), Value::Int(-4));
        assert_eq!(from_mysql(&mysql_async::Value::NULL), Value::Null);
        assert_eq!(to_mysql(Value::UInt(7)), mysql_async::Value::UInt(7));
        assert_eq!(to_mysql(Value::from("x")), mysql_async::Value::Bytes(b"x".to_vec()));
    }

    #[test]
    fn test_create_database_sql() {
        assert_eq!(create_database_sql("ALX_prodev").unwrap(), "CREATE DATABASE IF NOT EXISTS `ALX_prodev`");
        assert!(create_database_sql("x`; DROP TABLE user_data").unwrap_err().is_query());
    }

    #[test]
    fn test_empty_params() {
        assert!(matches!(to_params(Vec::new()), Params::Empty));
        assert!(matches!(to_params(vec![Value::Int(1)]), Params::Positional(_)));
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let config =
            ConnectionConfig { host: "127.0.0.1".to_string(), port: 1, ..ConnectionConfig::default() };
        let source = MySqlSource::new(config);
        assert!(source.connect().err().unwrap().is_connection());
        assert!(source.create_database().unwrap_err().is_connection());
    }

    // Needs a reachable server configured through DB_* variables with a seeded user_data table.
    #[test]
    #[ignore]
    fn test_live_batches() {
        let config = ConnectionConfig::load(None).unwrap();
        let mut conn = MySqlSource::new(config).connect().unwrap();
        conn.execute(&Query::select_all(rowstream_common::USER_TABLE)).unwrap();
        let batch = conn.fetch(2).unwrap();
        assert!(batch.len() <= 2);
        conn.close().unwrap();
    }
}
