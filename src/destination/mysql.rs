//! MySQL destination backed by `sqlx`.
//!
//! Each [`MySqlSession`] owns exactly one connection and drives it on a
//! private current-thread runtime, so every call blocks the caller until the
//! server answers. Dropping the session closes the connection.

use std::sync::Arc;

use log::{debug, warn};
use sqlx::{
    Connection, Executor, MySqlConnection, Row,
    mysql::{MySqlConnectOptions, MySqlDatabaseError},
};
use tokio::runtime::Runtime;

use super::{ColumnInfo, ColumnType, Connect, Destination, InsertStatement, quote_identifier};
use crate::{config::DestinationConfig, error::DestinationError, router::TableName};

/// `ER_TOO_MANY_FIELDS`
pub const ER_TOO_MANY_FIELDS: u16 = 1117;
/// `ER_TOO_BIG_ROWSIZE`
pub const ER_TOO_BIG_ROWSIZE: u16 = 1118;
/// Placeholder limit of a single prepared statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// Maps a server error number to its destination error class.
pub fn classify_error_number(number: u16, message: String) -> DestinationError {
    match number {
        ER_TOO_MANY_FIELDS | ER_TOO_BIG_ROWSIZE => DestinationError::Capacity(message),
        _ => DestinationError::Statement(message),
    }
}

fn classify(err: sqlx::Error) -> DestinationError {
    match err {
        sqlx::Error::Database(db_err) => {
            match db_err.try_downcast_ref::<MySqlDatabaseError>() {
                Some(mysql_err) => classify_error_number(mysql_err.number(), db_err.to_string()),
                None => DestinationError::Statement(db_err.to_string()),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DestinationError::Connection(err.to_string()),
        other => DestinationError::Statement(other.to_string()),
    }
}

pub fn create_table_sql(table: &TableName, columns: &[String]) -> String {
    let definitions = columns
        .iter()
        .map(|column| format!("{} TEXT", quote_identifier(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {} ({definitions}) {TABLE_OPTIONS}",
        quote_identifier(table.as_str())
    )
}

pub fn add_column_sql(table: &TableName, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} TEXT",
        quote_identifier(table.as_str()),
        quote_identifier(column)
    )
}

pub fn convert_column_sql(table: &TableName, column: &str) -> String {
    format!(
        "ALTER TABLE {} MODIFY COLUMN {} TEXT",
        quote_identifier(table.as_str()),
        quote_identifier(column)
    )
}

/// Opens one MySQL connection per source file.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: DestinationConfig,
    runtime: Arc<Runtime>,
}

impl MySqlConnector {
    pub fn new(config: DestinationConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            config,
            runtime: Arc::new(runtime),
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .database(&self.config.database)
            .charset("utf8mb4");
        if let Some(password) = self.config.password() {
            options = options.password(password);
        }
        options
    }
}

impl Connect for MySqlConnector {
    type Session = MySqlSession;

    fn connect(&self) -> Result<MySqlSession, DestinationError> {
        let options = self.connect_options();
        let timeout = self.config.connect_timeout();
        let connection = self.runtime.block_on(async {
            match tokio::time::timeout(timeout, MySqlConnection::connect_with(&options)).await {
                Ok(result) => result.map_err(classify),
                Err(_) => Err(DestinationError::Connection(format!(
                    "timed out after {}s connecting to {}",
                    timeout.as_secs(),
                    self.config.describe()
                ))),
            }
        })?;
        debug!("Connected to {}", self.config.describe());

        let mut session = MySqlSession {
            runtime: Arc::clone(&self.runtime),
            connection: Some(connection),
        };
        if !self.config.strict_mode
            && let Err(err) = session.execute("SET SESSION sql_mode = ''")
        {
            warn!("Couldn't disable strict mode: {err}");
        }
        Ok(session)
    }
}

/// A single scoped MySQL connection.
pub struct MySqlSession {
    runtime: Arc<Runtime>,
    connection: Option<MySqlConnection>,
}

impl MySqlSession {
    fn connection(&mut self) -> Result<&mut MySqlConnection, DestinationError> {
        self.connection
            .as_mut()
            .ok_or_else(|| DestinationError::Connection("session already closed".to_string()))
    }

    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        debug!("{sql}");
        let runtime = Arc::clone(&self.runtime);
        let connection = self.connection()?;
        runtime
            .block_on(connection.execute(sql))
            .map(|_| ())
            .map_err(classify)
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(err) = self.runtime.block_on(connection.close())
        {
            debug!("Error closing MySQL connection: {err}");
        }
    }
}

impl Destination for MySqlSession {
    fn table_exists(&mut self, table: &TableName) -> Result<bool, DestinationError> {
        let runtime = Arc::clone(&self.runtime);
        let connection = self.connection()?;
        let count: i64 = runtime
            .block_on(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = DATABASE() AND table_name = ?",
                )
                .bind(table.as_str())
                .fetch_one(&mut *connection),
            )
            .map_err(classify)?;
        Ok(count > 0)
    }

    fn columns(&mut self, table: &TableName) -> Result<Vec<ColumnInfo>, DestinationError> {
        let runtime = Arc::clone(&self.runtime);
        let connection = self.connection()?;
        let rows = runtime
            .block_on(
                sqlx::query(
                    "SELECT CAST(column_name AS CHAR) AS name, \
                            CAST(data_type AS CHAR) AS data_type, \
                            CAST(character_maximum_length AS SIGNED) AS max_length \
                     FROM information_schema.columns \
                     WHERE table_schema = DATABASE() AND table_name = ? \
                     ORDER BY ordinal_position",
                )
                .bind(table.as_str())
                .fetch_all(&mut *connection),
            )
            .map_err(classify)?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(classify)?;
                let data_type: String = row.try_get("data_type").map_err(classify)?;
                let max_length: Option<i64> = row.try_get("max_length").map_err(classify)?;
                Ok(ColumnInfo::new(
                    name,
                    ColumnType::from_catalog(&data_type, max_length),
                ))
            })
            .collect()
    }

    fn create_table(
        &mut self,
        table: &TableName,
        columns: &[String],
    ) -> Result<(), DestinationError> {
        self.execute(&create_table_sql(table, columns))
    }

    fn add_text_column(&mut self, table: &TableName, column: &str) -> Result<(), DestinationError> {
        self.execute(&add_column_sql(table, column))
    }

    fn convert_to_text(&mut self, table: &TableName, column: &str) -> Result<(), DestinationError> {
        self.execute(&convert_column_sql(table, column))
    }

    fn insert_rows(&mut self, statement: &InsertStatement) -> Result<u64, DestinationError> {
        if statement.rows.is_empty() {
            return Ok(0);
        }
        let runtime = Arc::clone(&self.runtime);
        let connection = self.connection()?;
        runtime.block_on(async {
            let mut tx = connection.begin().await.map_err(classify)?;
            let mut written = 0u64;
            for chunk in statement.chunks(MAX_BIND_PARAMS) {
                let sql = statement.sql(chunk.len());
                let mut query = sqlx::query(&sql);
                for row in chunk {
                    for cell in row {
                        query = query.bind(cell.as_str());
                    }
                }
                match query.execute(&mut *tx).await {
                    Ok(result) => written += result.rows_affected(),
                    Err(err) => {
                        let classified = classify(err);
                        if let Err(rollback_err) = tx.rollback().await {
                            warn!("Rollback failed: {rollback_err}");
                        }
                        return Err(classified);
                    }
                }
            }
            tx.commit().await.map_err(classify)?;
            Ok(written)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_size_errors_are_capacity_failures() {
        assert!(classify_error_number(ER_TOO_BIG_ROWSIZE, "Row size too large".into()).is_capacity());
        assert!(classify_error_number(ER_TOO_MANY_FIELDS, "Too many columns".into()).is_capacity());
        assert!(!classify_error_number(1060, "Duplicate column name".into()).is_capacity());
    }

    #[test]
    fn ddl_quotes_every_identifier() {
        let table = TableName::new("order");
        assert_eq!(
            create_table_sql(&table, &["Loan Amount".to_string(), "Rate".to_string()]),
            "CREATE TABLE `order` (`Loan Amount` TEXT, `Rate` TEXT) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
        );
        assert_eq!(
            add_column_sql(&table, "select"),
            "ALTER TABLE `order` ADD COLUMN `select` TEXT"
        );
        assert_eq!(
            convert_column_sql(&table, "Notes"),
            "ALTER TABLE `order` MODIFY COLUMN `Notes` TEXT"
        );
    }

    #[test]
    fn io_failures_are_connection_errors() {
        let err = classify(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(err.is_connection());
        assert!(!classify(sqlx::Error::RowNotFound).is_connection());
    }
}
