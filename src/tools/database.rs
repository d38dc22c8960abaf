//! 数据库客户端：按需连接、执行任意 SQL、渲染结果、显式释放
//!
//! - PostgreSQL：sqlx 异步连接；SQL 以简单查询协议执行，所有列以文本形式返回，直接渲染
//! - SQLite：rusqlite 同步连接（`sqlite:` URL，开发与测试用）
//!
//! 不做连接池与事务管理；任意时刻最多一个打开的连接，由调用方负责 close。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Either, Row};

use crate::config::DatabaseTarget;
use crate::core::AgentError;

/// 渲染 NULL 时使用的占位
const NULL_CELL: &str = "NULL";

/// 查询结果：列名 + 文本化的行；无结果集的语句只带受影响行数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub rows_affected: Option<u64>,
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return match self.rows_affected {
                Some(n) => writeln!(f, "Statement executed, {} rows affected.", n),
                None => writeln!(f, "Query returned no rows."),
            };
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect();
            writeln!(f, "{}", padded.join(" | ").trim_end())
        };

        line(f, &self.columns)?;
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", sep.join("-+-"))?;
        for row in &self.rows {
            line(f, row)?;
        }
        writeln!(f, "({} rows)", self.rows.len())
    }
}

/// 连接工厂：每次调用打开一个新连接
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DatabaseConnection>, AgentError>;
}

/// 打开的连接：执行 SQL 与释放
#[async_trait]
pub trait DatabaseConnection: Send {
    /// 执行任意 SQL；失败时连接保持打开，由调用方 close
    async fn run_query(&mut self, sql: &str) -> Result<ResultSet, AgentError>;

    async fn close(self: Box<Self>) -> Result<(), AgentError>;
}

/// 根据配置选择后端
pub fn connector_for(target: &DatabaseTarget) -> Result<Arc<dyn DatabaseConnector>, AgentError> {
    match target {
        DatabaseTarget::Sqlite(path) => Ok(Arc::new(SqliteConnector::new(path))),
        DatabaseTarget::PostgresUrl(url) => {
            let options = PgConnectOptions::from_str(url.expose_secret())
                .map_err(|e| AgentError::Config(format!("invalid database url: {}", e)))?;
            Ok(Arc::new(PostgresConnector::new(options)))
        }
        DatabaseTarget::Postgres {
            host,
            port,
            database,
            user,
            password,
        } => {
            let options = PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .username(user)
                .password(password.expose_secret());
            Ok(Arc::new(PostgresConnector::new(options)))
        }
    }
}

// ---- PostgreSQL ----

pub struct PostgresConnector {
    options: PgConnectOptions,
}

impl PostgresConnector {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DatabaseConnector for PostgresConnector {
    async fn connect(&self) -> Result<Box<dyn DatabaseConnection>, AgentError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| AgentError::ConnectionFailure(e.to_string()))?;
        tracing::info!(
            host = %self.options.get_host(),
            database = ?self.options.get_database(),
            "Connected to the database."
        );
        Ok(Box::new(PostgresConnection { conn }))
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

fn pg_cell(row: &PgRow, idx: usize) -> String {
    match row.try_get_unchecked::<Option<String>, _>(idx) {
        Ok(Some(v)) => v,
        Ok(None) => NULL_CELL.to_string(),
        Err(_) => "<?>".to_string(),
    }
}

/// 没有结果列的语句（INSERT / UPDATE / DDL）只报告受影响行数
fn collect_result(columns: Vec<String>, rows: Vec<Vec<String>>, affected: u64) -> ResultSet {
    if columns.is_empty() {
        return ResultSet {
            rows_affected: Some(affected),
            ..ResultSet::default()
        };
    }
    ResultSet {
        columns,
        rows,
        rows_affected: None,
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    async fn run_query(&mut self, sql: &str) -> Result<ResultSet, AgentError> {
        // 无绑定参数的 &str 走简单查询协议：允许多条语句，结果列均为文本格式
        let mut stream = sqlx::Executor::fetch_many(&mut self.conn, sql);
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut affected = 0u64;
        while let Some(step) = stream
            .try_next()
            .await
            .map_err(|e| AgentError::QueryFailure(e.to_string()))?
        {
            match step {
                Either::Left(done) => affected += done.rows_affected(),
                Either::Right(row) => {
                    if columns.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push((0..row.len()).map(|i| pg_cell(&row, i)).collect());
                }
            }
        }

        Ok(collect_result(columns, rows, affected))
    }

    async fn close(self: Box<Self>) -> Result<(), AgentError> {
        self.conn
            .close()
            .await
            .map_err(|e| AgentError::ConnectionFailure(e.to_string()))
    }
}

// ---- SQLite ----

pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DatabaseConnector for SqliteConnector {
    async fn connect(&self) -> Result<Box<dyn DatabaseConnection>, AgentError> {
        let conn = if self.path.as_os_str() == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&self.path)
        }
        .map_err(|e| AgentError::ConnectionFailure(e.to_string()))?;
        tracing::info!(path = %self.path.display(), "Connected to the database.");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

fn render_sqlite_value(value: rusqlite::types::ValueRef<'_>) -> String {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => NULL_CELL.to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn run_sqlite(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok(ResultSet {
            rows_affected: Some(affected as u64),
            ..ResultSet::default()
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(render_sqlite_value(row.get_ref(i)?));
        }
        rows.push(cells);
    }
    Ok(ResultSet {
        columns,
        rows,
        rows_affected: None,
    })
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn run_query(&mut self, sql: &str) -> Result<ResultSet, AgentError> {
        run_sqlite(&self.conn, sql).map_err(|e| AgentError::QueryFailure(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), AgentError> {
        self.conn
            .close()
            .map_err(|(_, e)| AgentError::ConnectionFailure(e.to_string()))
    }
}
