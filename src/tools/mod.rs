//! 外部集成：Web 搜索、数据库、RAG 子系统启动器

pub mod database;
pub mod retrieval;
pub mod search;

pub use database::{connector_for, DatabaseConnection, DatabaseConnector, ResultSet, SqliteConnector};
pub use retrieval::{LaunchReport, LaunchSettings, ProcessLauncher, RetrievalLauncher};
pub use search::{SearchBackend, SearchResult, SerpApiClient};
