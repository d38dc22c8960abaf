//! 应用配置：从 config/default.toml、config/local.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FOREMAN__*` 覆盖（双下划线表示嵌套，如 `FOREMAN__LLM__MODEL=llama3-8b-8192`），
//! 最后用常见变量名（`GROQ_API_KEY`、`SERPAPI_API_KEY`、`DB_HOST` 等）补齐仍为空的字段。
//! 凭据没有任何内置默认值：缺失时 [`Credentials::resolve`] 直接返回 Config 错误。

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub search: SearchSection,
    pub database: DatabaseSection,
    pub retrieval: RetrievalSection,
}

/// [app] 段：退出关键字与 RAG 快捷触发词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub exit_keyword: String,
    /// 输入包含其中任一子串（忽略大小写）时跳过分类，直接启动 RAG
    pub rag_triggers: Vec<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            exit_keyword: "exit".to_string(),
            rag_triggers: vec!["rag".to_string(), "internal docs".to_string()],
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型、生成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 在换行或 "User:" 处截断，避免模型续写多轮对话
    pub stop: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            api_key: None,
            max_tokens: 150,
            temperature: 0.7,
            stop: vec!["\n".to_string(), "User:".to_string()],
            timeout_secs: 60,
        }
    }
}

/// [search] 段：SerpAPI 风格搜索端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub engine: String,
    pub num_results: u32,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://serpapi.com/search".to_string(),
            engine: "google".to_string(),
            num_results: 10,
            api_key: None,
            timeout_secs: 15,
        }
    }
}

/// [database] 段：完整 URL，或 host/port/name/user/password 组合
///
/// `url` 以 `sqlite:` 开头时使用本地 SQLite 文件（开发 / 测试）。
/// `port` 未配置时使用 [`DEFAULT_DB_PORT`]。
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

pub const DEFAULT_DB_PORT: u16 = 5432;

/// [retrieval] 段：外部 RAG 应用的两个启动脚本与就绪探测
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub server_command: PathBuf,
    pub query_command: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// 服务端 stdout 中出现该子串即视为就绪；未配置时等待满 startup_timeout_secs
    pub ready_sentinel: Option<String>,
    pub startup_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            server_command: PathBuf::from("rag/start_server.sh"),
            query_command: PathBuf::from("rag/start_query.sh"),
            working_dir: None,
            ready_sentinel: None,
            startup_timeout_secs: 30,
            poll_interval_ms: 500,
        }
    }
}

impl AppConfig {
    /// 用常见环境变量名补齐仍为空的字段（不覆盖 TOML / FOREMAN__* 已给出的值）
    pub fn fill_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| lookup(n).filter(|v| !v.trim().is_empty()))
        };

        if self.llm.api_key.is_none() {
            self.llm.api_key = first(&["GROQ_API_KEY", "LLM_API_KEY"]);
        }
        if self.search.api_key.is_none() {
            self.search.api_key = first(&["SERPAPI_API_KEY"]);
        }

        let db = &mut self.database;
        if db.url.is_none() {
            db.url = first(&["DATABASE_URL"]);
        }
        if db.host.is_none() {
            db.host = first(&["DB_HOST"]);
        }
        if db.name.is_none() {
            db.name = first(&["DB_NAME"]);
        }
        if db.user.is_none() {
            db.user = first(&["DB_USER"]);
        }
        if db.password.is_none() {
            db.password = first(&["DB_PASSWORD"]);
        }
        if db.port.is_none() {
            if let Some(raw) = first(&["DB_PORT"]) {
                match raw.trim().parse::<u16>() {
                    Ok(port) => db.port = Some(port),
                    Err(e) => {
                        tracing::warn!(value = %raw, error = %e, "ignoring malformed DB_PORT");
                    }
                }
            }
        }
    }
}

/// 数据库目标：由 [database] 段解析而来
#[derive(Debug, Clone)]
pub enum DatabaseTarget {
    /// 本地 SQLite 文件（`sqlite::memory:` 或 `sqlite://path`）
    Sqlite(PathBuf),
    /// 完整 PostgreSQL 连接串（可能含密码）
    PostgresUrl(SecretString),
    Postgres {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: SecretString,
    },
}

/// 校验后的凭据集合；任何缺失都在启动时一次性报告
#[derive(Debug, Clone)]
pub struct Credentials {
    pub llm_api_key: SecretString,
    pub search_api_key: SecretString,
    pub database: DatabaseTarget,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn sqlite_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    Some(PathBuf::from(rest))
}

impl Credentials {
    /// 校验所有必需凭据；缺失项汇总进同一条 Config 错误
    pub fn resolve(cfg: &AppConfig) -> Result<Self, AgentError> {
        let mut missing = Vec::new();

        let llm_api_key = present(&cfg.llm.api_key);
        if llm_api_key.is_none() {
            missing.push("llm.api_key (FOREMAN__LLM__API_KEY or GROQ_API_KEY)");
        }
        let search_api_key = present(&cfg.search.api_key);
        if search_api_key.is_none() {
            missing.push("search.api_key (FOREMAN__SEARCH__API_KEY or SERPAPI_API_KEY)");
        }

        let db = &cfg.database;
        let database = match present(&db.url) {
            Some(url) => match sqlite_path(&url) {
                Some(path) => Some(DatabaseTarget::Sqlite(path)),
                None => Some(DatabaseTarget::PostgresUrl(SecretString::from(url))),
            },
            None => {
                let host = present(&db.host);
                let name = present(&db.name);
                let user = present(&db.user);
                let password = present(&db.password);
                if host.is_none() {
                    missing.push("database.host (DB_HOST)");
                }
                if name.is_none() {
                    missing.push("database.name (DB_NAME)");
                }
                if user.is_none() {
                    missing.push("database.user (DB_USER)");
                }
                if password.is_none() {
                    missing.push("database.password (DB_PASSWORD)");
                }
                match (host, name, user, password) {
                    (Some(host), Some(database), Some(user), Some(password)) => {
                        Some(DatabaseTarget::Postgres {
                            host,
                            port: db.port.unwrap_or(DEFAULT_DB_PORT),
                            database,
                            user,
                            password: SecretString::from(password),
                        })
                    }
                    _ => None,
                }
            }
        };

        match (llm_api_key, search_api_key, database) {
            (Some(llm), Some(search), Some(database)) if missing.is_empty() => Ok(Self {
                llm_api_key: SecretString::from(llm),
                search_api_key: SecretString::from(search),
                database,
            }),
            _ => Err(AgentError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FOREMAN__* 可覆盖，再用常见变量名补齐
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 追加同目录的 local.toml（不入库的本地凭据），或调用方传入的 config_path
/// 3. 叠加环境变量 FOREMAN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_dirs = ["config", "../config", "."];
    for dir in default_dirs {
        let path = format!("{}/default.toml", dir);
        if std::path::Path::new(&path).exists() {
            builder = builder
                .add_source(config::File::with_name(&format!("{}/default", dir)).required(false))
                .add_source(config::File::with_name(&format!("{}/local", dir)).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FOREMAN")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.fill_from_env(|name| std::env::var(name).ok());
    Ok(cfg)
}
