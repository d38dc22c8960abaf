//! 分类 Prompt
//!
//! 内置模板列出三个动作、两条消歧规则与若干示例，并把用户原文放进 `User request: "..."` 字段。
//! 可用 config/prompts/classify.txt 覆盖，文件中必须包含 `{user_request}` 占位符。

/// 用户原文占位符
pub const USER_REQUEST_PLACEHOLDER: &str = "{user_request}";

const DEFAULT_TEMPLATE: &str = r#"You route each user request to exactly one action. Think about what the user needs, then choose.

Available actions:
- search_web(query): search the web for the given query
- connect_to_database(): open the database so the user can run an SQL query
- start_rag_app(): start the RAG application for internal document processing

Rules:
- If the request mentions "RAG" or "internal docs", respond with: Action: start_rag_app()
- If the request mentions "run query", respond with: Action: connect_to_database()
- Otherwise pick the single best action.

Examples:
User request: "Search for machine learning updates"
Response: Action: search_web("machine learning updates")

User request: "Research the association between dietary iron and type two diabetes"
Response: Action: search_web("iron and type two diabetes association")

User request: "Connect to my database"
Response: Action: connect_to_database()

User request: "Run a query"
Response: Action: connect_to_database()

User request: "Use RAG on internal docs"
Response: Action: start_rag_app()

User request: "{user_request}"
Respond with one line only, in the format: Action: <action_name>(<argument>)"#;

/// 分类 Prompt 模板
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// 自定义模板；缺少占位符时返回 None
    pub fn custom(template: impl Into<String>) -> Option<Self> {
        let template = template.into();
        template
            .contains(USER_REQUEST_PLACEHOLDER)
            .then_some(Self { template })
    }

    /// 依次查找 config/prompts/classify.txt、../config/prompts/classify.txt，找不到或不合规则用内置模板
    pub fn load() -> Self {
        let found = [
            "config/prompts/classify.txt",
            "../config/prompts/classify.txt",
        ]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok().map(|t| (p, t)));

        match found {
            Some((path, text)) => Self::custom(text).unwrap_or_else(|| {
                tracing::warn!(path, "prompt template lacks {{user_request}}, using built-in");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn render(&self, user_request: &str) -> String {
        self.template.replace(USER_REQUEST_PLACEHOLDER, user_request)
    }
}
