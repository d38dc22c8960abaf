//! 快捷意图匹配
//!
//! 在调用 LLM 之前先做规则匹配：退出关键字、RAG 触发词。命中时本轮不发起任何模型请求。

use crate::config::AppSection;

/// 规则命中的快捷动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// 输入（去除首尾空白后）忽略大小写等于退出关键字
    Exit,
    /// 输入忽略大小写包含任一 RAG 触发子串
    Rag,
}

/// 快捷匹配器：退出关键字与触发词均在构造时转小写
#[derive(Debug, Clone)]
pub struct ShortcutMatcher {
    exit_keyword: String,
    rag_triggers: Vec<String>,
}

impl Default for ShortcutMatcher {
    fn default() -> Self {
        Self::from_config(&AppSection::default())
    }
}

impl ShortcutMatcher {
    pub fn new<I, S>(exit_keyword: &str, rag_triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            exit_keyword: exit_keyword.trim().to_lowercase(),
            rag_triggers: rag_triggers
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(app: &AppSection) -> Self {
        Self::new(&app.exit_keyword, &app.rag_triggers)
    }

    pub fn exit_keyword(&self) -> &str {
        &self.exit_keyword
    }

    /// 退出优先于 RAG；均未命中返回 None（交给 LLM 分类）
    ///
    /// 触发词按子串匹配，因此 "drag" 之类的单词同样会命中 "rag"。
    pub fn fast_match(&self, input: &str) -> Option<Shortcut> {
        let input_lower = input.trim().to_lowercase();
        if input_lower == self.exit_keyword {
            return Some(Shortcut::Exit);
        }
        if self
            .rag_triggers
            .iter()
            .any(|t| input_lower.contains(t.as_str()))
        {
            return Some(Shortcut::Rag);
        }
        None
    }
}
