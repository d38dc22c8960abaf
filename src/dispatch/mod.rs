//! 调度层：快捷意图、分类 Prompt、指令解析、主循环

pub mod directive;
pub mod intent;
pub mod loop_;
pub mod prompt;

pub use directive::{extract_argument, parse_directive, ActionDirective, ActionTag, DirectiveError};
pub use intent::{Shortcut, ShortcutMatcher};
pub use loop_::Dispatcher;
pub use prompt::PromptTemplate;
