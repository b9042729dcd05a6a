//! # Chat Runtime
//!
//! 脚本驱动的对话运行时库。
//!
//! ## 架构概述
//!
//! `chat-runtime` 只负责对话逻辑与消息节奏，不关心界面。
//! 宿主层（Host）提供脚本、命令表与回调，订阅渲染列表的更新，并把用户输入报告回来：
//!
//! ```text
//! Host                                 Runtime
//!   │                                     │
//!   │── run(documents, RunOptions) ─────►│ ScriptRunner / RunContext
//!   │                                     │   └─ 线程 → 步骤 → 动作
//!   │◄── updates (Message) ──────────────│ ContentManager（分发队列）
//!   │                                     │
//!   │── report_value / add_from ────────►│ InputSynchronizer（单槽）
//!   │                                     │
//! ```
//!
//! ## 核心类型
//!
//! - [`ScriptRunner`]：运行入口
//! - [`ContentManager`]：渲染列表、分发队列与输入状态
//! - [`CommandContext`]：宿主提供的命令表能力
//! - [`Record`]：一次运行中收集到的值
//!
//! ## 使用示例
//!
//! ```ignore
//! use chat_runtime::{CommandTable, ContentManager, RunOptions, ScriptRunner, load_documents};
//!
//! let documents = load_documents(script_text)?;
//! let content = ContentManager::default();
//! let mut updates = content.subscribe_updates();
//!
//! let runner = ScriptRunner::new(content.clone());
//! let options = RunOptions::default().with_context(CommandTable::new());
//! tokio::spawn(async move { runner.run(&documents, options).await });
//!
//! while let Ok(message) = updates.recv().await {
//!     render(&message);
//!     if content.is_awaiting_input() {
//!         content.add_from(read_line());
//!     }
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`script`]：脚本结构与加载
//! - [`runtime`]：解释器
//! - [`content`]：分发队列与渲染列表
//! - [`input`]：输入同步器
//! - [`command`]：内联命令解析与调用
//! - [`template`]：占位符替换
//! - [`state`]：Record 与输入框状态
//! - [`diagnostic`]：脚本静态检查
//! - [`error`]：错误类型定义

pub mod command;
pub mod content;
pub mod diagnostic;
pub mod error;
pub mod input;
pub mod runtime;
pub mod script;
pub mod state;
pub mod template;

// 重导出核心类型
pub use command::{CommandArg, CommandContext, CommandFn, CommandLine, CommandTable, ImplicitArg};
pub use content::{
    ContentConfig, ContentManager, DeliveryHook, FixmeHook, InputValidator, Message, MessageKind,
    OptionItem, Payload,
};
pub use diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticResult, analyze_script};
pub use error::{BoxError, ChatError, ChatResult, RuntimeError, ScriptError};
pub use input::InputSynchronizer;
pub use runtime::{Callbacks, RunContext, RunOptions, ScriptRunner};
pub use script::{
    Action, Collect, CollectOption, DEFAULT_TOPIC, MatchKind, Meta, MetaEntry, QuickReply,
    ScriptDocument, Step, Thread, ThreadIndex, load_documents,
};
pub use state::{InputState, Record, value_text};
pub use template::fill_in;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let _payload = Payload::To {
            message: "Hello".to_string(),
        };

        let _options = RunOptions::default()
            .with_context(CommandTable::new())
            .with_record(Record::new());

        let _step = Step::default();

        assert_eq!(fill_in("{{x}}", &Record::new()), "x");
    }
}
