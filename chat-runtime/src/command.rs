//! # Command 模块
//!
//! 文本行中内联命令的解析与调用。
//!
//! ## 语法
//!
//! ```text
//! cmd.NAME(arg, arg ...)
//! ```
//!
//! `NAME` 由字母和下划线组成；参数是逗号或空格分隔的标识符列表，只识别
//! `record`、`context`、`key`、`uploader` 四个隐式参数。
//!
//! 命令本身由调用方通过 [`CommandContext`] 提供，运行时只负责按名字查找并调用，
//! 找不到命令是硬错误。

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::content::ContentManager;
use crate::error::{BoxError, ChatResult, RuntimeError};
use crate::state::Record;

fn command_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^cmd\.([a-zA-Z_]+)\(([a-z, ]*)\)$").expect("command regex must compile")
    })
}

fn separator_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[, ]+").expect("separator regex must compile"))
}

/// 隐式参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitArg {
    /// 收集记录
    Record,
    /// 命令表
    Context,
    /// 当前步骤的收集键
    Key,
    /// 发起文件上传并等待用户响应
    Uploader,
}

impl ImplicitArg {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "record" => Some(Self::Record),
            "context" => Some(Self::Context),
            "key" => Some(Self::Key),
            "uploader" => Some(Self::Uploader),
            _ => None,
        }
    }
}

/// 解析后的命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub name: String,
    pub args: Vec<ImplicitArg>,
}

impl CommandLine {
    /// 解析一行文本，不是命令时返回 `None`
    ///
    /// 不认识的参数名会被忽略。
    pub fn parse(line: &str) -> Option<Self> {
        let caps = command_regex().captures(line)?;
        let name = caps[1].to_string();
        let args = separator_regex()
            .split(&caps[2])
            .filter(|token| !token.is_empty())
            .filter_map(|token| {
                let arg = ImplicitArg::from_token(token);
                if arg.is_none() {
                    warn!(command = %name, arg = %token, "忽略未知的命令参数");
                }
                arg
            })
            .collect();
        Some(Self { name, args })
    }
}

/// 传给命令的实参
#[derive(Clone)]
pub enum CommandArg {
    Record(Record),
    Context(Arc<dyn CommandContext>),
    Key(Option<String>),
    Upload(Value),
}

impl std::fmt::Debug for CommandArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Self::Context(_) => f.write_str("Context(..)"),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::Upload(value) => f.debug_tuple("Upload").field(value).finish(),
        }
    }
}

impl CommandArg {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&Arc<dyn CommandContext>> {
        match self {
            Self::Context(context) => Some(context),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => key.as_deref(),
            _ => None,
        }
    }

    pub fn as_upload(&self) -> Option<&Value> {
        match self {
            Self::Upload(value) => Some(value),
            _ => None,
        }
    }
}

/// 命令执行结果
pub type CommandFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// 命令
///
/// 同步命令也以已完成的 future 形式返回。
pub type CommandFn = Arc<dyn Fn(Vec<CommandArg>) -> CommandFuture + Send + Sync>;

/// 命令表能力
pub trait CommandContext: Send + Sync {
    /// 按名字查找命令
    fn resolve(&self, name: &str) -> Option<CommandFn>;
}

/// 基于 HashMap 的命令表
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, CommandFn>,
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CommandTable").field("commands", &names).finish()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册同步命令
    pub fn register<F>(&mut self, name: impl Into<String>, command: F) -> &mut Self
    where
        F: Fn(Vec<CommandArg>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let handler: CommandFn =
            Arc::new(move |args: Vec<CommandArg>| futures::future::ready(command(args)).boxed());
        self.commands.insert(name.into(), handler);
        self
    }

    /// 注册异步命令
    pub fn register_async<F, Fut>(&mut self, name: impl Into<String>, command: F) -> &mut Self
    where
        F: Fn(Vec<CommandArg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let handler: CommandFn = Arc::new(move |args: Vec<CommandArg>| command(args).boxed());
        self.commands.insert(name.into(), handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandContext for CommandTable {
    fn resolve(&self, name: &str) -> Option<CommandFn> {
        self.commands.get(name).cloned()
    }
}

/// 命令调用器
///
/// 把解析后的命令行绑定到本次运行的 Record、命令表和内容管理器上。
pub struct CommandInvoker<'a> {
    pub context: &'a Arc<dyn CommandContext>,
    pub record: &'a Record,
    pub content: &'a ContentManager,
}

impl CommandInvoker<'_> {
    /// 调用命令并等待结果
    ///
    /// `key` 是当前步骤的收集键，用于 `key` 参数。
    pub async fn invoke(&self, line: &CommandLine, key: Option<&str>) -> ChatResult<Value> {
        let command = self
            .context
            .resolve(&line.name)
            .ok_or_else(|| RuntimeError::CommandNotFound {
                name: line.name.clone(),
            })?;

        let mut args = Vec::with_capacity(line.args.len());
        for arg in &line.args {
            let value = match arg {
                ImplicitArg::Record => CommandArg::Record(self.record.clone()),
                ImplicitArg::Context => CommandArg::Context(Arc::clone(self.context)),
                ImplicitArg::Key => CommandArg::Key(key.map(str::to_string)),
                ImplicitArg::Uploader => {
                    self.content.add_uploader(None, None);
                    CommandArg::Upload(self.content.wait_for_input(true).await?)
                }
            };
            args.push(value);
        }

        debug!(command = %line.name, args = ?line.args, "调用命令");
        let result = command(args).await.map_err(|source| RuntimeError::CommandFailed {
            name: line.name.clone(),
            source,
        })?;
        Ok(result)
    }
}
