//! # Error 模块
//!
//! 定义 chat-runtime 中使用的错误类型。

use thiserror::Error;

/// 外部命令返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 脚本错误
///
/// 脚本文档格式不正确时产生，直接向 `run` 的调用方传播。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// 文档解码失败
    #[error("脚本文档解码失败: {message}")]
    Decode { message: String },

    /// 文档索引越界
    #[error("脚本索引 {index} 越界，共有 {count} 个文档")]
    IndexOutOfRange { index: usize, count: usize },

    /// 缺少入口线程
    #[error("缺少入口线程 'default'")]
    MissingDefaultThread,

    /// 线程重复定义
    #[error("线程 '{topic}' 重复定义")]
    DuplicateTopic { topic: String },

    /// 线程未找到
    #[error("线程 '{topic}' 未找到")]
    ThreadNotFound { topic: String },

    /// 无效的正则表达式
    #[error("无效的正则表达式 '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl From<serde_json::Error> for ScriptError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// 运行时错误
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// 命令表中没有此命令
    #[error("命令 '{name}' 未注册")]
    CommandNotFound { name: String },

    /// 命令执行失败
    #[error("命令 '{name}' 执行失败: {source}")]
    CommandFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// 已经有一个等待中的输入请求
    #[error("已有等待中的输入请求")]
    InputAlreadyPending,

    /// 等待中的请求在完成前被丢弃（内容被清空）
    #[error("等待中的请求已被中断")]
    Interrupted,
}

/// chat-runtime 统一错误类型
#[derive(Error, Debug)]
pub enum ChatError {
    /// 脚本错误
    #[error("脚本错误: {0}")]
    Script(#[from] ScriptError),

    /// 运行时错误
    #[error("运行时错误: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result 类型别名
pub type ChatResult<T> = Result<T, ChatError>;
