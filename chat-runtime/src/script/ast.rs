//! # AST 模块
//!
//! 定义对话脚本的结构。
//!
//! ## 设计说明
//!
//! 脚本是线程（Thread）的有序列表，每个线程是步骤（Step）的有序列表。
//! 结构直接对应脚本文档的 JSON 形状，加载后只读。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 入口线程名
pub const DEFAULT_TOPIC: &str = "default";

/// 脚本文档
///
/// 脚本来源提供的是文档数组，运行时按索引选择其中一个。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptDocument {
    /// 线程列表
    #[serde(default)]
    pub script: Vec<Thread>,
}

/// 线程
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thread {
    /// 线程名，脚本内唯一
    pub topic: String,
    /// 步骤列表
    #[serde(default)]
    pub script: Vec<Step>,
}

/// 步骤
///
/// 所有字段都是可选的。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    /// 文本行：普通消息或 `cmd.NAME(args)` 命令调用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,

    /// 快捷回复
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<QuickReply>>,

    /// 收集请求
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect: Option<Collect>,

    /// 控制流目标
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// 附加信息，交给 meta 回调
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// 快捷回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    /// 显示文本
    pub title: String,
    /// 选中后作为输入值
    pub payload: String,
}

/// 收集请求
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Collect {
    /// 写入 Record 的键
    #[serde(default)]
    pub key: Option<String>,
    /// 是否允许多行输入
    #[serde(default)]
    pub multiple: bool,
    /// 分支选项，按声明顺序匹配
    #[serde(default)]
    pub options: Vec<CollectOption>,
}

/// 匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// 完全相等
    String,
    /// 正则匹配
    Regex,
    /// 未识别的类型，从不匹配
    #[serde(other)]
    Other,
}

/// 分支选项
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectOption {
    /// 没有任何选项匹配时的兜底选项
    #[serde(default)]
    pub default: bool,
    /// 匹配方式
    #[serde(default, rename = "type")]
    pub kind: Option<MatchKind>,
    /// 匹配模式
    #[serde(default)]
    pub pattern: Option<String>,
    /// 匹配后执行的动作
    #[serde(default)]
    pub action: String,
}

/// 附加信息条目
///
/// 键为 `on:<value>` 的条目在用户选择 `<value>` 时触发事件回调。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// 步骤附加信息
pub type Meta = Vec<MetaEntry>;

/// 控制流动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// 结束当前线程，继续运行
    Next,
    /// 结束整次运行
    Complete,
    /// 转到另一个线程
    Thread(&'a str),
}

impl<'a> Action<'a> {
    /// 解析动作名，`next` 与 `complete` 是保留字
    pub fn parse(action: &'a str) -> Self {
        match action {
            "next" => Self::Next,
            "complete" => Self::Complete,
            topic => Self::Thread(topic),
        }
    }

    /// 是否是保留动作
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Thread(_))
    }
}

impl Step {
    /// 步骤是否带有控制流动作（空字符串不算）
    pub fn flow_action(&self) -> Option<&str> {
        self.action.as_deref().filter(|a| !a.is_empty())
    }

    /// 收集键（空字符串不算）
    pub fn collect_key(&self) -> Option<&str> {
        self.collect
            .as_ref()
            .and_then(|c| c.key.as_deref())
            .filter(|k| !k.is_empty())
    }
}

impl Thread {
    /// 创建线程
    pub fn new(topic: impl Into<String>, script: Vec<Step>) -> Self {
        Self {
            topic: topic.into(),
            script,
        }
    }
}

impl CollectOption {
    /// 字符串匹配选项
    pub fn string(pattern: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            default: false,
            kind: Some(MatchKind::String),
            pattern: Some(pattern.into()),
            action: action.into(),
        }
    }

    /// 正则匹配选项
    pub fn regex(pattern: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            default: false,
            kind: Some(MatchKind::Regex),
            pattern: Some(pattern.into()),
            action: action.into(),
        }
    }

    /// 兜底选项
    pub fn fallback(action: impl Into<String>) -> Self {
        Self {
            default: true,
            kind: None,
            pattern: None,
            action: action.into(),
        }
    }
}
