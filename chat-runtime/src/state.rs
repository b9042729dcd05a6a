//! # State 模块
//!
//! 定义一次运行期间的共享状态：收集记录（Record）与输入框状态（InputState）。
//!
//! ## 设计原则
//!
//! - Record 在整次运行中共享，模板替换与命令调用都能看到
//! - 新的运行会丢弃旧的 Record，而不是重置它
//! - 锁只在同步代码中短暂持有，不跨越 `.await`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 把收集到的值转换为文本
///
/// 字符串原样返回，其余值使用 JSON 表示。
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 收集记录
///
/// `collect.key` 到最近一次收集值的映射。克隆得到的是同一份记录的句柄，
/// 命令通过 `record` 参数拿到的也是这个句柄，可以直接读写。
#[derive(Debug, Clone, Default)]
pub struct Record {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl Record {
    /// 创建空记录
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有的键值创建记录
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(values)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 读取值
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// 读取值的文本形式，`null` 视为不存在
    pub fn text(&self, key: &str) -> Option<String> {
        match self.lock().get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value_text(value)),
        }
    }

    /// 写入值
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().insert(key.into(), value.into());
    }

    /// 是否包含指定键
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// 当前记录的快照
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// 输入框状态
///
/// 由 Host 读取并渲染。`enabled` 只会在队列中所有先前的消息送达后才被打开。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// 是否接受输入
    pub enabled: bool,
    /// 多行输入模式
    pub text_area: bool,
    /// 输入类型（text / number / ...）
    pub kind: String,
    pub required: Option<bool>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// 输入建议
    pub suggestions: Option<Vec<String>>,
    /// 占位文本
    pub placeholder: String,
    /// 快速滚动（回放时使用）
    pub fast_scroll: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            enabled: false,
            text_area: false,
            kind: "text".to_string(),
            required: None,
            min: None,
            max: None,
            step: None,
            suggestions: None,
            placeholder: String::new(),
            fast_scroll: false,
        }
    }
}

impl InputState {
    /// 用户提交一条消息后，清除本次提问相关的设置
    pub fn reset_prompt(&mut self) {
        self.text_area = false;
        self.placeholder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_shared_handle() {
        let record = Record::new();
        let handle = record.clone();

        handle.set("name", "Alice");
        assert_eq!(record.get("name"), Some(json!("Alice")));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_record_text() {
        let record = Record::new();
        record.set("count", 3);
        record.set("empty", Value::Null);

        assert_eq!(record.text("count"), Some("3".to_string()));
        assert_eq!(record.text("empty"), None);
        assert_eq!(record.text("missing"), None);
        assert!(record.contains("empty"));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("hi")), "hi");
        assert_eq!(value_text(&json!(true)), "true");
        assert_eq!(value_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_input_state_reset_prompt() {
        let mut state = InputState {
            text_area: true,
            placeholder: "Your name".to_string(),
            ..InputState::default()
        };
        state.reset_prompt();
        assert!(!state.text_area);
        assert!(state.placeholder.is_empty());
        assert_eq!(state.kind, "text");
    }
}
