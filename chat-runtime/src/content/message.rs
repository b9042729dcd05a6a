//! # Message 模块
//!
//! 渲染列表中的消息记录。
//!
//! 消息由分发队列创建，"typing" 占位消息会被最终内容原地替换，之后不再修改。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// 正在输入占位
    Typing,
    /// 发给用户的消息
    To,
    /// 用户发出的消息
    From,
    /// 选项列表
    Options,
    /// 文件上传
    Uploader,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Typing => write!(f, "typing"),
            Self::To => write!(f, "to"),
            Self::From => write!(f, "from"),
            Self::Options => write!(f, "options"),
            Self::Uploader => write!(f, "uploader"),
        }
    }
}

/// 选项列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    /// 显示文本
    pub display: String,
    /// 选中后提交的值
    pub value: Value,
}

impl OptionItem {
    pub fn new(display: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            display: display.into(),
            value: value.into(),
        }
    }
}

/// 消息内容
///
/// `From` 与 `Options` 的 `fixme` 是修改按钮的文本，只在入队时设置了修改回调才出现，
/// 按下后由 [`ContentManager::fixme_at`](super::ContentManager::fixme_at) 调用回调。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "lowercase")]
pub enum Payload {
    Typing,
    To {
        message: String,
    },
    From {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixme: Option<String>,
    },
    Options {
        options: Vec<OptionItem>,
        selected: Option<Value>,
        multi: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixme: Option<String>,
    },
    Uploader {
        options: Option<Value>,
    },
}

impl Payload {
    /// 消息类型
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Typing => MessageKind::Typing,
            Self::To { .. } => MessageKind::To,
            Self::From { .. } => MessageKind::From,
            Self::Options { .. } => MessageKind::Options,
            Self::Uploader { .. } => MessageKind::Uploader,
        }
    }

    /// 文本消息的内容
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::To { message } | Self::From { message, .. } => Some(message),
            _ => None,
        }
    }

    /// 修改按钮文本
    pub fn fixme(&self) -> Option<&str> {
        match self {
            Self::From { fixme, .. } | Self::Options { fixme, .. } => fixme.as_deref(),
            _ => None,
        }
    }
}

/// 已渲染的消息
///
/// `first` 标记这条消息是否开始了一段同类型消息，仅用于展示分组，
/// 与紧邻的前一条消息比较得出。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(flatten)]
    pub payload: Payload,
    pub first: bool,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// 是否是 typing 占位
    pub fn is_typing(&self) -> bool {
        self.kind() == MessageKind::Typing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_kind_and_text() {
        let payload = Payload::To {
            message: "Hi".to_string(),
        };
        assert_eq!(payload.kind(), MessageKind::To);
        assert_eq!(payload.text(), Some("Hi"));
        assert_eq!(Payload::Typing.text(), None);
        assert_eq!(MessageKind::Uploader.to_string(), "uploader");
    }

    #[test]
    fn test_message_serialization_shape() {
        let message = Message {
            payload: Payload::Options {
                options: vec![OptionItem::new("Yes", "yes")],
                selected: None,
                multi: false,
                fixme: None,
            },
            first: true,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "kind": "options",
                "params": {
                    "options": [{"display": "Yes", "value": "yes"}],
                    "selected": null,
                    "multi": false
                },
                "first": true
            })
        );

        let typing = Message {
            payload: Payload::Typing,
            first: false,
        };
        assert_eq!(
            serde_json::to_value(&typing).unwrap(),
            json!({"kind": "typing", "first": false})
        );
    }

    #[test]
    fn test_from_fixme_serialized_only_when_set() {
        let plain = Payload::From {
            message: "Ada".to_string(),
            fixme: None,
        };
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            json!({"kind": "from", "params": {"message": "Ada"}})
        );

        let fixable = Payload::From {
            message: "Ada".to_string(),
            fixme: Some("Fix".to_string()),
        };
        assert_eq!(fixable.fixme(), Some("Fix"));
        let value = serde_json::to_value(&fixable).unwrap();
        assert_eq!(value["params"]["fixme"], json!("Fix"));
        assert_eq!(serde_json::from_value::<Payload>(value).unwrap(), fixable);
    }
}
