//! # Config 模块
//!
//! 内容管理器的配置项。所有字段都可以随时修改，对之后的操作立即生效。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 内容管理器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// 每条消息送达前的模拟输入延迟（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 发送按钮文本
    #[serde(default = "default_send_button_text")]
    pub send_button_text: String,

    /// 输入框初始占位文本
    #[serde(default = "default_input_placeholder")]
    pub input_placeholder: String,

    /// 上传按钮文本
    #[serde(default = "default_upload_file_text")]
    pub upload_file_text: String,

    /// 上传成功提示
    #[serde(default = "default_uploaded_file_text")]
    pub uploaded_file_text: String,

    /// 上传失败提示
    #[serde(default = "default_not_uploaded_file_text")]
    pub not_uploaded_file_text: String,

    /// 修改按钮文本
    #[serde(default = "default_fixme_message")]
    pub fixme_message: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            send_button_text: default_send_button_text(),
            input_placeholder: default_input_placeholder(),
            upload_file_text: default_upload_file_text(),
            uploaded_file_text: default_uploaded_file_text(),
            not_uploaded_file_text: default_not_uploaded_file_text(),
            fixme_message: default_fixme_message(),
        }
    }
}

impl ContentConfig {
    /// 每条消息的延迟
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// "已更新"通知的延迟：基础延迟的十分之一
    pub fn update_delay(&self) -> Duration {
        self.delay() / 10
    }
}

// 默认值函数
fn default_timeout_ms() -> u64 {
    1000
}

fn default_send_button_text() -> String {
    "Send".to_string()
}

fn default_input_placeholder() -> String {
    "Type something...".to_string()
}

fn default_upload_file_text() -> String {
    "Upload File...".to_string()
}

fn default_uploaded_file_text() -> String {
    "Uploaded Successfully".to_string()
}

fn default_not_uploaded_file_text() -> String {
    "Failed to upload file".to_string()
}

fn default_fixme_message() -> String {
    "Fix".to_string()
}
