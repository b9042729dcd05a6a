//! # Config 模块
//!
//! 命令行宿主的配置。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (chat.json)
//! 3. 默认值（最低）

use chat_runtime::ContentConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// 宿主配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// 内容管理器配置（延迟、按钮文本等）
    #[serde(default)]
    pub content: ContentConfig,

    /// 默认运行的文档索引
    #[serde(default)]
    pub document_index: usize,

    /// 运行结束后打印收集到的 Record
    #[serde(default)]
    pub dump_record: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            content: ContentConfig::default(),
            document_index: 0,
            dump_record: false,
        }
    }
}

impl HostConfig {
    /// 加载配置文件
    ///
    /// 文件不存在或无法解析时返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 应用命令行覆盖
    pub fn apply_overrides(&mut self, index: Option<usize>, delay_ms: Option<u64>, dump: bool) {
        if let Some(index) = index {
            self.document_index = index;
        }
        if let Some(delay_ms) = delay_ms {
            self.content.timeout_ms = delay_ms;
        }
        self.dump_record |= dump;
    }
}
