//! # Script 模块
//!
//! 脚本结构定义与加载。
//!
//! ## 模块结构
//!
//! - [`ast`]：线程、步骤等结构定义
//! - [`index`]：按 topic 索引的线程表

pub mod ast;
pub mod index;

pub use ast::*;
pub use index::ThreadIndex;

use crate::error::ScriptError;

impl ScriptDocument {
    /// 从 JSON 文本解析单个文档
    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// 从 JSON 文本解析文档数组
///
/// 也接受单个文档对象，视为只有一个元素的数组。
pub fn load_documents(text: &str) -> Result<Vec<ScriptDocument>, ScriptError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}
