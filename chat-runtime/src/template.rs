//! # Template 模块
//!
//! 文本行中 `{{name}}` 占位符的替换。
//!
//! 替换是全量的：Record 中存在的键替换为对应的值，不存在的键替换为键名本身，
//! 结果中不会残留 `{{name}}`。

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::state::Record;

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder regex must compile")
    })
}

/// 用 Record 填充文本中的占位符
pub fn fill_in(text: &str, record: &Record) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            record.text(name).unwrap_or_else(|| name.to_string())
        })
        .into_owned()
}
