//! # Index 模块
//!
//! 把脚本文档加载为按 `topic` 索引的线程表，并预编译正则选项。
//!
//! 加载时检查：
//! - 存在入口线程 `default`
//! - `topic` 不重复
//!
//! 无法编译的正则不会阻止加载，只在选项真正被求值时报错；
//! `analyze_script` 会提前把它们报告出来。

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

use crate::error::ScriptError;
use crate::script::ast::{DEFAULT_TOPIC, MatchKind, ScriptDocument, Thread};

/// 线程表
///
/// 克隆共享同一份正则缓存。
#[derive(Debug, Clone)]
pub struct ThreadIndex {
    threads: HashMap<String, Thread>,
    patterns: Arc<Mutex<HashMap<String, Regex>>>,
}

impl ThreadIndex {
    /// 从单个文档构建
    pub fn from_document(document: &ScriptDocument) -> Result<Self, ScriptError> {
        Self::from_threads(document.script.iter().cloned())
    }

    /// 从文档数组中按索引选择并构建
    pub fn from_documents(documents: &[ScriptDocument], index: usize) -> Result<Self, ScriptError> {
        let document = documents.get(index).ok_or(ScriptError::IndexOutOfRange {
            index,
            count: documents.len(),
        })?;
        Self::from_document(document)
    }

    /// 从线程列表构建
    pub fn from_threads(threads: impl IntoIterator<Item = Thread>) -> Result<Self, ScriptError> {
        let mut index = Self {
            threads: HashMap::new(),
            patterns: Arc::default(),
        };

        for thread in threads {
            index.compile_patterns(&thread);
            if index.threads.contains_key(&thread.topic) {
                return Err(ScriptError::DuplicateTopic {
                    topic: thread.topic,
                });
            }
            index.threads.insert(thread.topic.clone(), thread);
        }

        if !index.threads.contains_key(DEFAULT_TOPIC) {
            return Err(ScriptError::MissingDefaultThread);
        }

        Ok(index)
    }

    fn compile_patterns(&self, thread: &Thread) {
        let regex_patterns = thread
            .script
            .iter()
            .filter_map(|step| step.collect.as_ref())
            .flat_map(|collect| collect.options.iter())
            .filter(|option| option.kind == Some(MatchKind::Regex))
            .filter_map(|option| option.pattern.as_deref());

        let mut patterns = self.lock_patterns();
        for pattern in regex_patterns {
            if patterns.contains_key(pattern) {
                continue;
            }
            match compile_pattern(pattern) {
                Ok(regex) => {
                    patterns.insert(pattern.to_string(), regex);
                }
                Err(e) => warn!(topic = %thread.topic, error = %e, "正则无法编译，求值时报错"),
            }
        }
    }

    fn lock_patterns(&self) -> MutexGuard<'_, HashMap<String, Regex>> {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 查找线程
    pub fn get(&self, topic: &str) -> Option<&Thread> {
        self.threads.get(topic)
    }

    /// 是否存在线程
    pub fn contains(&self, topic: &str) -> bool {
        self.threads.contains_key(topic)
    }

    /// 所有线程名
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.threads.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// 取得编译后的正则，缓存中没有时现场编译
    pub fn pattern(&self, pattern: &str) -> Result<Regex, ScriptError> {
        if let Some(regex) = self.lock_patterns().get(pattern) {
            return Ok(regex.clone());
        }
        let regex = compile_pattern(pattern)?;
        self.lock_patterns().insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

/// 编译正则模式
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ScriptError> {
    Regex::new(pattern).map_err(|e| ScriptError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
