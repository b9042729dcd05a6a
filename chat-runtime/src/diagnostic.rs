//! # 诊断模块
//!
//! 脚本静态检查，不依赖运行时与命令表。
//!
//! ## 设计原则
//!
//! - 纯函数 API，只读取脚本结构
//! - 诊断分级：Error（运行必然失败）、Warn（大概率是脚本错误）、Info（信息提示）
//! - 运行时对未知动作目标静默按 `next` 处理，这里把它们报告出来

use std::collections::{HashMap, HashSet, VecDeque};

use crate::script::index::compile_pattern;
use crate::script::{Action, DEFAULT_TOPIC, MatchKind, ScriptDocument, Step};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// 所在线程
    pub topic: Option<String>,
    /// 步骤序号（从 1 开始）
    pub step: Option<usize>,
    pub message: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            topic: None,
            step: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, message)
    }

    /// 定位到线程中的步骤
    pub fn at(mut self, topic: impl Into<String>, step: Option<usize>) -> Self {
        self.topic = Some(topic.into());
        self.step = step;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.level)?;
        if let Some(topic) = &self.topic {
            write!(f, " {}", topic)?;
            if let Some(step) = self.step {
                write!(f, "#{}", step)?;
            }
        }
        write!(f, ": {}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  | {}", detail)?;
        }
        Ok(())
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.count(DiagnosticLevel::Error)
    }

    pub fn warn_count(&self) -> usize {
        self.count(DiagnosticLevel::Warn)
    }

    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 按最低级别过滤
    pub fn filter_by_level(&self, min_level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level >= min_level)
            .collect()
    }
}

//=============================================================================
// 脚本分析 API
//=============================================================================

/// 步骤中引用的动作
struct ActionRef<'a> {
    step: usize,
    action: &'a str,
}

/// 分析脚本，返回诊断结果
///
/// 执行以下检查：
/// - 缺少入口线程、重复的线程名
/// - 不是保留字也不是已知线程的动作目标
/// - 无法编译的正则模式
/// - 既没有模式也不是默认项的选项
/// - 从入口线程不可达的线程
pub fn analyze_script(document: &ScriptDocument) -> DiagnosticResult {
    let mut result = DiagnosticResult::new();

    let mut topics: HashSet<&str> = HashSet::new();
    for thread in &document.script {
        if !topics.insert(thread.topic.as_str()) {
            result.push(
                Diagnostic::error(format!("重复的线程名: **{}**", thread.topic))
                    .at(&thread.topic, None),
            );
        }
    }
    if !topics.contains(DEFAULT_TOPIC) {
        result.push(Diagnostic::error("缺少入口线程 'default'"));
    }

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for thread in &document.script {
        let topic = thread.topic.as_str();
        for (index, step) in thread.script.iter().enumerate() {
            check_options(step, topic, index + 1, &mut result);
        }

        for target in collect_actions(&thread.script) {
            match Action::parse(target.action) {
                Action::Thread(name) if topics.contains(name) => {
                    edges.entry(topic).or_default().push(name);
                }
                Action::Thread(name) => {
                    result.push(
                        Diagnostic::warn(format!("未知的动作目标: **{}**", name))
                            .at(topic, Some(target.step))
                            .with_detail("运行时按 next 处理"),
                    );
                }
                Action::Next | Action::Complete => {}
            }
        }
    }

    if topics.contains(DEFAULT_TOPIC) {
        let reachable = reachable_from(DEFAULT_TOPIC, &edges);
        for thread in &document.script {
            if !reachable.contains(thread.topic.as_str()) {
                result.push(
                    Diagnostic::info(format!("线程从入口不可达: **{}**", thread.topic))
                        .at(&thread.topic, None),
                );
            }
        }
    }

    result
}

fn check_options(step: &Step, topic: &str, index: usize, result: &mut DiagnosticResult) {
    let Some(collect) = &step.collect else {
        return;
    };
    for option in &collect.options {
        match (&option.pattern, option.kind) {
            (Some(pattern), Some(MatchKind::Regex)) => {
                if let Err(e) = compile_pattern(pattern) {
                    result.push(
                        Diagnostic::error(format!("无效的正则模式: {}", pattern))
                            .at(topic, Some(index))
                            .with_detail(e.to_string()),
                    );
                }
            }
            (Some(_), Some(MatchKind::Other)) if !option.default => {
                result.push(
                    Diagnostic::warn("选项的匹配类型不受支持，永远不会匹配")
                        .at(topic, Some(index)),
                );
            }
            (None, _) if !option.default => {
                result.push(
                    Diagnostic::warn(format!("选项没有匹配模式: -> {}", option.action))
                        .at(topic, Some(index)),
                );
            }
            _ => {}
        }
    }
}

/// 收集步骤与选项中的所有动作
fn collect_actions(steps: &[Step]) -> Vec<ActionRef<'_>> {
    let mut actions = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let step_no = index + 1;
        if let Some(action) = step.flow_action() {
            actions.push(ActionRef {
                step: step_no,
                action,
            });
        }
        if let Some(collect) = &step.collect {
            actions.extend(
                collect
                    .options
                    .iter()
                    .filter(|option| !option.action.is_empty())
                    .map(|option| ActionRef {
                        step: step_no,
                        action: option.action.as_str(),
                    }),
            );
        }
    }
    actions
}

fn reachable_from<'a>(start: &'a str, edges: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(topic) = queue.pop_front() {
        for &next in edges.get(topic).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}
