//! # Engine 模块
//!
//! 对话解释器的入口与线程/动作调度。
//!
//! ## 执行模型
//!
//! ```text
//! run(documents, options)
//!   └─ run_thread("default")
//!        ├─ execute_step(step) ...      每个步骤返回是否结束整次运行
//!        └─ execute_action(saved)       线程中第一个带 action 的步骤被延后执行
//! ```
//!
//! 所有调用都基于一个显式的 [`RunContext`]，一次运行一个上下文，
//! 多个对话可以互不干扰地同时运行。

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::{CommandContext, CommandInvoker, CommandTable};
use crate::content::ContentManager;
use crate::error::{ChatResult, ScriptError};
use crate::script::{Action, DEFAULT_TOPIC, Meta, ScriptDocument, ThreadIndex};
use crate::state::Record;

/// 收集回调 `(key, value)`
pub type CollectCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;
/// 附加信息回调
pub type MetaCallback = Arc<dyn Fn(&Meta) + Send + Sync>;
/// 事件回调
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Host 注册的回调，全部可选
#[derive(Clone, Default)]
pub struct Callbacks {
    pub collect: Option<CollectCallback>,
    pub meta: Option<MetaCallback>,
    pub event: Option<EventCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("collect", &self.collect.is_some())
            .field("meta", &self.meta.is_some())
            .field("event", &self.event.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn with_collect(mut self, f: impl Fn(&str, &Value) + Send + Sync + 'static) -> Self {
        self.collect = Some(Arc::new(f));
        self
    }

    pub fn with_meta(mut self, f: impl Fn(&Meta) + Send + Sync + 'static) -> Self {
        self.meta = Some(Arc::new(f));
        self
    }

    pub fn with_event(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.event = Some(Arc::new(f));
        self
    }
}

/// 运行参数
#[derive(Clone)]
pub struct RunOptions {
    /// 文档索引
    pub index: usize,
    /// 命令表
    pub context: Arc<dyn CommandContext>,
    /// 初始记录，缺省为空记录
    pub record: Option<Record>,
    pub callbacks: Callbacks,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            index: 0,
            context: Arc::new(CommandTable::new()),
            record: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl RunOptions {
    pub fn with_context(mut self, context: impl CommandContext + 'static) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

/// 脚本运行器
///
/// 每次 `run` 都清空内容管理器并创建新的 [`RunContext`]。
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    content: ContentManager,
}

impl ScriptRunner {
    pub fn new(content: ContentManager) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &ContentManager {
        &self.content
    }

    /// 运行脚本
    ///
    /// 返回 `true` 表示脚本以 `complete` 结束。
    pub async fn run(&self, documents: &[ScriptDocument], options: RunOptions) -> ChatResult<bool> {
        let threads = ThreadIndex::from_documents(documents, options.index)?;
        self.content.clear();

        let ctx = RunContext::new(
            threads,
            options.record.unwrap_or_default(),
            options.context,
            options.callbacks,
            self.content.clone(),
        );

        info!(index = options.index, threads = ctx.threads.len(), "开始运行脚本");
        let finished = ctx.run().await?;
        info!(finished, "脚本运行结束");
        Ok(finished)
    }
}

/// 单次运行的上下文
pub struct RunContext {
    pub(crate) threads: ThreadIndex,
    pub(crate) record: Record,
    pub(crate) context: Arc<dyn CommandContext>,
    pub(crate) callbacks: Callbacks,
    pub(crate) content: ContentManager,
}

impl RunContext {
    pub fn new(
        threads: ThreadIndex,
        record: Record,
        context: Arc<dyn CommandContext>,
        callbacks: Callbacks,
        content: ContentManager,
    ) -> Self {
        Self {
            threads,
            record,
            context,
            callbacks,
            content,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn content(&self) -> &ContentManager {
        &self.content
    }

    pub(crate) fn invoker(&self) -> CommandInvoker<'_> {
        CommandInvoker {
            context: &self.context,
            record: &self.record,
            content: &self.content,
        }
    }

    /// 从入口线程开始运行
    pub async fn run(&self) -> ChatResult<bool> {
        self.run_thread(DEFAULT_TOPIC).await
    }

    /// 执行一个线程，返回是否结束整次运行
    pub fn run_thread<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, ChatResult<bool>> {
        Box::pin(async move {
            let thread = self
                .threads
                .get(topic)
                .ok_or_else(|| ScriptError::ThreadNotFound {
                    topic: topic.to_string(),
                })?;
            debug!(topic = %topic, "> 进入线程");

            let mut saved_action: Option<&str> = None;
            let mut finished = false;
            for step in &thread.script {
                match step.flow_action() {
                    Some(action) if saved_action.is_none() => saved_action = Some(action),
                    _ => {
                        if self.execute_step(step).await? {
                            finished = true;
                            break;
                        }
                    }
                }
            }

            if !finished {
                if let Some(action) = saved_action {
                    finished = self.execute_action(action).await?;
                }
            }

            debug!(topic = %topic, finished, "< 离开线程");
            Ok(finished)
        })
    }

    /// 执行动作，返回是否结束整次运行
    ///
    /// 未知的线程名视为 `next`。
    pub fn execute_action<'a>(&'a self, action: &'a str) -> BoxFuture<'a, ChatResult<bool>> {
        Box::pin(async move {
            match Action::parse(action) {
                Action::Next => Ok(false),
                Action::Complete => Ok(true),
                Action::Thread(topic) if self.threads.contains(topic) => {
                    self.run_thread(topic).await
                }
                Action::Thread(topic) => {
                    warn!(action = %topic, "动作目标不是已知线程，按 next 处理");
                    Ok(false)
                }
            }
        })
    }
}
