//! # Content 模块
//!
//! 消息分发队列与渲染列表。
//!
//! ## 执行模型
//!
//! ```text
//! queue(payload) ──► [QueueItem FIFO] ──► pump task ──► messages: Vec<Message>
//!                                              │
//!                                              └──► updates (broadcast)
//! ```
//!
//! - 队列严格先进先出，任意时刻最多只有一个条目在处理中
//! - 消息条目：先追加 typing 占位，等待 `timeout` 后原地替换为真实内容，
//!   调用完成钩子，延迟 `timeout / 10` 发出"已更新"通知
//! - 函数条目：立即调用，结果交给等待方，不产生占位也没有延迟
//!
//! ## 修改与校验
//!
//! 宿主可以为当前提问设置修改回调（fixme）与输入校验器（validator）。
//! 设置修改回调后，之后入队的用户消息与选项列表都带有修改按钮；
//! 用户提交一条消息后两者都被清除。
//!
//! 队列由一个 tokio 任务驱动，因此入队必须在 tokio 运行时内调用。

pub mod config;
pub mod message;

pub use config::ContentConfig;
pub use message::{Message, MessageKind, OptionItem, Payload};

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace};

use crate::error::{ChatResult, RuntimeError};
use crate::input::InputSynchronizer;
use crate::state::InputState;

/// 消息送达后调用的钩子
pub type DeliveryHook = Box<dyn FnOnce() + Send>;

/// 修改回调，用户每次按下修改按钮都会调用
pub type FixmeHook = Arc<dyn Fn() + Send + Sync>;

/// 输入校验器，返回输入是否可以提交
pub type InputValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

type QueuedCall = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 队列条目
enum QueueItem {
    /// 消息送达请求
    Deliver {
        payload: Payload,
        hook: Option<DeliveryHook>,
        fixme: Option<FixmeHook>,
    },
    /// 函数调用请求
    Call(QueuedCall),
}

/// 正在处理的条目
enum InFlight {
    Deliver {
        payload: Payload,
        hook: Option<DeliveryHook>,
        fixme: Option<FixmeHook>,
        placeholder: usize,
    },
    Call(QueuedCall),
}

/// 更新通知通道容量
const UPDATE_CHANNEL_CAPACITY: usize = 256;

struct ContentState {
    messages: Vec<Message>,
    queue: VecDeque<QueueItem>,
    /// 队列任务是否在运行
    pumping: bool,
    /// 每次 `clear` 递增，旧任务据此退出
    generation: u64,
    input: InputState,
    config: ContentConfig,
    /// 当前提问的修改回调
    fixme: Option<FixmeHook>,
    /// 当前提问的输入校验器
    validator: Option<InputValidator>,
    /// 消息索引 → 该消息的修改回调
    fixmes: HashMap<usize, FixmeHook>,
}

impl ContentState {
    fn add(&mut self, payload: Payload) -> Message {
        let kind = payload.kind();
        let first = self.messages.last().is_none_or(|last| last.kind() != kind);
        let message = Message { payload, first };
        self.messages.push(message.clone());
        message
    }

    fn replace_at(&mut self, index: usize, payload: Payload) -> Message {
        if index >= self.messages.len() {
            return self.add(payload);
        }
        let kind = payload.kind();
        let first = index == 0 || self.messages[index - 1].kind() != kind;
        let message = Message { payload, first };
        self.messages[index] = message.clone();
        message
    }

    /// 修改按钮文本与回调，没有设置修改回调时都为 `None`
    fn current_fixme(&self) -> (Option<String>, Option<FixmeHook>) {
        match &self.fixme {
            Some(fixme) => (
                Some(self.config.fixme_message.clone()),
                Some(Arc::clone(fixme)),
            ),
            None => (None, None),
        }
    }

    /// 用户提交一条消息后，清除本次提问相关的设置
    fn reset_prompt(&mut self) {
        self.input.reset_prompt();
        self.validator = None;
        self.fixme = None;
    }

    /// 从队首取出下一个条目开始处理
    fn begin_head(&mut self) -> Option<InFlight> {
        match self.queue.pop_front()? {
            QueueItem::Call(call) => Some(InFlight::Call(call)),
            QueueItem::Deliver {
                payload,
                hook,
                fixme,
            } => {
                self.add(Payload::Typing);
                Some(InFlight::Deliver {
                    payload,
                    hook,
                    fixme,
                    placeholder: self.messages.len() - 1,
                })
            }
        }
    }
}

struct Inner {
    state: Mutex<ContentState>,
    input: InputSynchronizer,
    updates: broadcast::Sender<Message>,
}

/// 内容管理器
///
/// 持有渲染列表、分发队列与输入同步器。克隆得到的是同一个管理器的句柄。
#[derive(Clone)]
pub struct ContentManager {
    inner: Arc<Inner>,
}

impl Default for ContentManager {
    fn default() -> Self {
        Self::new(ContentConfig::default())
    }
}

impl std::fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ContentManager")
            .field("messages", &state.messages.len())
            .field("queued", &state.queue.len())
            .field("pumping", &state.pumping)
            .finish()
    }
}

impl ContentManager {
    /// 创建内容管理器
    pub fn new(config: ContentConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ContentState {
                    messages: Vec::new(),
                    queue: VecDeque::new(),
                    pumping: false,
                    generation: 0,
                    input: InputState::default(),
                    config,
                    fixme: None,
                    validator: None,
                    fixmes: HashMap::new(),
                }),
                input: InputSynchronizer::new(),
                updates,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //=========================================================================
    // 配置
    //=========================================================================

    /// 当前配置
    pub fn config(&self) -> ContentConfig {
        self.lock().config.clone()
    }

    /// 替换配置
    pub fn set_config(&self, config: ContentConfig) {
        self.lock().config = config;
    }

    /// 设置每条消息的延迟（毫秒）
    pub fn set_queue_timeout(&self, timeout_ms: u64) {
        self.lock().config.timeout_ms = timeout_ms;
    }

    //=========================================================================
    // 渲染列表
    //=========================================================================

    /// 丢弃所有消息和未处理的条目
    ///
    /// 正在处理的条目完成后不会再写入渲染列表；等待中的输入请求被中断。
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.messages.clear();
            state.fixmes.clear();
            state.queue.clear();
            state.pumping = false;
            state.generation += 1;
        }
        self.inner.input.cancel();
    }

    /// 渲染列表快照
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// 未开始处理的条目数
    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// 队列是否空闲（没有条目在处理，也没有条目在排队）
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.pumping && state.queue.is_empty()
    }

    /// 订阅"已更新"通知，每条送达的消息通知一次
    pub fn subscribe_updates(&self) -> broadcast::Receiver<Message> {
        self.inner.updates.subscribe()
    }

    /// 直接追加一条消息（不经过队列）
    pub fn add(&self, payload: Payload) -> Message {
        self.lock().add(payload)
    }

    /// 替换最后一条消息
    pub fn replace(&self, payload: Payload) -> Message {
        let mut state = self.lock();
        let last = state.messages.len().saturating_sub(1);
        state.replace_at(last, payload)
    }

    fn report_updated(&self, message: Message) {
        let delay = self.lock().config.update_delay();
        let updates = self.inner.updates.clone();
        if delay.is_zero() {
            let _ = updates.send(message);
            return;
        }
        // 稍晚发出，避免与界面滚动竞争
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = updates.send(message);
        });
    }

    //=========================================================================
    // 分发队列
    //=========================================================================

    fn push(&self, item: QueueItem) {
        let started = {
            let mut state = self.lock();
            state.queue.push_back(item);
            if state.pumping {
                None
            } else {
                state.pumping = true;
                let generation = state.generation;
                state.begin_head().map(|current| (generation, current))
            }
        };

        if let Some((generation, current)) = started {
            tokio::spawn(self.clone().pump(generation, current));
        }
    }

    async fn pump(self, generation: u64, current: InFlight) {
        let mut current = Some(current);
        while let Some(item) = current.take() {
            match item {
                InFlight::Call(call) => {
                    trace!("处理函数条目");
                    call().await;
                }
                InFlight::Deliver {
                    payload,
                    hook,
                    fixme,
                    placeholder,
                } => {
                    let delay = self.lock().config.delay();
                    tokio::time::sleep(delay).await;

                    let message = {
                        let mut state = self.lock();
                        if state.generation != generation {
                            return;
                        }
                        if let Some(fixme) = fixme {
                            state.fixmes.insert(placeholder, fixme);
                        }
                        state.replace_at(placeholder, payload)
                    };
                    debug!(kind = %message.kind(), "消息已送达");

                    if let Some(hook) = hook {
                        hook();
                    }
                    self.report_updated(message);
                }
            }

            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            current = state.begin_head();
            if current.is_none() {
                state.pumping = false;
            }
        }
    }

    /// 入队一条消息
    pub fn queue(&self, payload: Payload) {
        self.push(QueueItem::Deliver {
            payload,
            hook: None,
            fixme: None,
        });
    }

    /// 入队一条消息，送达后调用 `hook`
    pub fn queue_with_hook(&self, payload: Payload, hook: DeliveryHook) {
        self.push(QueueItem::Deliver {
            payload,
            hook: Some(hook),
            fixme: None,
        });
    }

    /// 入队一个函数，在所有先前的条目处理完后调用，返回其结果
    pub async fn queue_function<F, Fut, T>(&self, f: F) -> ChatResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let call: QueuedCall = Box::new(move || {
            Box::pin(async move {
                let _ = tx.send(f().await);
            })
        });
        self.push(QueueItem::Call(call));
        Ok(rx.await.map_err(|_| RuntimeError::Interrupted)?)
    }

    //=========================================================================
    // 消息便捷方法
    //=========================================================================

    /// 入队一条发给用户的消息
    pub fn add_to(&self, message: impl Into<String>, hook: Option<DeliveryHook>) {
        let payload = Payload::To {
            message: message.into(),
        };
        match hook {
            Some(hook) => self.queue_with_hook(payload, hook),
            None => self.queue(payload),
        }
    }

    /// 立即追加用户消息，并作为输入提交
    ///
    /// 提交后清除多行模式、占位文本、校验器与修改回调。
    pub fn add_from(&self, message: impl Into<String>) {
        let message = message.into();
        let added = {
            let mut state = self.lock();
            let (label, fixme) = state.current_fixme();
            let added = state.add(Payload::From {
                message: message.clone(),
                fixme: label,
            });
            if let Some(fixme) = fixme {
                let index = state.messages.len() - 1;
                state.fixmes.insert(index, fixme);
            }
            added
        };
        self.report_value(message);
        self.report_updated(added);
        self.lock().reset_prompt();
    }

    /// 入队一条用户消息（回放时使用）
    pub fn queue_from(&self, message: impl Into<String>) {
        let (label, fixme) = self.lock().current_fixme();
        self.push(QueueItem::Deliver {
            payload: Payload::From {
                message: message.into(),
                fixme: label,
            },
            hook: None,
            fixme,
        });
    }

    /// 入队选项列表，可带一条引导消息
    pub fn add_options(
        &self,
        message: Option<String>,
        options: Vec<OptionItem>,
        selected: Option<Value>,
        multi: bool,
    ) {
        if let Some(message) = message {
            self.add_to(message, None);
        }
        let (label, fixme) = self.lock().current_fixme();
        self.push(QueueItem::Deliver {
            payload: Payload::Options {
                options,
                selected,
                multi,
                fixme: label,
            },
            hook: None,
            fixme,
        });
    }

    /// 调用第 `index` 条消息的修改回调，消息没有修改按钮时返回 `false`
    pub fn fixme_at(&self, index: usize) -> bool {
        let fixme = self.lock().fixmes.get(&index).cloned();
        match fixme {
            Some(fixme) => {
                debug!(index, "修改消息");
                fixme();
                true
            }
            None => false,
        }
    }

    /// 入队文件上传请求，可带一条引导消息
    pub fn add_uploader(&self, message: Option<String>, options: Option<Value>) {
        if let Some(message) = message {
            self.add_to(message, None);
        }
        self.queue(Payload::Uploader { options });
    }

    //=========================================================================
    // 输入
    //=========================================================================

    /// 输入框状态快照
    pub fn input_state(&self) -> InputState {
        self.lock().input.clone()
    }

    fn update_input(&self, f: impl FnOnce(&mut InputState)) {
        f(&mut self.lock().input);
    }

    /// 开启多行输入
    pub fn set_text_area(&self) {
        self.update_input(|input| input.text_area = true);
    }

    /// 设置输入类型与约束
    pub fn set_input_kind(
        &self,
        kind: Option<&str>,
        required: Option<bool>,
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    ) {
        self.update_input(|input| {
            input.kind = kind.unwrap_or("text").to_string();
            input.required = required;
            input.min = min;
            input.max = max;
            input.step = step;
        });
    }

    /// 设置输入建议
    pub fn set_input_suggestions(&self, suggestions: Option<Vec<String>>) {
        self.update_input(|input| input.suggestions = suggestions);
    }

    /// 设置占位文本
    pub fn set_placeholder(&self, placeholder: impl Into<String>) {
        let placeholder = placeholder.into();
        self.update_input(|input| input.placeholder = placeholder);
    }

    /// 设置快速滚动
    pub fn set_fast_scroll(&self, value: bool) {
        self.update_input(|input| input.fast_scroll = value);
    }

    /// 设置当前提问的输入校验器
    pub fn set_validator(&self, validator: Option<InputValidator>) {
        self.lock().validator = validator;
    }

    /// 设置当前提问的修改回调，对之后入队的用户消息与选项列表生效
    pub fn set_fixme(&self, fixme: Option<FixmeHook>) {
        self.lock().fixme = fixme;
    }

    /// 用当前校验器检查输入，没有校验器时总是通过
    pub fn validate(&self, text: &str) -> bool {
        let validator = self.lock().validator.clone();
        validator.is_none_or(|validator| validator(text))
    }

    /// 提交用户输入
    ///
    /// 没有等待者时值被丢弃，返回 `false`。
    pub fn report_value(&self, value: impl Into<Value>) -> bool {
        let delivered = self.inner.input.report(value.into());
        if !delivered {
            debug!("没有等待中的输入请求，丢弃输入");
        }
        delivered
    }

    /// 是否有等待中的输入请求
    pub fn is_awaiting_input(&self) -> bool {
        self.inner.input.is_pending()
    }

    /// 等待一次用户输入
    ///
    /// `enable_text_input` 为真时，先通过队列打开输入框，保证所有先前入队的消息
    /// 已经送达；收到值后关闭输入框。
    pub async fn wait_for_input(&self, enable_text_input: bool) -> ChatResult<Value> {
        if enable_text_input {
            let this = self.clone();
            self.queue_function(move || async move {
                debug!("开启输入");
                this.update_input(|input| input.enabled = true);
            })
            .await?;
        }

        let rx = self.inner.input.register()?;
        let value = rx.await.map_err(|_| RuntimeError::Interrupted)?;
        debug!(value = %value, "关闭输入");
        self.update_input(|input| input.enabled = false);
        Ok(value)
    }
}
