//! # Console 模块
//!
//! 终端渲染与输入。
//!
//! 渲染任务订阅内容管理器的更新通知，逐条打印已送达的消息；
//! 输入在独立线程中按行读取 stdin，通过通道交给异步侧提交。
//!
//! 运行时还没有开始等待输入时，已经读到的行留在通道里，等到需要时再提交。
//! 输入 `!fix` 会调用最近一条带修改按钮的消息的修改回调。

use chat_runtime::{
    ContentConfig, ContentManager, InputState, Message, OptionItem, Payload, value_text,
};
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::HostConfig;

/// 修改上一条回答的输入
pub const FIX_COMMAND: &str = "!fix";

/// 轮询输入请求的间隔
const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 用户的一次提交
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// 作为用户消息提交
    Text(String),
    /// 作为上传结果提交
    Upload(Value),
}

#[derive(Debug, Default)]
struct Pending {
    /// 最近一次展示的选项
    options: Vec<OptionItem>,
    /// 是否在等待文件路径
    upload: bool,
    /// 多行输入缓冲
    lines: Vec<String>,
}

/// 渲染侧与输入侧共享的状态
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    inner: Arc<Mutex<Pending>>,
}

impl ConsoleState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 记录渲染出的交互消息
    pub fn observe(&self, message: &Message) {
        let mut pending = self.lock();
        match &message.payload {
            Payload::Options { options, .. } => pending.options = options.clone(),
            Payload::Uploader { .. } => pending.upload = true,
            _ => {}
        }
    }

    /// 把一行输入解析为提交内容
    ///
    /// 多行模式下空行之前的内容被缓存，返回 `None`。
    pub fn resolve(&self, line: &str, text_area: bool) -> Option<Answer> {
        let mut pending = self.lock();

        if pending.upload {
            pending.upload = false;
            return Some(Answer::Upload(json!({ "path": line.trim() })));
        }

        if text_area {
            if !line.is_empty() {
                pending.lines.push(line.to_string());
                return None;
            }
            let text = pending.lines.join("\n");
            pending.lines.clear();
            return Some(Answer::Text(text));
        }

        let options = std::mem::take(&mut pending.options);
        let line = line.trim();
        let chosen = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i))
            .or_else(|| options.iter().find(|o| o.display.eq_ignore_ascii_case(line)));
        match chosen {
            Some(option) => Some(Answer::Text(value_text(&option.value))),
            None => Some(Answer::Text(line.to_string())),
        }
    }
}

/// 格式化一条消息，不需要打印的返回 `None`
pub fn format_message(message: &Message, config: &HostConfig) -> Option<String> {
    match &message.payload {
        Payload::To { message } => Some(format!("💬 {message}")),
        Payload::Options { options, fixme, .. } => {
            let mut lines: Vec<String> = options
                .iter()
                .enumerate()
                .map(|(i, option)| format!("  [{}] {}", i + 1, option.display))
                .collect();
            if let Some(label) = fixme {
                lines.push(format!("  ({FIX_COMMAND}) {label}"));
            }
            Some(lines.join("\n"))
        }
        Payload::Uploader { .. } => Some(format!(
            "📎 {}（输入文件路径）",
            config.content.upload_file_text
        )),
        Payload::From {
            fixme: Some(label), ..
        } => Some(format!("  ({FIX_COMMAND}) {label}")),
        Payload::Typing | Payload::From { .. } => None,
    }
}

/// 输入提示符
///
/// 占位文本优先使用当前提问设置的，没有时用配置中的默认值；
/// 多行模式提示用空行发送。
pub fn prompt(input: &InputState, config: &ContentConfig) -> String {
    let placeholder = if input.placeholder.is_empty() {
        &config.input_placeholder
    } else {
        &input.placeholder
    };
    if input.text_area {
        format!("{placeholder}（空行{}）\n> ", config.send_button_text)
    } else {
        format!("{placeholder} > ")
    }
}

/// 启动渲染任务
pub fn spawn_renderer(
    content: &ContentManager,
    state: ConsoleState,
    config: HostConfig,
) -> JoinHandle<()> {
    let mut updates = content.subscribe_updates();
    let content = content.clone();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    state.observe(&message);
                    if let Some(text) = format_message(&message, &config) {
                        println!("{text}");
                    }
                    let input = content.input_state();
                    if input.enabled {
                        print!("{}", prompt(&input, &config.content));
                        let _ = std::io::stdout().flush();
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "渲染落后，跳过部分消息"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// 在独立线程中读取 stdin
///
/// 读到 EOF 时通道关闭。
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// 等到运行时开始等待输入
async fn wait_for_prompt(content: &ContentManager) {
    while !content.is_awaiting_input() {
        tokio::time::sleep(PROMPT_POLL_INTERVAL).await;
    }
}

/// 调用最近一条带修改按钮的消息的修改回调
fn fix_last(content: &ContentManager) -> bool {
    let index = content
        .messages()
        .iter()
        .rposition(|message| message.payload.fixme().is_some());
    index.is_some_and(|index| content.fixme_at(index))
}

/// 把输入行提交给内容管理器，直到输入结束
///
/// 每一行都等到有输入请求时才提交，提前输入的行按顺序保留。
/// 输入结束后，在下一次输入请求时清空内容管理器，中断运行。
pub async fn forward_input(
    content: ContentManager,
    state: ConsoleState,
    mut lines: mpsc::Receiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if line.trim() == FIX_COMMAND {
            if !fix_last(&content) {
                println!("⚠️ 没有可以修改的回答");
            }
            continue;
        }

        wait_for_prompt(&content).await;
        match state.resolve(&line, content.input_state().text_area) {
            Some(Answer::Text(text)) => {
                if content.validate(&text) {
                    content.add_from(text);
                } else {
                    println!("⚠️ 输入无效，请重新输入");
                }
            }
            Some(Answer::Upload(value)) => {
                content.report_value(value);
            }
            None => {}
        }
    }
    debug!("输入结束");
    wait_for_prompt(&content).await;
    content.clear();
}
