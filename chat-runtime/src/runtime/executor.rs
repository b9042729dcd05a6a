//! # Executor 模块
//!
//! 单个步骤的执行：发送文本、调用命令、等待输入、写入 Record、按选项分支。
//!
//! ## meta 的送达时机
//!
//! 每个步骤的 meta 最多送达一次：
//! - 文本中有命令行：第一个命令得到结果后立即送达
//! - 只有普通文本：挂在第一条消息上，消息真正送达后触发
//! - 没有文本：立即送达

use serde_json::Value;
use tracing::{debug, trace};

use crate::command::CommandLine;
use crate::content::{DeliveryHook, OptionItem};
use crate::error::ChatResult;
use crate::runtime::engine::RunContext;
use crate::script::{Collect, MatchKind, Meta, Step};
use crate::state::value_text;
use crate::template::fill_in;

/// 文本行
enum Line<'a> {
    Command(CommandLine),
    Text(&'a str),
}

impl<'a> Line<'a> {
    fn parse(line: &'a str) -> Self {
        match CommandLine::parse(line) {
            Some(command) => Self::Command(command),
            None => Self::Text(line),
        }
    }
}

impl RunContext {
    /// 执行一个步骤，返回是否结束整次运行
    pub async fn execute_step(&self, step: &Step) -> ChatResult<bool> {
        trace!(?step, "执行步骤");
        let key = step.collect_key();
        let mut pending_meta = match (&step.meta, &self.callbacks.meta) {
            (Some(meta), Some(_)) => Some(meta),
            _ => None,
        };
        let mut value: Option<Value> = None;

        match &step.text {
            Some(text) => {
                let lines: Vec<Line<'_>> = text.iter().map(|line| Line::parse(line)).collect();
                let has_command = lines.iter().any(|line| matches!(line, Line::Command(_)));

                for line in &lines {
                    match line {
                        Line::Command(command) => {
                            let result = self.invoker().invoke(command, key).await?;
                            value = (!result.is_null()).then_some(result);
                            if let Some(meta) = pending_meta.take() {
                                debug!(command = %command.name, "命令完成，送达 meta");
                                self.emit_meta(meta);
                            }
                        }
                        Line::Text(line) => {
                            let hook = if has_command {
                                None
                            } else {
                                pending_meta.take().and_then(|meta| self.meta_hook(meta))
                            };
                            self.content.add_to(fill_in(line, &self.record), hook);
                        }
                    }
                }

                if value.is_none() {
                    value = self.ask(step).await?;
                }
            }
            None => {
                if let Some(meta) = pending_meta.take() {
                    self.emit_meta(meta);
                }
            }
        }

        match (value, &step.collect) {
            (Some(value), Some(collect)) => self.apply_collect(collect, key, value).await,
            _ => Ok(false),
        }
    }

    /// 没有命令结果时向用户索取输入
    async fn ask(&self, step: &Step) -> ChatResult<Option<Value>> {
        if let Some(replies) = &step.quick_replies {
            let options = replies
                .iter()
                .map(|reply| OptionItem::new(reply.title.clone(), reply.payload.clone()))
                .collect();
            self.content.add_options(None, options, None, false);
            let value = self.content.wait_for_input(true).await?;
            if let Some(meta) = &step.meta {
                self.fire_events(meta, &value);
            }
            return Ok(non_null(value));
        }

        match &step.collect {
            Some(collect) => {
                if collect.multiple {
                    self.content.set_text_area();
                }
                let value = self.content.wait_for_input(true).await?;
                Ok(non_null(value))
            }
            None => Ok(None),
        }
    }

    /// 写入 Record 并按选项分支
    async fn apply_collect(
        &self,
        collect: &Collect,
        key: Option<&str>,
        value: Value,
    ) -> ChatResult<bool> {
        if let Some(key) = key {
            self.record.set(key, value.clone());
            if let Some(callback) = &self.callbacks.collect {
                callback(key, &value);
            }
        }

        let text = value_text(&value);
        for option in &collect.options {
            let Some(pattern) = option.pattern.as_deref() else {
                continue;
            };
            let matched = match option.kind {
                Some(MatchKind::String) => pattern == text,
                Some(MatchKind::Regex) => self.threads.pattern(pattern)?.is_match(&text),
                Some(MatchKind::Other) | None => false,
            };
            if matched {
                debug!(pattern, action = %option.action, "选项匹配");
                return self.execute_action(&option.action).await;
            }
        }

        match collect.options.iter().find(|option| option.default) {
            Some(option) => {
                debug!(action = %option.action, "使用默认选项");
                self.execute_action(&option.action).await
            }
            None => Ok(false),
        }
    }

    fn emit_meta(&self, meta: &Meta) {
        if let Some(callback) = &self.callbacks.meta {
            callback(meta);
        }
    }

    fn meta_hook(&self, meta: &Meta) -> Option<DeliveryHook> {
        let callback = self.callbacks.meta.clone()?;
        let meta = meta.clone();
        Some(Box::new(move || callback(&meta)))
    }

    /// 触发键为 `on:<value>` 的所有事件
    fn fire_events(&self, meta: &Meta, value: &Value) {
        let Some(callback) = &self.callbacks.event else {
            return;
        };
        let event_key = format!("on:{}", value_text(value));
        for entry in meta.iter().filter(|entry| entry.key == event_key) {
            callback(&entry.value);
        }
    }
}

fn non_null(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandTable;
    use crate::content::ContentManager;
    use crate::error::ScriptError;
    use crate::runtime::engine::Callbacks;
    use crate::script::{CollectOption, MetaEntry, QuickReply, Thread, ThreadIndex};
    use crate::state::Record;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    fn context_with(threads: Vec<Thread>, table: CommandTable, callbacks: Callbacks) -> RunContext {
        RunContext::new(
            ThreadIndex::from_threads(threads).unwrap(),
            Record::new(),
            Arc::new(table),
            callbacks,
            ContentManager::default(),
        )
    }

    fn default_only() -> Vec<Thread> {
        vec![Thread::new("default", vec![])]
    }

    fn action_step(action: &str) -> Step {
        Step {
            action: Some(action.to_string()),
            ..Step::default()
        }
    }

    fn collect_step(options: Vec<CollectOption>) -> Step {
        Step {
            text: Some(vec!["Question?".to_string()]),
            collect: Some(Collect {
                key: Some("answer".to_string()),
                multiple: false,
                options,
            }),
            ..Step::default()
        }
    }

    async fn answer(content: &ContentManager, value: Value) {
        while !content.is_awaiting_input() {
            sleep(Duration::from_millis(10)).await;
        }
        assert!(content.report_value(value));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_matching_option_wins() {
        let ctx = context_with(
            vec![
                Thread::new("default", vec![]),
                Thread::new("a", vec![action_step("complete")]),
                Thread::new("b", vec![action_step("next")]),
            ],
            CommandTable::new(),
            Callbacks::default(),
        );
        let step = collect_step(vec![
            CollectOption::string("yes", "a"),
            CollectOption::string("yes", "b"),
        ]);

        let (finished, _) =
            tokio::join!(ctx.execute_step(&step), answer(&ctx.content, json!("yes")));
        assert!(finished.unwrap());
        assert_eq!(ctx.record.get("answer"), Some(json!("yes")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_option_used_when_nothing_matches() {
        let ctx = context_with(default_only(), CommandTable::new(), Callbacks::default());
        let step = collect_step(vec![
            CollectOption::string("no", "next"),
            CollectOption::fallback("complete"),
        ]);

        let (finished, _) =
            tokio::join!(ctx.execute_step(&step), answer(&ctx.content, json!("maybe")));
        assert!(finished.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_match_and_no_default_continues() {
        let ctx = context_with(default_only(), CommandTable::new(), Callbacks::default());
        let step = collect_step(vec![CollectOption::regex("^[0-9]+$", "complete")]);

        let (finished, _) =
            tokio::join!(ctx.execute_step(&step), answer(&ctx.content, json!("abc")));
        assert!(!finished.unwrap());
        assert_eq!(ctx.record.text("answer").as_deref(), Some("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_regex_option_on_step_outside_index() {
        let mut table = CommandTable::new();
        table.register("v", |_| Ok(json!("Alice")));
        let ctx = context_with(default_only(), table, Callbacks::default());
        let mut step = collect_step(vec![CollectOption::regex("^A", "complete")]);
        step.text = Some(vec!["cmd.v()".to_string()]);

        assert!(ctx.execute_step(&step).await.unwrap());
        assert_eq!(ctx.record.get("answer"), Some(json!("Alice")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_regex_errors_when_evaluated() {
        let mut table = CommandTable::new();
        table.register("v", |_| Ok(json!("Alice")));
        let ctx = context_with(default_only(), table, Callbacks::default());
        let mut step = collect_step(vec![
            CollectOption::string("Alice", "complete"),
            CollectOption::regex("(unclosed", "next"),
        ]);
        step.text = Some(vec!["cmd.v()".to_string()]);

        // 先匹配的选项不会触及坏模式
        assert!(ctx.execute_step(&step).await.unwrap());

        step.collect.as_mut().unwrap().options.reverse();
        let err = ctx.execute_step(&step).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ChatError::Script(ScriptError::InvalidPattern { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_value_skips_input() {
        let mut table = CommandTable::new();
        table.register("pick", |_| Ok(json!("yes")));
        let ctx = context_with(default_only(), table, Callbacks::default());
        let mut step = collect_step(vec![CollectOption::string("yes", "complete")]);
        step.text = Some(vec!["cmd.pick()".to_string()]);

        assert!(ctx.execute_step(&step).await.unwrap());
        assert!(!ctx.content.is_awaiting_input());
        assert_eq!(ctx.record.get("answer"), Some(json!("yes")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_replies_fire_all_matching_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callbacks = Callbacks::default().with_event(move |value| {
            sink.lock().unwrap().push(value.clone());
        });
        let ctx = context_with(default_only(), CommandTable::new(), callbacks);
        let step = Step {
            text: Some(vec!["Continue?".to_string()]),
            quick_replies: Some(vec![
                QuickReply {
                    title: "Yes".to_string(),
                    payload: "yes".to_string(),
                },
                QuickReply {
                    title: "No".to_string(),
                    payload: "no".to_string(),
                },
            ]),
            meta: Some(vec![
                MetaEntry {
                    key: "on:yes".to_string(),
                    value: json!("first"),
                },
                MetaEntry {
                    key: "on:no".to_string(),
                    value: json!("other"),
                },
                MetaEntry {
                    key: "on:yes".to_string(),
                    value: json!("second"),
                },
            ]),
            ..Step::default()
        };

        let (finished, _) =
            tokio::join!(ctx.execute_step(&step), answer(&ctx.content, json!("yes")));
        assert!(!finished.unwrap());
        assert_eq!(*events.lock().unwrap(), vec![json!("first"), json!("second")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_meta_without_text_fires_immediately() {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let callbacks = Callbacks::default().with_meta(move |_| *sink.lock().unwrap() += 1);
        let ctx = context_with(default_only(), CommandTable::new(), callbacks);
        let step = Step {
            meta: Some(vec![MetaEntry {
                key: "stage".to_string(),
                value: json!(1),
            }]),
            ..Step::default()
        };

        assert!(!ctx.execute_step(&step).await.unwrap());
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_collect_enables_text_area() {
        let ctx = context_with(default_only(), CommandTable::new(), Callbacks::default());
        let mut step = collect_step(vec![]);
        if let Some(collect) = step.collect.as_mut() {
            collect.multiple = true;
        }

        let (finished, _) =
            tokio::join!(ctx.execute_step(&step), answer(&ctx.content, json!("line 1\nline 2")));
        assert!(!finished.unwrap());
        assert!(ctx.content.input_state().text_area);
    }
}
