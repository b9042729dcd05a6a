//! # 对话集成测试
//!
//! 测试 ScriptRunner → ContentManager → InputSynchronizer 的完整链路。
//! 所有测试使用暂停的 tokio 时钟，消息延迟是虚拟时间。

use chat_runtime::{
    BoxError, Callbacks, ChatError, CommandTable, ContentManager, Message, Payload, Record,
    RunOptions, RuntimeError, ScriptDocument, ScriptRunner, load_documents, value_text,
};
use insta::assert_snapshot;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const GREETING: &str = r#"[{"script": [{"topic": "default", "script": [
    {"text": ["Hi {{name}}"], "collect": {"key": "name", "options": [
        {"type": "regex", "pattern": "^A", "action": "complete"},
        {"default": true, "action": "next"}
    ]}}
]}]}]"#;

fn documents(text: &str) -> Vec<ScriptDocument> {
    load_documents(text).unwrap()
}

fn render(message: &Message) -> String {
    match &message.payload {
        Payload::Typing => "typing".to_string(),
        Payload::To { message } => format!("to: {message}"),
        Payload::From { message, .. } => format!("from: {message}"),
        Payload::Options { options, .. } => {
            let items: Vec<String> = options
                .iter()
                .map(|o| format!("{}={}", o.display, value_text(&o.value)))
                .collect();
            format!("options: {}", items.join(" | "))
        }
        Payload::Uploader { .. } => "uploader".to_string(),
    }
}

fn transcript(content: &ContentManager) -> String {
    content
        .messages()
        .iter()
        .map(render)
        .collect::<Vec<_>>()
        .join("\n")
}

async fn wait_until_awaiting(content: &ContentManager) {
    while !content.is_awaiting_input() {
        sleep(Duration::from_millis(10)).await;
    }
}

/// 依次回答每个输入请求
async fn answer_all(content: &ContentManager, answers: &[&str]) {
    for answer in answers {
        wait_until_awaiting(content).await;
        content.add_from(*answer);
    }
}

/// 等待队列处理完所有消息
async fn settle(content: &ContentManager) {
    while !content.is_idle() {
        sleep(Duration::from_millis(10)).await;
    }
}

async fn run_script(
    text: &str,
    options: RunOptions,
    answers: &[&str],
) -> (Result<bool, ChatError>, ContentManager) {
    let docs = documents(text);
    let content = ContentManager::default();
    let runner = ScriptRunner::new(content.clone());
    let (result, _) = tokio::join!(runner.run(&docs, options), answer_all(&content, answers));
    settle(&content).await;
    (result, content)
}

#[tokio::test(start_paused = true)]
async fn test_greeting_regex_match_completes() {
    let (result, content) = run_script(GREETING, RunOptions::default(), &["Alice"]).await;
    assert!(result.unwrap());
    assert_snapshot!(transcript(&content), @r"
    to: Hi name
    from: Alice
    ");
}

#[tokio::test(start_paused = true)]
async fn test_greeting_default_option_continues() {
    let (result, content) = run_script(GREETING, RunOptions::default(), &["Bob"]).await;
    assert!(!result.unwrap());
    assert_eq!(content.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_record_is_shared_with_host() {
    let record = Record::new();
    let options = RunOptions::default().with_record(record.clone());
    let (result, _) = run_script(GREETING, options, &["Alice"]).await;
    assert!(result.unwrap());
    assert_eq!(record.get("name"), Some(json!("Alice")));
}

#[tokio::test(start_paused = true)]
async fn test_first_match_wins_across_threads() {
    let script = r#"[{"script": [
        {"topic": "default", "script": [
            {"text": ["Sure?"], "collect": {"key": "sure", "options": [
                {"type": "string", "pattern": "yes", "action": "a"},
                {"type": "string", "pattern": "yes", "action": "b"}
            ]}}
        ]},
        {"topic": "a", "script": [{"action": "complete"}]},
        {"topic": "b", "script": [{"action": "next"}]}
    ]}]"#;
    let (result, _) = run_script(script, RunOptions::default(), &["yes"]).await;
    assert!(result.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_default_fallback_runs_thread() {
    let script = r#"[{"script": [
        {"topic": "default", "script": [
            {"text": ["Sure?"], "collect": {"key": "sure", "options": [
                {"type": "string", "pattern": "no", "action": "a"},
                {"default": true, "action": "d"}
            ]}}
        ]},
        {"topic": "a", "script": [{"action": "next"}]},
        {"topic": "d", "script": [{"text": ["Falling back"]}, {"action": "complete"}]}
    ]}]"#;
    let (result, content) = run_script(script, RunOptions::default(), &["maybe"]).await;
    assert!(result.unwrap());
    assert_snapshot!(transcript(&content), @r"
    to: Sure?
    from: maybe
    to: Falling back
    ");
}

#[tokio::test(start_paused = true)]
async fn test_full_conversation_transcript() {
    let script = r#"[{"script": [
        {"topic": "default", "script": [
            {"text": ["What's your name?"], "collect": {"key": "name"}},
            {
                "text": ["Nice to meet you, {{name}}!", "Ready?"],
                "quick_replies": [
                    {"title": "Yes", "payload": "yes"},
                    {"title": "No", "payload": "no"}
                ],
                "collect": {"key": "ready", "options": [
                    {"type": "string", "pattern": "yes", "action": "go"},
                    {"default": true, "action": "complete"}
                ]}
            }
        ]},
        {"topic": "go", "script": [{"text": ["Let's go"]}, {"action": "complete"}]}
    ]}]"#;

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let callbacks = Callbacks::default().with_collect(move |key, value| {
        sink.lock().unwrap().push(format!("{key}={}", value_text(value)));
    });
    let options = RunOptions::default().with_callbacks(callbacks);

    let (result, content) = run_script(script, options, &["Ada", "yes"]).await;
    assert!(result.unwrap());
    assert_eq!(*collected.lock().unwrap(), vec!["name=Ada", "ready=yes"]);
    assert_snapshot!(transcript(&content), @r"
    to: What's your name?
    from: Ada
    to: Nice to meet you, Ada!
    to: Ready?
    options: Yes=yes | No=no
    from: yes
    to: Let's go
    ");
}

#[tokio::test(start_paused = true)]
async fn test_meta_timed_to_command_completion() {
    let script = r#"[{"script": [{"topic": "default", "script": [
        {"text": ["Working", "cmd.probe()"], "meta": [{"key": "stage", "value": 1}]}
    ]}]}]"#;

    let events = Arc::new(Mutex::new(Vec::new()));
    let probe_events = Arc::clone(&events);
    let mut table = CommandTable::new();
    table.register("probe", move |_| {
        probe_events.lock().unwrap().push("probe".to_string());
        Ok(Value::Null)
    });
    let meta_events = Arc::clone(&events);
    let callbacks = Callbacks::default().with_meta(move |meta| {
        assert_eq!(meta[0].key, "stage");
        meta_events.lock().unwrap().push("meta".to_string());
    });
    let options = RunOptions::default()
        .with_context(table)
        .with_callbacks(callbacks);

    let (result, content) = run_script(script, options, &[]).await;
    assert!(!result.unwrap());
    assert_eq!(*events.lock().unwrap(), vec!["probe", "meta"]);
    assert_snapshot!(transcript(&content), @"to: Working");
}

#[tokio::test(start_paused = true)]
async fn test_meta_timed_to_first_delivery() {
    let docs = documents(
        r#"[{"script": [{"topic": "default", "script": [
            {"text": ["One", "Two"], "meta": [{"key": "stage", "value": 1}]}
        ]}]}]"#,
    );
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let callbacks = Callbacks::default().with_meta(move |_| *sink.lock().unwrap() += 1);

    let content = ContentManager::default();
    let runner = ScriptRunner::new(content.clone());
    let finished = runner
        .run(&docs, RunOptions::default().with_callbacks(callbacks))
        .await
        .unwrap();
    assert!(!finished);

    // 入队时不触发
    assert_eq!(*count.lock().unwrap(), 0);

    sleep(Duration::from_millis(1050)).await;
    assert_eq!(*count.lock().unwrap(), 1);
    assert_snapshot!(transcript(&content), @r"
    to: One
    typing
    ");

    settle(&content).await;
    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quick_reply_fires_matching_events() {
    let script = r#"[{"script": [{"topic": "default", "script": [
        {
            "text": ["Subscribe?"],
            "quick_replies": [{"title": "Yes", "payload": "yes"}, {"title": "No", "payload": "no"}],
            "meta": [
                {"key": "on:yes", "value": "subscribed"},
                {"key": "on:no", "value": "declined"},
                {"key": "on:yes", "value": "welcome-mail"}
            ]
        }
    ]}]}]"#;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callbacks = Callbacks::default().with_event(move |value| {
        sink.lock().unwrap().push(value.clone());
    });

    let (result, _) = run_script(
        script,
        RunOptions::default().with_callbacks(callbacks),
        &["yes"],
    )
    .await;
    assert!(!result.unwrap());
    assert_eq!(
        *events.lock().unwrap(),
        vec![json!("subscribed"), json!("welcome-mail")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_command_result_is_collected_without_input() {
    let script = r#"[{"script": [{"topic": "default", "script": [
        {"text": ["cmd.lookup(record, key)"], "collect": {"key": "plan", "options": [
            {"type": "string", "pattern": "pro", "action": "complete"}
        ]}}
    ]}]}]"#;

    let mut table = CommandTable::new();
    table.register_async("lookup", |args| async move {
        let record = args[0].as_record().cloned().ok_or("record expected")?;
        let key = args[1].as_key().ok_or("key expected")?.to_string();
        sleep(Duration::from_millis(500)).await;
        record.set("looked_up", key);
        Ok::<_, BoxError>(json!("pro"))
    });
    let record = Record::new();
    let options = RunOptions::default()
        .with_context(table)
        .with_record(record.clone());

    let (result, content) = run_script(script, options, &[]).await;
    assert!(result.unwrap());
    assert!(content.messages().is_empty());
    assert_eq!(record.get("plan"), Some(json!("pro")));
    assert_eq!(record.get("looked_up"), Some(json!("plan")));
}

#[tokio::test(start_paused = true)]
async fn test_uploader_argument_waits_for_upload() {
    let docs = documents(
        r#"[{"script": [{"topic": "default", "script": [
            {"text": ["Send your CV", "cmd.store(uploader, record)"], "collect": {"key": "file", "options": [
                {"type": "string", "pattern": "stored", "action": "complete"}
            ]}}
        ]}]}]"#,
    );

    let mut table = CommandTable::new();
    table.register("store", |args| {
        let upload = args[0].as_upload().cloned().ok_or("upload expected")?;
        let record = args[1].as_record().ok_or("record expected")?;
        record.set("upload", upload);
        Ok(json!("stored"))
    });
    let record = Record::new();
    let options = RunOptions::default()
        .with_context(table)
        .with_record(record.clone());

    let content = ContentManager::default();
    let runner = ScriptRunner::new(content.clone());
    let upload = async {
        wait_until_awaiting(&content).await;
        assert!(content.report_value(json!({"name": "cv.pdf", "size": 1024})));
    };
    let (result, _) = tokio::join!(runner.run(&docs, options), upload);

    assert!(result.unwrap());
    assert_eq!(record.get("file"), Some(json!("stored")));
    assert_eq!(record.get("upload"), Some(json!({"name": "cv.pdf", "size": 1024})));
    assert_snapshot!(transcript(&content), @r"
    to: Send your CV
    uploader
    ");
}

#[tokio::test(start_paused = true)]
async fn test_bad_regex_in_unreached_thread_does_not_block_run() {
    let script = r#"[{"script": [
        {"topic": "default", "script": [
            {"text": ["Name?"], "collect": {"key": "name", "options": [
                {"type": "regex", "pattern": "^A", "action": "complete"}
            ]}}
        ]},
        {"topic": "broken", "script": [
            {"text": ["Age?"], "collect": {"key": "age", "options": [
                {"type": "regex", "pattern": "([0-9]+", "action": "complete"}
            ]}}
        ]}
    ]}]"#;
    let (result, _) = run_script(script, RunOptions::default(), &["Alice"]).await;
    assert!(result.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_missing_command_aborts_run() {
    let script = r#"[{"script": [{"topic": "default", "script": [
        {"text": ["cmd.missing()"]}
    ]}]}]"#;
    let (result, _) = run_script(script, RunOptions::default(), &[]).await;
    assert!(matches!(
        result,
        Err(ChatError::Runtime(RuntimeError::CommandNotFound { name })) if name == "missing"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_independent_runs_do_not_share_state() {
    let docs = documents(GREETING);
    let first = ContentManager::default();
    let second = ContentManager::default();
    let first_record = Record::new();
    let second_record = Record::new();

    let first_runner = ScriptRunner::new(first.clone());
    let second_runner = ScriptRunner::new(second.clone());
    let (a, b, _, _) = tokio::join!(
        first_runner.run(&docs, RunOptions::default().with_record(first_record.clone())),
        second_runner.run(&docs, RunOptions::default().with_record(second_record.clone())),
        answer_all(&first, &["Alice"]),
        answer_all(&second, &["Bob"]),
    );

    assert!(a.unwrap());
    assert!(!b.unwrap());
    assert_eq!(first_record.text("name").as_deref(), Some("Alice"));
    assert_eq!(second_record.text("name").as_deref(), Some("Bob"));
}
