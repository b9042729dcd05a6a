//! # Chat CLI
//!
//! 在终端里运行对话脚本。
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p host-cli -- scripts/demo.json
//! cargo run -p host-cli -- scripts/demo.json --index 1 --delay-ms 200
//! cargo run -p host-cli -- scripts/demo.json --check
//! cargo run -p host-cli -- scripts/demo.json -vv --dump-record
//! ```
//!
//! 选项消息可以用序号或显示文本回答；上传请求输入文件路径；
//! 多行输入以空行结束。

mod commands;
mod config;
mod console;

use anyhow::{Context, Result};
use chat_runtime::{
    Callbacks, ChatError, ContentManager, Record, RunOptions, RuntimeError, ScriptDocument,
    ScriptRunner, analyze_script, load_documents, value_text,
};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, info};

use crate::config::HostConfig;
use crate::console::ConsoleState;

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "在终端里运行对话脚本")]
#[command(version)]
struct Cli {
    /// 脚本文件（JSON 文档数组或单个文档）
    script: PathBuf,

    /// 运行的文档索引（覆盖配置文件）
    #[arg(short, long)]
    index: Option<usize>,

    /// 每条消息的延迟（毫秒，覆盖配置文件）
    #[arg(long)]
    delay_ms: Option<u64>,

    /// 配置文件路径
    #[arg(short, long, default_value = "chat.json")]
    config: PathBuf,

    /// 只检查脚本，不运行
    #[arg(long)]
    check: bool,

    /// 运行结束后打印 Record
    #[arg(long)]
    dump_record: bool,

    /// 日志详细程度（-v info，-vv debug，-vvv trace）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// 静态检查所有文档
fn check(documents: &[ScriptDocument]) -> Result<()> {
    let mut errors = 0;
    for (index, document) in documents.iter().enumerate() {
        let result = analyze_script(document);
        for diagnostic in &result.diagnostics {
            println!("#{index} {diagnostic}");
        }
        errors += result.error_count();
    }

    if errors > 0 {
        anyhow::bail!("脚本检查发现 {} 个错误", errors);
    }
    println!("✅ 检查通过");
    Ok(())
}

fn callbacks() -> Callbacks {
    Callbacks::default()
        .with_collect(|key, value| info!(key, value = %value, "收集"))
        .with_meta(|meta| debug!(?meta, "meta"))
        .with_event(|value| println!("🔔 {}", value_text(value)))
}

/// 等待队列中剩余的消息全部显示
async fn settle(content: &ContentManager) {
    while !content.is_idle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(content.config().update_delay()).await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = HostConfig::load(&cli.config);
    config.apply_overrides(cli.index, cli.delay_ms, cli.dump_record);

    let text = fs::read_to_string(&cli.script)
        .with_context(|| format!("无法读取脚本: {}", cli.script.display()))?;
    let documents = load_documents(&text).context("脚本解析失败")?;

    if cli.check {
        return check(&documents);
    }

    let content = ContentManager::new(config.content.clone());
    let state = ConsoleState::default();
    let renderer = console::spawn_renderer(&content, state.clone(), config.clone());
    let reader = tokio::spawn(console::forward_input(
        content.clone(),
        state,
        console::spawn_stdin_reader(),
    ));

    let record = Record::new();
    let options = RunOptions::default()
        .with_index(config.document_index)
        .with_context(commands::command_table(&content))
        .with_record(record.clone())
        .with_callbacks(callbacks());

    let runner = ScriptRunner::new(content.clone());
    let outcome = runner.run(&documents, options).await;
    reader.abort();

    match outcome {
        Ok(finished) => {
            settle(&content).await;
            if finished {
                println!("✅ 对话完成");
            } else {
                println!("⏹ 对话结束");
            }
        }
        Err(ChatError::Runtime(RuntimeError::Interrupted)) => {
            println!("⚠️ 输入已结束，对话中断");
        }
        Err(e) => {
            renderer.abort();
            return Err(e).context("对话运行失败");
        }
    }
    renderer.abort();

    if config.dump_record {
        println!("{}", serde_json::to_string_pretty(&record.snapshot())?);
    }
    Ok(())
}
