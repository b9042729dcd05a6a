//! # 内置命令
//!
//! 命令行宿主提供给脚本的命令表：
//!
//! - `now()`：当前 Unix 时间（秒）
//! - `echo(record, key)`：读取 Record 中当前收集键的值
//! - `dump(record)`：以 JSON 打印 Record
//! - `upload(uploader, record)`：接收一个文件路径，检查文件是否存在

use chat_runtime::{BoxError, CommandArg, CommandTable, ContentManager, value_text};
use serde_json::{Value, json};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// 创建命令表
///
/// `upload` 通过 `content` 回复上传结果。
pub fn command_table(content: &ContentManager) -> CommandTable {
    let mut table = CommandTable::new();

    table
        .register("now", |_| {
            let secs = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            Ok(json!(secs))
        })
        .register("echo", |args| {
            let record = args
                .iter()
                .find_map(CommandArg::as_record)
                .ok_or("echo 需要 record 参数")?;
            let key = args
                .iter()
                .find_map(CommandArg::as_key)
                .ok_or("echo 需要 key 参数")?;
            Ok(record.get(key).unwrap_or(Value::Null))
        })
        .register("dump", |args| {
            let record = args
                .iter()
                .find_map(CommandArg::as_record)
                .ok_or("dump 需要 record 参数")?;
            println!("{}", serde_json::to_string_pretty(&record.snapshot())?);
            Ok(Value::Null)
        });

    let content = content.clone();
    table.register_async("upload", move |args| {
        let content = content.clone();
        async move {
            let upload = args
                .iter()
                .find_map(CommandArg::as_upload)
                .cloned()
                .ok_or("upload 需要 uploader 参数")?;
            let path = value_text(upload.get("path").unwrap_or(&upload));
            let exists = tokio::fs::metadata(Path::new(&path))
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            debug!(path = %path, exists, "收到上传");

            if let Some(record) = args.iter().find_map(CommandArg::as_record) {
                record.set("upload_path", path);
            }
            let config = content.config();
            let reply = if exists {
                config.uploaded_file_text
            } else {
                config.not_uploaded_file_text
            };
            content.add_to(reply, None);
            Ok::<_, BoxError>(json!(exists))
        }
    });

    table
}
