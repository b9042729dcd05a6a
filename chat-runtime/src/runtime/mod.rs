//! # Runtime 模块
//!
//! 对话解释器。
//!
//! ## 模块结构
//!
//! - [`engine`]：运行入口、线程与动作调度
//! - [`executor`]：单个步骤的执行

pub mod engine;
pub mod executor;

pub use engine::{
    Callbacks, CollectCallback, EventCallback, MetaCallback, RunContext, RunOptions, ScriptRunner,
};
