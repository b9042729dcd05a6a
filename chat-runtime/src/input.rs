//! # Input 模块
//!
//! 单槽输入同步原语：解释器挂起等待一个外部提交的值。
//!
//! ## 设计说明
//!
//! - 同一时刻最多只有一个等待者，第二次注册是使用错误
//! - 没有等待者时提交的值直接丢弃，不做缓存
//! - 等待没有超时，等待者会一直挂起直到有值提交或被取消

use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::error::RuntimeError;

/// 输入同步器
#[derive(Debug, Default)]
pub struct InputSynchronizer {
    pending: Mutex<Option<oneshot::Sender<Value>>>,
}

impl InputSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 注册等待者
    ///
    /// 已有未完成的等待者时返回 [`RuntimeError::InputAlreadyPending`]。
    pub fn register(&self) -> Result<oneshot::Receiver<Value>, RuntimeError> {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(RuntimeError::InputAlreadyPending);
        }
        let (tx, rx) = oneshot::channel();
        *pending = Some(tx);
        Ok(rx)
    }

    /// 提交一个值
    ///
    /// 返回值是否被某个等待者接收。
    pub fn report(&self, value: Value) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// 是否有等待者
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// 取消当前等待者，等待方会收到中断
    pub fn cancel(&self) {
        self.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_report_resolves_waiter() {
        let sync = InputSynchronizer::new();
        let rx = sync.register().unwrap();
        assert!(sync.is_pending());

        assert!(sync.report(json!("hello")));
        assert_eq!(rx.await.unwrap(), json!("hello"));
        assert!(!sync.is_pending());
    }

    #[test]
    fn test_report_without_waiter_is_dropped() {
        let sync = InputSynchronizer::new();
        assert!(!sync.report(json!("lost")));

        // 之后注册的等待者不会收到先前的值
        let mut rx = sync.register().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_second_register_is_error() {
        let sync = InputSynchronizer::new();
        let _rx = sync.register().unwrap();
        assert!(matches!(
            sync.register(),
            Err(RuntimeError::InputAlreadyPending)
        ));
    }

    #[test]
    fn test_register_after_receiver_dropped() {
        let sync = InputSynchronizer::new();
        drop(sync.register().unwrap());
        assert!(!sync.is_pending());
        assert!(sync.register().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_waiter() {
        let sync = InputSynchronizer::new();
        let rx = sync.register().unwrap();
        sync.cancel();
        assert!(rx.await.is_err());
    }
}
