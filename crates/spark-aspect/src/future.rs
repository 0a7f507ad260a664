//! 拦截管线使用的 Future 形态。
//!
//! # 设计背景（Why）
//! - 代理层声明的返回形态只有三种：同步值、`Task` 式异步结果与 `ValueTask` 式值型异步结果；
//!   本模块为后两者给出统一的 Rust 表达，使 [`ReturnValue`](crate::context::ReturnValue)
//!   能够在运行期按类型辨认它们。
//! - 所有 Future 均要求 `Send`，以便阻塞执行器可以把挂起中的管线搬到辅助线程上驱动。

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::error::Error;

/// 对象安全的 `Send` Future 包装。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 管线内部流转的原始故障。
///
/// 保留 `Box<dyn Error>` 而非统一枚举，调用方才能通过 `downcast_ref` 取回拦截器或目标方法抛出的具体类型。
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// `Task<R>` 形态的异步返回值：目标方法返回后仍需等待才能得到 `R`。
///
/// 无结果的异步方法以 `AsyncReturn<()>` 表达。
pub type AsyncReturn<R> = BoxFuture<'static, Result<R, BoxError>>;

/// `ValueTask<R>` 形态的值型异步返回值。
///
/// # 契约说明（What）
/// - `Ready`：结果在目标方法返回时已经可用，不再额外分配 Future；
/// - `Pending`：结果仍在计算中，语义与 [`AsyncReturn`] 相同；
/// - 作为 Future 只能被完成一次，完成后再次轮询会 panic，与标准库对已完成 Future 的约定一致。
pub enum ValueFuture<R> {
    Ready(Option<Result<R, BoxError>>),
    Pending(AsyncReturn<R>),
}

impl<R> ValueFuture<R> {
    /// 以已就绪的值构造。
    pub fn ready(value: R) -> Self {
        ValueFuture::Ready(Some(Ok(value)))
    }

    /// 以已失败的结果构造。
    pub fn failed(error: impl Into<BoxError>) -> Self {
        ValueFuture::Ready(Some(Err(error.into())))
    }

    /// 以挂起中的计算构造。
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        ValueFuture::Pending(Box::pin(future))
    }

    /// 结果是否无需等待即可取得。
    pub fn is_ready(&self) -> bool {
        matches!(self, ValueFuture::Ready(Some(_)))
    }
}

// 结果值从不被结构化固定，`Pending` 分支内部已自带 `Pin<Box<_>>`。
impl<R> Unpin for ValueFuture<R> {}

impl<R> Future for ValueFuture<R> {
    type Output = Result<R, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            ValueFuture::Ready(slot) => match slot.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => panic!("`ValueFuture` polled after completion"),
            },
            ValueFuture::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl<R> core::fmt::Debug for ValueFuture<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ValueFuture::Ready(Some(Ok(_))) => f.write_str("ValueFuture::Ready(Ok(..))"),
            ValueFuture::Ready(Some(Err(err))) => write!(f, "ValueFuture::Ready(Err({err}))"),
            ValueFuture::Ready(None) => f.write_str("ValueFuture::Ready(<taken>)"),
            ValueFuture::Pending(_) => f.write_str("ValueFuture::Pending(..)"),
        }
    }
}
