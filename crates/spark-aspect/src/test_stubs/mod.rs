//! 激活器测试桩：记录型上下文工厂与常用调用描述构造器。
//!
//! # 设计定位（Why）
//! - 生命周期断言（“每个上下文恰好释放一次”“释放时处于何种终态”）需要观察工厂的每次 `create`/`release`，
//!   各测试文件不必重复编写记录逻辑；
//! - 构造 [`InvocationRequest`] 需要实例、方法标识与调用器三件套，测试只关心“目标方法返回什么”，
//!   因此集中提供按返回形态划分的构造器。
//!
//! # 使用方式（How）
//! - `RecordingContextFactory::new()` 可直接交给 [`PipelineActivator::new`](crate::activator::PipelineActivator::new)，
//!   测试结束后读取 [`RecordingContextFactory::releases`] 断言；
//! - [`requests`] 下的函数按形态返回可直接调用的请求。
//!
//! # 风险与权衡（Trade-offs）
//! - 记录型工厂在每次调用上多一次加锁，仅用于测试或示例环境。

use core::task::Poll;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    context::{CallContext, ContextId, FaultRecord, InvocationState},
    factory::{ContextFactory, PoolStats, PooledContextFactory},
    request::InvocationRequest,
};

/// 一次释放的观测记录。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseRecord {
    /// 被释放的上下文。
    pub id: ContextId,
    /// 释放时的状态。
    pub state: InvocationState,
    /// 故障摘要，仅在 `Faulted` 时存在。
    pub fault: Option<FaultRecord>,
}

#[derive(Default)]
struct Journal {
    created: Vec<ContextId>,
    released: Vec<ReleaseRecord>,
}

/// 记录每次创建与释放的上下文工厂，实际分配委托给 [`PooledContextFactory`]。
#[derive(Default)]
pub struct RecordingContextFactory {
    inner: PooledContextFactory,
    journal: Mutex<Journal>,
}

impl RecordingContextFactory {
    /// 以默认池参数构造。
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造并包上 `Arc`，便于测试同时持有工厂与激活器。
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 按创建顺序列出的上下文身份。
    pub fn created(&self) -> Vec<ContextId> {
        self.journal.lock().created.clone()
    }

    /// 按释放顺序列出的释放记录。
    pub fn releases(&self) -> Vec<ReleaseRecord> {
        self.journal.lock().released.clone()
    }

    /// 最近一次释放记录。
    pub fn last_release(&self) -> Option<ReleaseRecord> {
        self.journal.lock().released.last().cloned()
    }

    /// 指定上下文被释放的次数。
    pub fn release_count(&self, id: ContextId) -> usize {
        self.journal
            .lock()
            .released
            .iter()
            .filter(|record| record.id == id)
            .count()
    }

    /// 是否每个创建过的上下文都恰好释放了一次。
    pub fn is_balanced(&self) -> bool {
        let journal = self.journal.lock();
        journal.created.len() == journal.released.len()
            && journal.created.iter().all(|id| {
                journal
                    .released
                    .iter()
                    .filter(|record| record.id == *id)
                    .count()
                    == 1
            })
    }

    /// 底层池的计数快照。
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl ContextFactory for RecordingContextFactory {
    fn create(&self, request: &InvocationRequest) -> CallContext {
        let context = self.inner.create(request);
        self.journal.lock().created.push(context.id());
        context
    }

    fn release(&self, context: CallContext) {
        let record = ReleaseRecord {
            id: context.id(),
            state: context.state(),
            fault: context.fault().cloned(),
        };
        self.journal.lock().released.push(record);
        self.inner.release(context);
    }
}

/// 让出一次执行权并立即请求重新调度。
///
/// 用于制造“首次轮询必然挂起”的管线，从而覆盖阻塞执行器路径。
pub async fn yield_once() {
    let mut yielded = false;
    futures::future::poll_fn(move |cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

/// 按返回形态构造调用描述。
pub mod requests {
    use core::any::Any;
    use std::sync::Arc;

    use crate::{
        context::ReturnValue,
        future::{BoxError, ValueFuture},
        request::{
            Arguments, InvocationRequest, MethodDescriptor, MethodInvoker, ReturnShape,
            invoker_fn,
        },
    };

    /// 测试使用的服务名。
    pub const SERVICE: &str = "TestService";

    /// 以任意调用器构造。
    pub fn with_invoker(
        method: &'static str,
        shape: ReturnShape,
        invoker: Arc<dyn MethodInvoker>,
    ) -> InvocationRequest {
        InvocationRequest::new(
            Arc::new(()),
            MethodDescriptor::new(SERVICE, method, shape),
            invoker,
        )
    }

    /// 目标方法同步返回 `value` 的克隆。
    pub fn returning<T>(method: &'static str, value: T) -> InvocationRequest
    where
        T: Clone + Any + Send + Sync,
    {
        with_invoker(
            method,
            ReturnShape::Value,
            invoker_fn(move |_, _| Ok(ReturnValue::new(value.clone()))),
        )
    }

    /// 目标方法不应被执行，一旦执行即失败。用于验证拦截器短路。
    pub fn short_circuited(method: &'static str, shape: ReturnShape) -> InvocationRequest {
        with_invoker(method, shape, Arc::new(UnreachableTarget))
    }

    /// 目标方法同步失败，每次调用由 `fault` 生成新的故障。
    pub fn failing<E, G>(method: &'static str, shape: ReturnShape, fault: G) -> InvocationRequest
    where
        E: Into<BoxError>,
        G: Fn() -> E + Send + Sync + 'static,
    {
        with_invoker(method, shape, invoker_fn(move |_, _| Err(fault().into())))
    }

    /// 目标方法返回 `AsyncReturn<T>`，挂起一次后以 `value` 完成。
    pub fn future_of<T>(method: &'static str, value: T) -> InvocationRequest
    where
        T: Clone + Send + Sync + 'static,
    {
        with_invoker(
            method,
            ReturnShape::Future,
            invoker_fn(move |_, _| {
                let value = value.clone();
                Ok(ReturnValue::future(async move {
                    super::yield_once().await;
                    Ok::<_, BoxError>(value)
                }))
            }),
        )
    }

    /// 目标方法返回 `AsyncReturn<()>`。
    pub fn void_future(method: &'static str) -> InvocationRequest {
        with_invoker(
            method,
            ReturnShape::Future,
            invoker_fn(|_, _| Ok(ReturnValue::future(async { Ok::<_, BoxError>(()) }))),
        )
    }

    /// 目标方法返回已就绪的 `ValueFuture<T>`。
    pub fn value_future_of<T>(method: &'static str, value: T) -> InvocationRequest
    where
        T: Clone + Send + Sync + 'static,
    {
        with_invoker(
            method,
            ReturnShape::ValueFuture,
            invoker_fn(move |_, _| {
                Ok(ReturnValue::value_future(ValueFuture::ready(value.clone())))
            }),
        )
    }

    struct UnreachableTarget;

    impl MethodInvoker for UnreachableTarget {
        fn invoke(
            &self,
            _instance: &(dyn Any + Send + Sync),
            _arguments: &Arguments,
        ) -> Result<ReturnValue, BoxError> {
            Err("target method was not expected to run".into())
        }
    }
}
