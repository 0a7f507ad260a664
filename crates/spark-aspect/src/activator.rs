//! 调用激活器：创建上下文、执行管线，并把结果收敛为调用点声明的返回形态。
//!
//! # 设计背景（Why）
//! - 代理层为每个被拦截的方法生成调用点，调用点按方法签名选择三个入口之一：
//!   同步值 [`AspectActivator::invoke`]、`Task` 式 [`AspectActivator::invoke_future`]、
//!   `ValueTask` 式 [`AspectActivator::invoke_value_future`]；
//! - 管线的执行面总是异步的。同步入口先在调用线程上试探轮询一次，已完成即直接取值，
//!   仍挂起才交给 [`BlockingRunner`]，这样纯同步管线不会产生任何阻塞开销。
//!
//! # 契约说明（What）
//! - 每次调用独占一份上下文，并在任意退出路径上恰好释放一次；
//! - 管线故障剥离一层单原因聚合后原样交给调用方；
//! - 返回值类型与入口期望不符时返回 [`AspectError::TypeMismatch`]，同时记录 `error` 级日志。
//!
//! # 执行逻辑（How）
//! 1. 向工厂租借上下文，进入 `aspect.invoke` span；
//! 2. 构建并执行管线（同步入口：试探轮询 → 阻塞执行器；异步入口：直接等待）；
//! 3. 从返回值槽位取出结果并按入口期望的形态还原；
//! 4. 记录终态，租借结束时释放上下文。

use core::{
    any::{Any, type_name},
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;
use tracing::{Instrument, Level, Span, debug, error, span, warn};

use crate::{
    config::{ActivatorConfig, ConfigError},
    context::CallContext,
    error::{AspectError, unwrap_origin},
    factory::{ContextFactory, ContextLease, PooledContextFactory},
    future::{AsyncReturn, BoxFuture, ValueFuture},
    observability::keys,
    pipeline::{InterceptorPipelineBuilder, PipelineBuilder},
    request::{InvocationRequest, MethodDescriptor, ReturnShape},
    runner::{BlockingRunner, DetachedBlockingRunner},
};

/// 返回值槽位为空时在不匹配诊断中使用的类型描述。
pub const EMPTY_RETURN: &str = "<empty>";

/// 激活器契约。
///
/// # 契约说明（What）
/// - `invoke`：同步取得 `R`。管线挂起时阻塞当前线程，但不会与调用方所处的调度环境互相等待；
/// - `invoke_future`：产出值应为 `AsyncReturn<R>`，等待后透传其结果；产出值为 `AsyncReturn<()>`
///   时等待完成后返回 `R::default()`；两者皆非则返回类型不匹配；
/// - `invoke_value_future`：产出值应为 `ValueFuture<R>`，等待后透传其结果；
/// - 异步入口在被调用时即创建上下文；返回的 Future 若在完成前被丢弃，上下文随之释放。
pub trait AspectActivator: Send + Sync {
    /// 同步入口。
    fn invoke<R>(&self, request: InvocationRequest) -> Result<R, AspectError>
    where
        R: Any;

    /// `Task<R>` 式异步入口。
    fn invoke_future<R>(&self, request: InvocationRequest) -> BoxFuture<'_, Result<R, AspectError>>
    where
        R: Any + Default + Send;

    /// `ValueTask<R>` 式异步入口。
    fn invoke_value_future<R>(
        &self,
        request: InvocationRequest,
    ) -> BoxFuture<'_, Result<R, AspectError>>
    where
        R: Any + Send;
}

/// 基于上下文工厂、管线构建器与阻塞执行器的激活器。
///
/// 三个协作者都在调用间共享，激活器本身不保存任何逐调用状态。
#[derive(Debug, Default)]
pub struct PipelineActivator<
    F = PooledContextFactory,
    B = InterceptorPipelineBuilder,
    Rn = DetachedBlockingRunner,
> {
    factory: F,
    builder: B,
    runner: Rn,
}

impl<F, B, Rn> PipelineActivator<F, B, Rn>
where
    F: ContextFactory,
    B: PipelineBuilder,
    Rn: BlockingRunner,
{
    /// 以给定协作者构造。
    pub fn new(factory: F, builder: B, runner: Rn) -> Self {
        Self {
            factory,
            builder,
            runner,
        }
    }

    /// 上下文工厂。
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// 管线构建器。
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// 阻塞执行器。
    pub fn runner(&self) -> &Rn {
        &self.runner
    }

    /// 构建并执行管线，挂起时交给阻塞执行器。
    fn run_blocking(&self, ctx: &mut CallContext) -> Result<(), AspectError> {
        let chain = self.builder.build(ctx).map_err(unwrap_origin)?;
        let mut pending = chain.run(ctx);
        if self.runner.inline_poll_allowed() {
            let mut cx = Context::from_waker(noop_waker_ref());
            if let Poll::Ready(outcome) = pending.as_mut().poll(&mut cx) {
                return outcome.map_err(unwrap_origin);
            }
        }
        self.runner.run(pending).map_err(unwrap_origin)
    }

    /// 构建并等待管线。
    async fn run_async(&self, ctx: &mut CallContext) -> Result<(), AspectError> {
        let chain = self.builder.build(ctx).map_err(unwrap_origin)?;
        chain.run(ctx).await.map_err(unwrap_origin)
    }
}

impl<B> PipelineActivator<PooledContextFactory, B, DetachedBlockingRunner>
where
    B: PipelineBuilder,
{
    /// 以默认工厂与默认阻塞执行器构造。
    pub fn with_builder(builder: B) -> Self {
        Self::new(
            PooledContextFactory::default(),
            builder,
            DetachedBlockingRunner::default(),
        )
    }

    /// 按配置构造默认协作者，配置先经校验。
    pub fn from_config(config: &ActivatorConfig, builder: B) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            PooledContextFactory::with_config(&config.context_pool),
            builder,
            DetachedBlockingRunner::new(config.blocking.strategy),
        ))
    }
}

impl<F, B, Rn> AspectActivator for PipelineActivator<F, B, Rn>
where
    F: ContextFactory,
    B: PipelineBuilder,
    Rn: BlockingRunner,
{
    fn invoke<R>(&self, request: InvocationRequest) -> Result<R, AspectError>
    where
        R: Any,
    {
        let mut lease = ContextLease::acquire(&self.factory, &request);
        let span = invoke_span(&lease, ReturnShape::Value);
        let _entered = span.enter();

        lease.mark_running();
        let result = self
            .run_blocking(&mut lease)
            .and_then(|()| take_value::<R>(&mut lease));
        lease.settle(&result);
        observe_fault(&result);
        result
    }

    fn invoke_future<R>(&self, request: InvocationRequest) -> BoxFuture<'_, Result<R, AspectError>>
    where
        R: Any + Default + Send,
    {
        let mut lease = ContextLease::acquire(&self.factory, &request);
        let span = invoke_span(&lease, ReturnShape::Future);
        Box::pin(
            async move {
                lease.mark_running();
                let result = match self.run_async(&mut lease).await {
                    Ok(()) => await_future::<R>(&mut lease).await,
                    Err(error) => Err(error),
                };
                lease.settle(&result);
                observe_fault(&result);
                result
            }
            .instrument(span),
        )
    }

    fn invoke_value_future<R>(
        &self,
        request: InvocationRequest,
    ) -> BoxFuture<'_, Result<R, AspectError>>
    where
        R: Any + Send,
    {
        let mut lease = ContextLease::acquire(&self.factory, &request);
        let span = invoke_span(&lease, ReturnShape::ValueFuture);
        Box::pin(
            async move {
                lease.mark_running();
                let result = match self.run_async(&mut lease).await {
                    Ok(()) => await_value_future::<R>(&mut lease).await,
                    Err(error) => Err(error),
                };
                lease.settle(&result);
                observe_fault(&result);
                result
            }
            .instrument(span),
        )
    }
}

fn invoke_span(ctx: &CallContext, shape: ReturnShape) -> Span {
    span!(
        target: keys::TARGET,
        Level::DEBUG,
        keys::SPAN_INVOKE,
        aspect.method = %ctx.method(),
        aspect.shape = shape.as_str(),
        aspect.context_id = ctx.id().get()
    )
}

/// 同步入口的取值：槽位为空仅在 `R = ()` 时视为成功。
fn take_value<R>(ctx: &mut CallContext) -> Result<R, AspectError>
where
    R: Any,
{
    match ctx.take_return_value() {
        Some(value) => value
            .downcast::<R>()
            .map_err(|value| type_mismatch(ctx.method(), type_name::<R>(), value.type_name())),
        None => (Box::new(()) as Box<dyn Any>)
            .downcast::<R>()
            .map(|unit| *unit)
            .map_err(|_| type_mismatch(ctx.method(), type_name::<R>(), EMPTY_RETURN)),
    }
}

async fn await_future<R>(ctx: &mut CallContext) -> Result<R, AspectError>
where
    R: Any + Default + Send,
{
    let expected = type_name::<AsyncReturn<R>>();
    let Some(value) = ctx.take_return_value() else {
        return Err(type_mismatch(ctx.method(), expected, EMPTY_RETURN));
    };
    let value = match value.downcast::<AsyncReturn<R>>() {
        Ok(future) => return future.await.map_err(unwrap_origin),
        Err(value) => value,
    };
    match value.downcast::<AsyncReturn<()>>() {
        Ok(future) => {
            future.await.map_err(unwrap_origin)?;
            Ok(R::default())
        }
        Err(value) => Err(type_mismatch(ctx.method(), expected, value.type_name())),
    }
}

async fn await_value_future<R>(ctx: &mut CallContext) -> Result<R, AspectError>
where
    R: Any + Send,
{
    let expected = type_name::<ValueFuture<R>>();
    let Some(value) = ctx.take_return_value() else {
        return Err(type_mismatch(ctx.method(), expected, EMPTY_RETURN));
    };
    match value.downcast::<ValueFuture<R>>() {
        Ok(future) => future.await.map_err(unwrap_origin),
        Err(value) => Err(type_mismatch(ctx.method(), expected, value.type_name())),
    }
}

fn type_mismatch(
    method: &MethodDescriptor,
    expected: &'static str,
    actual: &'static str,
) -> AspectError {
    error!(
        target: keys::TARGET,
        {
            aspect.method = %method,
            aspect.expected_type = expected,
            aspect.actual_type = actual,
        },
        "returned value does not match the declared shape"
    );
    AspectError::type_mismatch(method, expected, actual)
}

fn observe_fault<R>(result: &Result<R, AspectError>) {
    match result {
        Err(AspectError::Aggregate(aggregate)) => warn!(
            target: keys::TARGET,
            {
                error.code = crate::error::codes::AGGREGATE_FAULT,
                aspect.fault_count = aggregate.len(),
            },
            "pipeline ended with several faults"
        ),
        Err(error @ AspectError::Fault(_)) => debug!(
            target: keys::TARGET,
            {
                error.code = error.code(),
                error = %error,
            },
            "pipeline fault propagated to caller"
        ),
        _ => {}
    }
}
