//! 集成测试共用的拦截器、错误类型与激活器装配。

use std::{error::Error, fmt, sync::Arc, time::Duration};

use spark_aspect::{
    AggregateFault, BoxError, CallContext, Interceptor, InterceptorPipelineBuilder, Next,
    PipelineActivator, PipelineBuilder, PipelineChain, PipelineOutcome, ReturnValue, async_trait,
    runner::{BlockingStrategy, DetachedBlockingRunner},
    test_stubs::{RecordingContextFactory, yield_once},
};

pub type TestActivator = PipelineActivator<
    Arc<RecordingContextFactory>,
    InterceptorPipelineBuilder,
    DetachedBlockingRunner,
>;

/// 以记录型工厂装配激活器，返回工厂句柄供断言。
pub fn activator(
    builder: InterceptorPipelineBuilder,
) -> (Arc<RecordingContextFactory>, TestActivator) {
    activator_with(builder, BlockingStrategy::Auto)
}

pub fn activator_with(
    builder: InterceptorPipelineBuilder,
    strategy: BlockingStrategy,
) -> (Arc<RecordingContextFactory>, TestActivator) {
    let factory = RecordingContextFactory::shared();
    let activator = PipelineActivator::new(
        Arc::clone(&factory),
        builder,
        DetachedBlockingRunner::new(strategy),
    );
    (factory, activator)
}

/// 构建管线总是失败的构建器。
pub struct BrokenBuilder;

impl PipelineBuilder for BrokenBuilder {
    fn build(&self, _ctx: &CallContext) -> Result<PipelineChain, BoxError> {
        Err(Box::new(InvalidOperation("no pipeline")))
    }
}

/// 以 [`BrokenBuilder`] 装配激活器。
pub fn broken_activator() -> (
    Arc<RecordingContextFactory>,
    PipelineActivator<Arc<RecordingContextFactory>, BrokenBuilder, DetachedBlockingRunner>,
) {
    let factory = RecordingContextFactory::shared();
    let activator = PipelineActivator::new(
        Arc::clone(&factory),
        BrokenBuilder,
        DetachedBlockingRunner::default(),
    );
    (factory, activator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOperation(pub &'static str);

impl fmt::Display for InvalidOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for InvalidOperation {}

/// 先让出一次执行权，使管线首次轮询必然挂起。
pub struct Yield;

#[async_trait]
impl Interceptor for Yield {
    async fn invoke(&self, ctx: &mut CallContext, next: Next<'_>) -> PipelineOutcome {
        yield_once().await;
        next.run(ctx).await
    }
}

/// 经 Tokio 计时器休眠后继续，要求驱动方提供反应器。
pub struct Sleep;

#[async_trait]
impl Interceptor for Sleep {
    async fn invoke(&self, ctx: &mut CallContext, next: Next<'_>) -> PipelineOutcome {
        tokio::time::sleep(Duration::from_millis(1)).await;
        next.run(ctx).await
    }
}

/// 不调用后续管线，直接失败。
pub struct Fail(pub &'static str);

#[async_trait]
impl Interceptor for Fail {
    async fn invoke(&self, _ctx: &mut CallContext, _next: Next<'_>) -> PipelineOutcome {
        Err(Box::new(InvalidOperation(self.0)))
    }
}

/// 以聚合故障结束，原因个数等于 `messages` 长度。
pub struct FailAggregated(pub &'static [&'static str]);

#[async_trait]
impl Interceptor for FailAggregated {
    async fn invoke(&self, _ctx: &mut CallContext, _next: Next<'_>) -> PipelineOutcome {
        let causes = self
            .0
            .iter()
            .map(|message| Box::new(InvalidOperation(*message)) as BoxError)
            .collect();
        Err(Box::new(AggregateFault::new(causes)))
    }
}

/// 短路并写入固定返回值。
pub struct Respond<T>(pub T);

#[async_trait]
impl<T> Interceptor for Respond<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn invoke(&self, ctx: &mut CallContext, _next: Next<'_>) -> PipelineOutcome {
        ctx.set_return_value(ReturnValue::new(self.0.clone()));
        Ok(())
    }
}

/// 执行后续管线后丢弃返回值。
pub struct Discard;

#[async_trait]
impl Interceptor for Discard {
    async fn invoke(&self, ctx: &mut CallContext, next: Next<'_>) -> PipelineOutcome {
        next.run(ctx).await?;
        ctx.take_return_value();
        Ok(())
    }
}

/// 执行时立即 panic。
pub struct Explode;

#[async_trait]
impl Interceptor for Explode {
    async fn invoke(&self, _ctx: &mut CallContext, _next: Next<'_>) -> PipelineOutcome {
        panic!("interceptor exploded")
    }
}
