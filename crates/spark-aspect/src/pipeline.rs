//! 拦截器管线：按注册顺序包裹目标方法的单次执行链。
//!
//! # 设计背景（Why）
//! - 横切逻辑（审计、鉴权、重试、缓存）以 [`Interceptor`] 表达，采用“下一步”模式：
//!   拦截器在调用 [`Next::run`] 前后各自插入逻辑，也可以不调用而直接写入返回值实现短路；
//! - 管线的执行面总是异步的，即便目标方法本身是同步的；同步入口再由阻塞执行器收敛。
//!
//! # 契约说明（What）
//! - [`PipelineBuilder::build`] 对上下文只读，为每次调用生成一条 [`PipelineChain`]；
//! - [`PipelineChain::run`] 消费链本身，保证同一条链不会被执行两次；
//! - 链执行结束时，结果已写入上下文的返回值槽位，故障则以 `Err` 返回。
//!
//! # 风险提示（Trade-offs）
//! - 拦截器按注册顺序排列（先注册者在最外层），不做发现、优先级或拓扑排序。

use core::{any::type_name, fmt};
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    context::CallContext,
    future::{BoxError, BoxFuture},
    request::MethodDescriptor,
};

/// 管线执行结果：结果本身位于上下文中，此处只携带故障。
pub type PipelineOutcome = Result<(), BoxError>;

/// 围绕目标方法执行的横切逻辑单元。
///
/// # 契约说明（What）
/// - `invoke` 可读写上下文（参数、返回值、附加数据），并决定是否调用 `next`；
/// - 返回 `Err` 即中止整条管线，故障原样交给激活器；
/// - 实例在并发调用间共享，需自行保证内部状态线程安全。
///
/// # 示例
/// ```
/// use spark_aspect::{async_trait, context::CallContext, future::BoxError, pipeline::{Interceptor, Next}};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Interceptor for Audit {
///     async fn invoke(&self, ctx: &mut CallContext, next: Next<'_>) -> Result<(), BoxError> {
///         ctx.insert_extension("audit.seen", true);
///         next.run(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// 诊断用名称，默认取实现类型名。
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// 执行本环节逻辑。
    async fn invoke(&self, ctx: &mut CallContext, next: Next<'_>) -> PipelineOutcome;
}

/// 管线中尚未执行的部分。
///
/// 剩余拦截器为空时，`run` 调用目标方法。
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    /// 执行剩余管线。
    pub fn run<'c>(self, ctx: &'c mut CallContext) -> BoxFuture<'c, PipelineOutcome>
    where
        'a: 'c,
    {
        match self.remaining.split_first() {
            Some((head, tail)) => head.invoke(ctx, Next { remaining: tail }),
            None => Box::pin(async move { ctx.invoke_target() }),
        }
    }

    /// 剩余拦截器个数，不含目标方法。
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

/// 为单次调用构建的一次性执行链。
pub struct PipelineChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl PipelineChain {
    /// 以有序拦截器构造，首个元素位于最外层。
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// 不含拦截器、直接调用目标方法的链。
    pub fn direct() -> Self {
        Self::new(Vec::new())
    }

    /// 拦截器个数。
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// 是否不含拦截器。
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// 拦截器名称，按执行顺序排列。
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.interceptors.iter().map(|interceptor| interceptor.name())
    }

    /// 执行整条链，消费自身。
    ///
    /// 返回的 Future 在首次轮询前不会执行任何拦截器。
    pub fn run(self, ctx: &mut CallContext) -> BoxFuture<'_, PipelineOutcome> {
        Box::pin(async move {
            let chain = self;
            Next {
                remaining: &chain.interceptors,
            }
            .run(ctx)
            .await
        })
    }
}

impl fmt::Debug for PipelineChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// 管线构建契约。
///
/// # 契约说明（What）
/// - 对上下文只读，不得借构建过程改写参数或返回值；
/// - 构建失败返回的错误与管线故障同等对待，原样交给调用方。
pub trait PipelineBuilder: Send + Sync {
    /// 为当前调用构建执行链。
    fn build(&self, ctx: &CallContext) -> Result<PipelineChain, BoxError>;
}

impl<T> PipelineBuilder for Arc<T>
where
    T: PipelineBuilder + ?Sized,
{
    fn build(&self, ctx: &CallContext) -> Result<PipelineChain, BoxError> {
        (**self).build(ctx)
    }
}

type MethodPredicate = Arc<dyn Fn(&MethodDescriptor) -> bool + Send + Sync>;

struct Registration {
    interceptor: Arc<dyn Interceptor>,
    applies_to: Option<MethodPredicate>,
}

/// 基于注册表的管线构建器。
///
/// # 执行逻辑（How）
/// - 注册表在构建器生命周期内不变，`build` 仅按方法过滤并克隆 `Arc`；
/// - 无谓词的注册对所有方法生效；带谓词的注册仅在谓词为真时进入执行链。
#[derive(Default)]
pub struct InterceptorPipelineBuilder {
    registrations: Vec<Registration>,
}

impl InterceptorPipelineBuilder {
    /// 空注册表，构建出的链直接调用目标方法。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加对所有方法生效的拦截器。
    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor,
    {
        self.register(Arc::new(interceptor), None);
        self
    }

    /// 追加仅对满足谓词的方法生效的拦截器。
    pub fn with_filtered<I, P>(mut self, interceptor: I, applies_to: P) -> Self
    where
        I: Interceptor,
        P: Fn(&MethodDescriptor) -> bool + Send + Sync + 'static,
    {
        self.register(Arc::new(interceptor), Some(Arc::new(applies_to)));
        self
    }

    /// 追加共享的拦截器实例。
    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.register(interceptor, None);
        self
    }

    fn register(&mut self, interceptor: Arc<dyn Interceptor>, applies_to: Option<MethodPredicate>) {
        self.registrations.push(Registration {
            interceptor,
            applies_to,
        });
    }

    /// 已注册的拦截器个数。
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// 是否尚未注册任何拦截器。
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl PipelineBuilder for InterceptorPipelineBuilder {
    fn build(&self, ctx: &CallContext) -> Result<PipelineChain, BoxError> {
        let method = ctx.method();
        let interceptors = self
            .registrations
            .iter()
            .filter(|registration| {
                registration
                    .applies_to
                    .as_ref()
                    .is_none_or(|applies_to| applies_to(method))
            })
            .map(|registration| Arc::clone(&registration.interceptor))
            .collect();
        Ok(PipelineChain::new(interceptors))
    }
}

impl fmt::Debug for InterceptorPipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.registrations
                    .iter()
                    .map(|registration| registration.interceptor.name()),
            )
            .finish()
    }
}
