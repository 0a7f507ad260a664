//! 调用上下文的创建、回收与作用域租借。
//!
//! # 设计背景（Why）
//! - 每次被代理调用都需要一份独占的 [`CallContext`]；高频调用下参数向量与附加数据表的分配不容忽视，
//!   因此默认工厂会回收这部分堆存储；
//! - 激活器存在多条退出路径（正常返回、`?` 提前返回、panic 展开、异步调用被丢弃），
//!   [`ContextLease`] 以 `Drop` 保证上下文在每条路径上恰好释放一次。
//!
//! # 契约说明（What）
//! - [`ContextFactory::release`] 按值接收上下文，同一上下文在类型层面无法被释放两次；
//! - 工厂必须支持多个在途调用并发 `create`/`release`，且不得在上下文仍在途时复用其身份。

use core::{
    fmt,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    config::ContextPoolConfig,
    context::{CallContext, ContextBuffers, ContextId},
    error::AspectError,
    observability::keys,
    request::InvocationRequest,
};

/// 上下文工厂契约。
///
/// # 契约说明（What）
/// - `create`：为一次调用分配全新上下文，可被多个线程同时调用；
/// - `release`：交还上下文，每个上下文恰好调用一次（由所有权保证，幂等性不作要求）。
pub trait ContextFactory: Send + Sync {
    /// 为调用创建上下文。
    fn create(&self, request: &InvocationRequest) -> CallContext;

    /// 交还上下文。
    fn release(&self, context: CallContext);
}

impl<T> ContextFactory for Arc<T>
where
    T: ContextFactory + ?Sized,
{
    fn create(&self, request: &InvocationRequest) -> CallContext {
        (**self).create(request)
    }

    fn release(&self, context: CallContext) {
        (**self).release(context)
    }
}

/// 工厂计数快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 累计创建的上下文数。
    pub created: u64,
    /// 累计释放的上下文数。
    pub released: u64,
    /// 创建时复用了池中缓冲的次数。
    pub recycled: u64,
    /// 当前池中空闲缓冲数。
    pub pooled: usize,
}

impl PoolStats {
    /// 尚未释放的上下文数。
    pub fn in_flight(&self) -> u64 {
        self.created.saturating_sub(self.released)
    }
}

/// 回收堆缓冲的默认上下文工厂。
///
/// # 逻辑解析（How）
/// - 身份由原子计数器单调分配，永不复用；
/// - 释放时把上下文拆回 [`ContextBuffers`]，若池未满则放回池中，否则直接丢弃；
/// - 池由 `parking_lot::Mutex` 保护，临界区只包含一次 `push`/`pop`。
///
/// # 风险提示（Trade-offs）
/// - 池容量按缓冲个数计，而非字节数；若个别调用的参数极多，回收后的向量会保留较大容量。
pub struct PooledContextFactory {
    pool: Mutex<Vec<ContextBuffers>>,
    capacity: usize,
    next_id: AtomicU64,
    created: AtomicU64,
    released: AtomicU64,
    recycled: AtomicU64,
}

impl PooledContextFactory {
    /// 以给定池容量构造，不预分配。
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            released: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
        }
    }

    /// 按配置构造，并预分配 `preallocate` 份缓冲。
    pub fn with_config(config: &ContextPoolConfig) -> Self {
        let factory = Self::new(config.capacity);
        {
            let mut pool = factory.pool.lock();
            let count = config.preallocate.min(config.capacity);
            pool.extend((0..count).map(|_| ContextBuffers::with_capacity(4, 0)));
        }
        factory
    }

    /// 池容量。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 计数快照。各计数独立读取，并发下仅保证各自单调。
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Acquire),
            released: self.released.load(Ordering::Acquire),
            recycled: self.recycled.load(Ordering::Relaxed),
            pooled: self.pool.lock().len(),
        }
    }
}

impl Default for PooledContextFactory {
    fn default() -> Self {
        Self::with_config(&ContextPoolConfig::default())
    }
}

impl ContextFactory for PooledContextFactory {
    fn create(&self, request: &InvocationRequest) -> CallContext {
        let id = ContextId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let buffers = self.pool.lock().pop();
        let context = match buffers {
            Some(buffers) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
                CallContext::with_buffers(id, request, buffers)
            }
            None => CallContext::new(id, request),
        };
        self.created.fetch_add(1, Ordering::AcqRel);
        trace!(
            target: keys::TARGET,
            {
                aspect.context_id = id.get(),
                aspect.method = %request.method(),
            },
            "call context created"
        );
        context
    }

    fn release(&self, context: CallContext) {
        let id = context.id();
        let state = context.state();
        let buffers = context.into_buffers();
        {
            let mut pool = self.pool.lock();
            if pool.len() < self.capacity {
                pool.push(buffers);
            }
        }
        self.released.fetch_add(1, Ordering::AcqRel);
        trace!(
            target: keys::TARGET,
            {
                aspect.context_id = id.get(),
                aspect.state = state.as_str(),
            },
            "call context released"
        );
    }
}

impl fmt::Debug for PooledContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledContextFactory")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// 作用域内独占的上下文租借。
///
/// # 设计背景（Why）
/// - 激活器的每个入口都要在任意退出路径上释放上下文；与其在每个返回点手动调用 `release`，
///   不如把释放放进 `Drop`，使 `?`、panic 展开与异步调用被丢弃都走同一条路径。
///
/// # 契约说明（What）
/// - `acquire` 立即向工厂申请上下文；租借期间通过 `Deref`/`DerefMut` 访问；
/// - `settle` 记录终态（`Completed` 或 `Faulted`），不释放；
/// - `Drop` 把上下文交还工厂，恰好一次。未 `settle` 即被丢弃时，工厂看到的是最后所处的状态。
pub struct ContextLease<'f, F>
where
    F: ContextFactory + ?Sized,
{
    factory: &'f F,
    context: Option<CallContext>,
}

impl<'f, F> ContextLease<'f, F>
where
    F: ContextFactory + ?Sized,
{
    /// 向工厂申请上下文。
    pub fn acquire(factory: &'f F, request: &InvocationRequest) -> Self {
        Self {
            factory,
            context: Some(factory.create(request)),
        }
    }

    /// 按调用结果记录终态。
    pub fn settle<R>(&mut self, result: &Result<R, AspectError>) {
        match result {
            Ok(_) => self.mark_completed(),
            Err(error) => self.mark_faulted(error),
        }
    }
}

impl<F> Deref for ContextLease<'_, F>
where
    F: ContextFactory + ?Sized,
{
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        match &self.context {
            Some(context) => context,
            None => unreachable!("context lease used after release"),
        }
    }
}

impl<F> DerefMut for ContextLease<'_, F>
where
    F: ContextFactory + ?Sized,
{
    fn deref_mut(&mut self) -> &mut CallContext {
        match &mut self.context {
            Some(context) => context,
            None => unreachable!("context lease used after release"),
        }
    }
}

impl<F> Drop for ContextLease<'_, F>
where
    F: ContextFactory + ?Sized,
{
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.factory.release(context);
        }
    }
}
