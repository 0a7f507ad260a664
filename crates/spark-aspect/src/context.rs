//! 单次调用的可变状态：[`CallContext`] 及其返回值槽位。
//!
//! # 设计背景（Why）
//! - 拦截器之间唯一共享的可变对象就是调用上下文：参数可被改写、返回值由目标方法或短路的拦截器写入、
//!   附加数据在前后两段逻辑之间传递；
//! - 返回值的静态类型在这一层不可知（同步值、`AsyncReturn<R>` 或 `ValueFuture<R>`），
//!   因此以 [`ReturnValue`] 类型擦除存放，并记住实际类型名，供不匹配时报告。
//!
//! # 契约说明（What）
//! - 上下文由 [`ContextFactory`](crate::factory::ContextFactory) 创建，调用期间被激活器独占，
//!   结束时交还工厂；从不在并发调用间共享；
//! - 状态序列固定为 `Created → Running → {Completed | Faulted}`，交还工厂即视为 `Released`。
//!
//! # 风险提示（Trade-offs）
//! - `CallContext` 只实现 `Send`：返回值槽位可能持有非 `Sync` 的 Future，跨线程仅能移动或独占借用。

use core::{
    any::{Any, type_name},
    fmt,
    future::Future,
};
use std::{borrow::Cow, collections::HashMap, sync::Arc};

use crate::{
    error::AspectError,
    future::{AsyncReturn, BoxError, ValueFuture},
    request::{Arguments, Instance, InvocationRequest, MethodDescriptor, MethodInvoker},
};

/// 上下文身份。由工厂单调分配，同一工厂内永不复用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// 以原始数值构造。
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始数值。
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// 类型擦除的返回值。
///
/// # 契约说明（What）
/// - `new(value)` 存放同步值；`future(fut)` 存放 `AsyncReturn<R>`；`value_future(vf)` 存放 `ValueFuture<R>`；
/// - `type_name()` 返回存入时的具体类型名，用于类型不匹配诊断；
/// - `downcast::<T>()` 失败时原样退回，调用方可继续尝试其他形态。
pub struct ReturnValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl ReturnValue {
    /// 存放同步值。
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send,
    {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// 存放 `Task<R>` 形态的异步结果。无结果的异步方法使用 `R = ()`。
    pub fn future<R, F>(future: F) -> Self
    where
        R: Send + 'static,
        F: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        let future: AsyncReturn<R> = Box::pin(future);
        Self::new(future)
    }

    /// 存放 `ValueTask<R>` 形态的异步结果。
    pub fn value_future<R>(future: ValueFuture<R>) -> Self
    where
        R: Send + 'static,
    {
        Self::new(future)
    }

    /// 存入时的具体类型名。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 是否持有类型 `T`。
    pub fn is<T>(&self) -> bool
    where
        T: Any,
    {
        self.value.is::<T>()
    }

    /// 以具体类型借用。
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.value.downcast_ref::<T>()
    }

    /// 取出具体类型的值，失败时原样退回。
    pub fn downcast<T>(self) -> Result<T, Self>
    where
        T: Any,
    {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { value, type_name })
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 单次调用的状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvocationState {
    /// 工厂刚创建，管线尚未运行。
    Created,
    /// 管线正在执行。
    Running,
    /// 结果已被提取并交给调用方。
    Completed,
    /// 管线故障或返回形态不匹配。
    Faulted,
}

impl InvocationState {
    /// 稳定的小写标签，用于日志字段。
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Created => "created",
            InvocationState::Running => "running",
            InvocationState::Completed => "completed",
            InvocationState::Faulted => "faulted",
        }
    }

    /// 是否已到达终态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::Faulted)
    }
}

/// 调用以故障结束时留在上下文中的摘要，供释放侧的观察者读取。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultRecord {
    code: &'static str,
    message: String,
}

impl FaultRecord {
    /// 由激活器错误生成摘要。
    pub fn from_error(error: &AspectError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

type Extensions = HashMap<Cow<'static, str>, Box<dyn Any + Send + Sync>>;

/// 可在上下文之间复用的堆存储。
///
/// 回收型工厂在释放时保留参数向量与附加数据表的容量，下一次创建时直接复用。
#[derive(Default)]
pub struct ContextBuffers {
    arguments: Arguments,
    extensions: Extensions,
}

impl ContextBuffers {
    /// 预留容量的缓冲。
    pub fn with_capacity(arguments: usize, extensions: usize) -> Self {
        Self {
            arguments: Arguments::with_capacity(arguments),
            extensions: HashMap::with_capacity(extensions),
        }
    }
}

impl fmt::Debug for ContextBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuffers").finish_non_exhaustive()
    }
}

/// 单次调用的可变上下文。
pub struct CallContext {
    id: ContextId,
    method: MethodDescriptor,
    instance: Instance,
    arguments: Arguments,
    invoker: Arc<dyn MethodInvoker>,
    return_value: Option<ReturnValue>,
    state: InvocationState,
    fault: Option<FaultRecord>,
    extensions: Extensions,
}

impl CallContext {
    /// 从调用描述创建上下文，参数按引用计数复制。
    pub fn new(id: ContextId, request: &InvocationRequest) -> Self {
        Self::with_buffers(id, request, ContextBuffers::default())
    }

    /// 复用既有缓冲创建上下文。缓冲中的残留内容会先被清空。
    pub fn with_buffers(
        id: ContextId,
        request: &InvocationRequest,
        buffers: ContextBuffers,
    ) -> Self {
        let ContextBuffers {
            mut arguments,
            mut extensions,
        } = buffers;
        arguments.clear();
        extensions.clear();
        arguments.extend_from(request.arguments());

        Self {
            id,
            method: request.method().clone(),
            instance: Arc::clone(request.instance()),
            arguments,
            invoker: Arc::clone(request.invoker()),
            return_value: None,
            state: InvocationState::Created,
            fault: None,
            extensions,
        }
    }

    /// 拆回可复用的缓冲，其余引用随上下文一并丢弃。
    pub fn into_buffers(self) -> ContextBuffers {
        let mut arguments = self.arguments;
        let mut extensions = self.extensions;
        arguments.clear();
        extensions.clear();
        ContextBuffers {
            arguments,
            extensions,
        }
    }

    /// 上下文身份。
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// 方法标识。
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// 被代理实例。
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// 当前参数。
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// 可改写的参数，改写结果对目标方法可见。
    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    /// 调用目标方法，并把返回值写入槽位。
    ///
    /// 目标方法同步失败时槽位保持原状，错误原样返回给外层拦截器。
    pub fn invoke_target(&mut self) -> Result<(), BoxError> {
        let value = self.invoker.invoke(self.instance.as_ref(), &self.arguments)?;
        self.return_value = Some(value);
        Ok(())
    }

    /// 借用返回值。
    pub fn return_value(&self) -> Option<&ReturnValue> {
        self.return_value.as_ref()
    }

    /// 写入返回值，拦截器短路时使用。
    pub fn set_return_value(&mut self, value: ReturnValue) {
        self.return_value = Some(value);
    }

    /// 取走返回值。
    pub fn take_return_value(&mut self) -> Option<ReturnValue> {
        self.return_value.take()
    }

    /// 当前状态。
    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// 以故障结束时的摘要。
    pub fn fault(&self) -> Option<&FaultRecord> {
        self.fault.as_ref()
    }

    /// 写入附加数据，返回同名旧值。
    pub fn insert_extension<T>(
        &mut self,
        key: impl Into<Cow<'static, str>>,
        value: T,
    ) -> Option<Box<dyn Any + Send + Sync>>
    where
        T: Any + Send + Sync,
    {
        self.extensions.insert(key.into(), Box::new(value))
    }

    /// 以具体类型读取附加数据。
    pub fn extension<T>(&self, key: &str) -> Option<&T>
    where
        T: Any,
    {
        self.extensions
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// 移除附加数据。
    pub fn remove_extension(&mut self, key: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.extensions.remove(key)
    }

    pub(crate) fn mark_running(&mut self) {
        self.state = InvocationState::Running;
    }

    pub(crate) fn mark_completed(&mut self) {
        self.state = InvocationState::Completed;
        self.fault = None;
    }

    pub(crate) fn mark_faulted(&mut self, error: &AspectError) {
        self.state = InvocationState::Faulted;
        self.fault = Some(FaultRecord::from_error(error));
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("return_value", &self.return_value)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}
